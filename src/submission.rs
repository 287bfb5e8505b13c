//! Authoritative score classification, the one place where a submission
//! turns into record-break / first-time / personal-best decisions.
//!
//! Everything happens inside a single transaction: the classification reads
//! and the row upsert must agree with each other even when two clients
//! submit on the same fingerprint at once.

// {{{ Imports
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};

use crate::clonehero::{ChartId, Difficulty, Fingerprint, Instrument};
use crate::context::Error;
use crate::songs::{self, SongInfo};
use crate::user::User;
// }}}

// {{{ Submission
#[derive(Debug, Clone, Default)]
pub struct ScoreSubmission {
	pub chart: ChartId,
	pub instrument: Instrument,
	pub difficulty: Difficulty,
	pub score: u32,
	pub completion_percent: f64,
	pub stars: u8,
	pub song: SongInfo,
	/// Notes hit, derived client-side from the chart parse. NOT the score
	/// file's numerator, which is an unrelated game-internal metric.
	pub notes_hit: Option<u32>,
	pub notes_total: Option<u32>,
	pub best_streak: Option<u32>,
	/// Playable-note count from chart parsing; drives full-combo detection.
	pub total_notes_in_chart: Option<u32>,
	pub nps: Option<f64>,
	pub play_count: Option<u32>,
}

impl ScoreSubmission {
	#[inline]
	pub fn fingerprint(&self) -> Fingerprint {
		Fingerprint::new(self.chart, self.instrument, self.difficulty)
	}
}
// }}}
// {{{ Classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
	RecordBreak,
	FirstTime,
	PersonalBest,
	None,
}

/// The standing record row at the time of a submission.
#[derive(Debug, Clone)]
pub struct StandingRecord {
	pub holder_id: i64,
	pub holder_name: String,
	pub holder_external_id: String,
	pub score: u32,
	pub submitted_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct Classification {
	pub user_id: i64,
	pub username: String,
	pub external_id: String,

	pub category: Category,
	pub is_high_score: bool,
	pub is_full_combo: bool,
	pub is_first_fc: bool,
	pub is_fc_record_break: bool,

	/// The record row as it stood before this submission (also the
	/// "previous holder" when the category is a record break).
	pub standing_record: Option<StandingRecord>,
	/// This user's stored score before the submission.
	pub user_previous_score: Option<u32>,
	/// This user's stored score after the submission.
	pub your_best_score: u32,
}

pub fn is_full_combo(
	total_notes_in_chart: Option<u32>,
	notes_hit: Option<u32>,
	completion_percent: f64,
) -> bool {
	match (total_notes_in_chart, notes_hit) {
		(Some(total), Some(hit)) => total == hit && completion_percent >= 99.99,
		_ => false,
	}
}
// }}}
// {{{ Submit
/// Classify and persist one submission. Returns `None` when the auth token
/// resolves to no user, so the transport can answer 401 without guessing at
/// error strings.
pub fn submit(
	conn: &mut Connection,
	auth_token: &str,
	submission: &ScoreSubmission,
) -> Result<Option<Classification>, Error> {
	let tx = conn.transaction()?;

	let Some(user) = User::by_auth_token(&tx, auth_token)? else {
		return Ok(None);
	};

	if !submission.song.title.is_empty()
		|| !submission.song.artist.is_empty()
		|| !submission.song.charter.is_empty()
	{
		songs::save_song_info(&tx, submission.chart, &submission.song)?;
	}

	let is_fc = is_full_combo(
		submission.total_notes_in_chart,
		submission.notes_hit,
		submission.completion_percent,
	);

	// {{{ Read standing state
	let standing_record = tx
		.prepare_cached(
			"
        SELECT s.user_id, s.score, s.submitted_at,
               u.display_name, u.external_id
        FROM scores s
        JOIN users u ON s.user_id = u.id
        WHERE s.chart_hash = ?
        AND s.instrument_id = ?
        AND s.difficulty_id = ?
        ORDER BY s.score DESC
        LIMIT 1
      ",
		)?
		.query_row(
			rusqlite::params![submission.chart, submission.instrument, submission.difficulty],
			|row| {
				Ok(StandingRecord {
					holder_id: row.get("user_id")?,
					holder_name: row.get("display_name")?,
					holder_external_id: row.get("external_id")?,
					score: row.get("score")?,
					submitted_at: row.get("submitted_at")?,
				})
			},
		)
		.optional()?;

	let user_previous_score: Option<u32> = tx
		.prepare_cached(
			"
        SELECT score FROM scores
        WHERE chart_hash = ? AND instrument_id = ? AND difficulty_id = ? AND user_id = ?
      ",
		)?
		.query_row(
			rusqlite::params![
				submission.chart,
				submission.instrument,
				submission.difficulty,
				user.id
			],
			|row| row.get("score"),
		)
		.optional()?;

	let is_first_fc = is_fc && {
		let prior_fcs: i64 = tx
			.prepare_cached(
				"
          SELECT COUNT(*) FROM scores
          WHERE chart_hash = ? AND instrument_id = ? AND difficulty_id = ?
          AND is_full_combo = 1
        ",
			)?
			.query_row(
				rusqlite::params![submission.chart, submission.instrument, submission.difficulty],
				|row| row.get(0),
			)?;
		prior_fcs == 0
	};
	// }}}
	// {{{ Classify
	let category = match (&standing_record, user_previous_score) {
		(None, _) => Category::FirstTime,
		(Some(record), _) if submission.score > record.score => Category::RecordBreak,
		(Some(_), Some(previous)) if submission.score > previous => Category::PersonalBest,
		_ => Category::None,
	};
	// }}}
	// {{{ Persist
	// Invariant: a stored row only ever moves up. The game re-writes old
	// scores on every session end, so equal-or-lower re-submissions are
	// routine and must leave the row alone.
	tx.prepare_cached(
		"
      INSERT INTO scores (user_id, chart_hash, instrument_id, difficulty_id,
                          score, completion_percent, stars, is_full_combo, notes_total)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
      ON CONFLICT(chart_hash, instrument_id, difficulty_id, user_id)
      DO UPDATE SET
          score = excluded.score,
          completion_percent = excluded.completion_percent,
          stars = excluded.stars,
          is_full_combo = excluded.is_full_combo,
          notes_total = excluded.notes_total,
          submitted_at = CURRENT_TIMESTAMP
      WHERE excluded.score > scores.score
    ",
	)?
	.execute(rusqlite::params![
		user.id,
		submission.chart,
		submission.instrument,
		submission.difficulty,
		submission.score,
		submission.completion_percent,
		submission.stars,
		is_fc,
		submission.total_notes_in_chart,
	])?;

	if category == Category::RecordBreak {
		let record = standing_record.as_ref().unwrap();
		tx.prepare_cached(
			"
        INSERT INTO record_breaks (user_id, chart_hash, instrument_id, difficulty_id,
                                   new_score, previous_score, previous_holder_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
      ",
		)?
		.execute(rusqlite::params![
			user.id,
			submission.chart,
			submission.instrument,
			submission.difficulty,
			submission.score,
			record.score,
			record.holder_id,
		])?;
	}

	User::touch_last_seen(&tx, user.id)?;
	// }}}

	let your_best_score = user_previous_score
		.unwrap_or(0)
		.max(submission.score);

	tx.commit()?;

	Ok(Some(Classification {
		user_id: user.id,
		username: user.display_name,
		external_id: user.external_id,
		is_high_score: matches!(category, Category::RecordBreak | Category::FirstTime),
		is_full_combo: is_fc,
		is_first_fc,
		is_fc_record_break: is_fc && category == Category::RecordBreak,
		category,
		standing_record,
		user_previous_score,
		your_best_score,
	}))
}
// }}}
