//! Retroactive full-combo detection.
//!
//! Scores submitted before chart metadata existed for their chart carry
//! `notes_total` but were never checked against the chart's real playable
//! note count. This batch pass cross-references the two and flags the FCs
//! that slipped through. Running it twice finds nothing new.

// {{{ Imports
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};

use crate::clonehero::{ChartId, Difficulty, Instrument};
use crate::context::Error;
use crate::submission::is_full_combo;
// }}}

// {{{ Retro FC event
#[derive(Debug, Clone)]
pub struct RetroFc {
	pub user_id: i64,
	pub username: String,
	pub external_id: String,
	pub chart: ChartId,
	pub instrument: Instrument,
	pub difficulty: Difficulty,
	pub score: u32,
	pub song_title: String,
	pub song_artist: String,
	pub song_charter: String,
	pub submitted_at: NaiveDateTime,
	pub is_first_fc: bool,
	pub is_fc_record_break: bool,
	pub previous_holder: Option<String>,
	pub previous_score: Option<u32>,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
	pub scanned: usize,
	pub fcs_found: usize,
	pub events: Vec<RetroFc>,
}
// }}}
// {{{ Scan
struct Candidate {
	score_id: i64,
	user_id: i64,
	username: String,
	external_id: String,
	chart: ChartId,
	instrument: Instrument,
	difficulty: Difficulty,
	score: u32,
	completion_percent: f64,
	notes_total: u32,
	already_marked: bool,
	submitted_at: NaiveDateTime,
	chart_total_notes: u32,
	song_title: Option<String>,
	song_artist: Option<String>,
	song_charter: Option<String>,
}

pub fn scan_historical_fcs(
	conn: &mut Connection,
	collect_events: bool,
) -> Result<BackfillReport, Error> {
	let tx = conn.transaction()?;
	let mut report = BackfillReport::default();

	// {{{ Gather candidates
	let candidates: Vec<Candidate> = tx
		.prepare_cached(
			"
        SELECT s.id, s.user_id, s.chart_hash, s.instrument_id, s.difficulty_id,
               s.score, s.completion_percent, s.notes_total, s.is_full_combo,
               s.submitted_at,
               u.display_name, u.external_id,
               cm.total_notes AS chart_total_notes,
               songs.title AS song_title,
               songs.artist AS song_artist,
               songs.charter AS song_charter
        FROM scores s
        JOIN users u ON s.user_id = u.id
        JOIN chart_metadata cm ON s.chart_hash = cm.chart_hash
                               AND s.instrument_id = cm.instrument_id
                               AND s.difficulty_id = cm.difficulty_id
        LEFT JOIN songs ON s.chart_hash = songs.chart_hash
        WHERE s.notes_total IS NOT NULL
        AND s.notes_total > 0
      ",
		)?
		.query_map((), |row| {
			Ok(Candidate {
				score_id: row.get("id")?,
				user_id: row.get("user_id")?,
				username: row.get("display_name")?,
				external_id: row.get("external_id")?,
				chart: row.get("chart_hash")?,
				instrument: row.get("instrument_id")?,
				difficulty: row.get("difficulty_id")?,
				score: row.get("score")?,
				completion_percent: row.get("completion_percent")?,
				notes_total: row.get("notes_total")?,
				already_marked: row.get("is_full_combo")?,
				submitted_at: row.get("submitted_at")?,
				chart_total_notes: row.get("chart_total_notes")?,
				song_title: row.get("song_title")?,
				song_artist: row.get("song_artist")?,
				song_charter: row.get("song_charter")?,
			})
		})?
		.collect::<Result<_, _>>()?;
	// }}}

	for candidate in candidates {
		report.scanned += 1;

		let is_fc = is_full_combo(
			Some(candidate.chart_total_notes),
			Some(candidate.notes_total),
			candidate.completion_percent,
		);
		if !is_fc || candidate.already_marked {
			continue;
		}

		report.fcs_found += 1;
		tx.prepare_cached("UPDATE scores SET is_full_combo = 1 WHERE id = ?")?
			.execute([candidate.score_id])?;

		if !collect_events {
			continue;
		}

		// {{{ Flags relative to the submission's own point in time
		let earlier_fcs: i64 = tx
			.prepare_cached(
				"
          SELECT COUNT(*) FROM scores
          WHERE chart_hash = ? AND instrument_id = ? AND difficulty_id = ?
          AND is_full_combo = 1
          AND submitted_at < ?
        ",
			)?
			.query_row(
				rusqlite::params![
					candidate.chart,
					candidate.instrument,
					candidate.difficulty,
					candidate.submitted_at
				],
				|row| row.get(0),
			)?;

		let beaten: Option<(String, u32)> = tx
			.prepare_cached(
				"
          SELECT u.display_name, s.score
          FROM scores s
          JOIN users u ON s.user_id = u.id
          WHERE s.chart_hash = ? AND s.instrument_id = ? AND s.difficulty_id = ?
          AND s.submitted_at < ?
          AND s.score < ?
          ORDER BY s.score DESC
          LIMIT 1
        ",
			)?
			.query_row(
				rusqlite::params![
					candidate.chart,
					candidate.instrument,
					candidate.difficulty,
					candidate.submitted_at,
					candidate.score
				],
				|row| Ok((row.get(0)?, row.get(1)?)),
			)
			.optional()?;
		// }}}

		let song_title = candidate
			.song_title
			.filter(|title| !title.is_empty())
			.unwrap_or_else(|| format!("[{}]", candidate.chart.short_hex()));

		report.events.push(RetroFc {
			user_id: candidate.user_id,
			username: candidate.username,
			external_id: candidate.external_id,
			chart: candidate.chart,
			instrument: candidate.instrument,
			difficulty: candidate.difficulty,
			score: candidate.score,
			song_title,
			song_artist: candidate.song_artist.unwrap_or_default(),
			song_charter: candidate.song_charter.unwrap_or_default(),
			submitted_at: candidate.submitted_at,
			is_first_fc: earlier_fcs == 0,
			is_fc_record_break: beaten.is_some(),
			previous_score: beaten.as_ref().map(|(_, score)| *score),
			previous_holder: beaten.map(|(holder, _)| holder),
		});
	}

	tx.commit()?;
	tracing::info!(
		scanned = report.scanned,
		found = report.fcs_found,
		"Historical FC scan complete"
	);
	Ok(report)
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::testing::test_connection;
	use crate::songs::{batch_insert_chart_metadata, ChartMetadataRow};
	use crate::user::User;

	fn chart(fill: u8) -> ChartId {
		ChartId([fill; 16])
	}

	fn insert_score(
		conn: &Connection,
		user: &User,
		chart: ChartId,
		score: u32,
		completion: f64,
		notes_total: Option<u32>,
		submitted_at: &str,
	) {
		conn.execute(
			"INSERT INTO scores(user_id, chart_hash, instrument_id, difficulty_id,
			 score, completion_percent, stars, is_full_combo, notes_total, submitted_at)
			 VALUES (?, ?, 0, 3, ?, ?, 5, 0, ?, ?)",
			rusqlite::params![user.id, chart, score, completion, notes_total, submitted_at],
		)
		.unwrap();
	}

	fn insert_metadata(conn: &Connection, chart: ChartId, total_notes: u32) {
		batch_insert_chart_metadata(
			conn,
			&[ChartMetadataRow {
				chart,
				instrument: Instrument::Lead,
				difficulty: Difficulty::Expert,
				total_notes,
				chord_count: 0,
				tap_count: 0,
				open_note_count: 0,
				star_power_phrases: 0,
				song_length_ms: 0,
				note_density: 0.0,
				song_name: String::new(),
				artist: String::new(),
				charter: String::new(),
				genre: String::new(),
				chart_file_path: String::new(),
			}],
		)
		.unwrap();
	}

	#[test]
	fn detects_missed_fcs_and_is_idempotent() {
		let mut conn = test_connection();
		let user = User::create(&conn, "ext-1", "U1").unwrap();
		let id = chart(0xf0);

		insert_score(&conn, &user, id, 250_000, 100.0, Some(450), "2024-01-01 10:00:00");
		insert_metadata(&conn, id, 450);

		let report = scan_historical_fcs(&mut conn, true).unwrap();
		assert_eq!(report.scanned, 1);
		assert_eq!(report.fcs_found, 1);
		assert_eq!(report.events.len(), 1);
		assert!(report.events[0].is_first_fc);
		assert!(!report.events[0].is_fc_record_break);
		// No song row: falls back to the bracketed short hash
		assert_eq!(report.events[0].song_title, format!("[{}]", id.short_hex()));

		// Second run finds nothing
		let report = scan_historical_fcs(&mut conn, true).unwrap();
		assert_eq!(report.fcs_found, 0);
		assert!(report.events.is_empty());
	}

	#[test]
	fn mismatched_note_counts_stay_unmarked() {
		let mut conn = test_connection();
		let user = User::create(&conn, "ext-1", "U1").unwrap();
		let id = chart(0xf1);

		insert_score(&conn, &user, id, 250_000, 100.0, Some(449), "2024-01-01 10:00:00");
		insert_metadata(&conn, id, 450);

		let report = scan_historical_fcs(&mut conn, true).unwrap();
		assert_eq!(report.scanned, 1);
		assert_eq!(report.fcs_found, 0);
	}

	#[test]
	fn fc_record_break_sees_earlier_lower_scores() {
		let mut conn = test_connection();
		let u1 = User::create(&conn, "ext-1", "U1").unwrap();
		let u2 = User::create(&conn, "ext-2", "U2").unwrap();
		let id = chart(0xf2);

		insert_score(&conn, &u2, id, 200_000, 95.0, None, "2024-01-01 10:00:00");
		insert_score(&conn, &u1, id, 250_000, 100.0, Some(450), "2024-02-01 10:00:00");
		insert_metadata(&conn, id, 450);

		let report = scan_historical_fcs(&mut conn, true).unwrap();
		assert_eq!(report.fcs_found, 1);
		let event = &report.events[0];
		assert!(event.is_fc_record_break);
		assert_eq!(event.previous_holder.as_deref(), Some("U2"));
		assert_eq!(event.previous_score, Some(200_000));
	}
}
// }}}
