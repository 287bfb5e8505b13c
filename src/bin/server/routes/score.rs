// {{{ Imports
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use encore::announce;
use encore::clonehero::{ChartId, Difficulty, Instrument};
use encore::songs::SongInfo;
use encore::submission::{self, Category, ScoreSubmission};
use encore::time::now_utc;

use crate::context::ServerState;
use crate::error::AppError;
// }}}

// {{{ Request shape
#[derive(Debug, Deserialize)]
struct ScoreRequest {
	auth_token: String,
	chart_hash: String,
	instrument_id: u16,
	difficulty_id: u8,
	score: u32,
	#[serde(default)]
	completion_percent: f64,
	#[serde(default)]
	stars: u8,
	#[serde(default)]
	song_title: String,
	#[serde(default)]
	song_artist: String,
	#[serde(default)]
	song_charter: String,
	#[serde(default)]
	notes_hit: Option<u32>,
	#[serde(default)]
	notes_total: Option<u32>,
	#[serde(default)]
	best_streak: Option<u32>,
	#[serde(default)]
	total_notes_in_chart: Option<u32>,
	#[serde(default)]
	nps: Option<f64>,
	#[serde(default)]
	play_count: Option<u32>,
}
// }}}
// {{{ Handler
pub async fn submit_score(
	State(state): State<ServerState>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
	// Manual deserialization so malformed bodies answer 400, not 422
	let request: ScoreRequest =
		serde_json::from_value(body).map_err(|error| AppError::bad_request(error.into()))?;

	let chart: ChartId = request
		.chart_hash
		.parse()
		.map_err(AppError::bad_request)?;
	let instrument = Instrument::from_id(request.instrument_id).ok_or_else(|| {
		AppError::bad_request(anyhow::anyhow!(
			"Unknown instrument id {}",
			request.instrument_id
		))
	})?;
	let difficulty = Difficulty::from_id(request.difficulty_id).ok_or_else(|| {
		AppError::bad_request(anyhow::anyhow!(
			"Unknown difficulty id {}",
			request.difficulty_id
		))
	})?;

	let submission = ScoreSubmission {
		chart,
		instrument,
		difficulty,
		score: request.score,
		completion_percent: request.completion_percent,
		stars: request.stars,
		song: SongInfo {
			title: request.song_title,
			artist: request.song_artist,
			charter: request.song_charter,
		},
		notes_hit: request.notes_hit,
		notes_total: request.notes_total,
		best_streak: request.best_streak,
		total_notes_in_chart: request.total_notes_in_chart,
		nps: request.nps,
		play_count: request.play_count,
	};

	let mut conn = state.ctx.db.get()?;
	let classification = submission::submit(&mut conn, &request.auth_token, &submission)?
		.ok_or_else(|| AppError::unauthorized("Invalid auth token"))?;

	// {{{ Terminal summary
	let category_label = match classification.category {
		Category::RecordBreak => "RECORD BROKEN!",
		Category::FirstTime => "FIRST SCORE!",
		Category::PersonalBest => "PERSONAL BEST!",
		Category::None => "not a high score",
	};
	println!(
		"[score] {} - {} on {} {} ({})",
		classification.username,
		announce::format_points(submission.score),
		submission.difficulty,
		submission.instrument,
		category_label,
	);
	// }}}

	if let Some(announcement) =
		announce::render(&submission, &classification, &state.ctx.config, now_utc())
	{
		state.publish(announcement);
	}

	Ok(Json(json!({
		"success": true,
		"is_high_score": classification.is_high_score,
		"is_record_broken": classification.category == Category::RecordBreak,
		"is_first_time_score": classification.category == Category::FirstTime,
		"is_personal_best": classification.category == Category::PersonalBest,
		"is_full_combo": classification.is_full_combo,
		"is_first_fc": classification.is_first_fc,
		"previous_score": classification.standing_record.as_ref().map(|r| r.score),
		"previous_holder": classification.standing_record.as_ref().map(|r| r.holder_name.clone()),
		"your_best_score": classification.your_best_score,
	})))
}
// }}}
