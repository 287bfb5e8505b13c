//! Blocking HTTP client for talking to the server. The client process is
//! plain threads, so the blocking reqwest API fits; every call carries a
//! short timeout and the watcher treats failures as transient.

// {{{ Imports
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::client::resolver::EnrichedScore;
use crate::context::Error;
use crate::songs::HashMetadata;
// }}}

pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const PAIRING_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const PAIRING_DEADLINE: Duration = Duration::from_secs(300);

// {{{ Wire types
#[derive(Debug, Serialize)]
struct ScorePayload<'a> {
	auth_token: &'a str,
	chart_hash: String,
	instrument_id: u16,
	difficulty_id: u8,
	score: u32,
	completion_percent: f64,
	stars: u8,
	score_type: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	song_title: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	song_artist: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	song_charter: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	notes_hit: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	notes_total: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	total_notes_in_chart: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	nps: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	play_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmitResponse {
	pub success: bool,
	pub is_high_score: bool,
	pub is_record_broken: bool,
	pub is_first_time_score: bool,
	pub is_personal_best: bool,
	pub is_full_combo: bool,
	pub is_first_fc: bool,
	pub previous_score: Option<u32>,
	pub previous_holder: Option<String>,
	pub your_best_score: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PairingCodeResponse {
	pub pairing_code: String,
	pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PairingStatusResponse {
	paired: bool,
	#[serde(default)]
	auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnresolvedHashesResponse {
	hashes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveHashesResponse {
	pub updated_count: usize,
}
// }}}
// {{{ Errors
/// Failures the watcher must react to differently: a 401 means re-pairing,
/// anything else means "try again on the next file write".
#[derive(Debug)]
pub enum SubmitError {
	Unauthorized,
	Transient(Error),
}

impl std::fmt::Display for SubmitError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Unauthorized => write!(f, "auth token rejected"),
			Self::Transient(error) => write!(f, "{error}"),
		}
	}
}
// }}}
// {{{ Api client
pub struct ApiClient {
	base_url: String,
	http: reqwest::blocking::Client,
}

impl ApiClient {
	pub fn new(base_url: &str) -> Result<Self, Error> {
		let http = reqwest::blocking::Client::builder()
			.timeout(SUBMIT_TIMEOUT)
			.build()
			.with_context(|| "Could not build http client")?;

		Ok(Self {
			base_url: base_url.trim_end_matches('/').to_owned(),
			http,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	// {{{ Score submission
	pub fn submit_score(
		&self,
		auth_token: &str,
		enriched: &EnrichedScore,
	) -> Result<SubmitResponse, SubmitError> {
		let fingerprint = enriched.record.fingerprint;
		let payload = ScorePayload {
			auth_token,
			chart_hash: fingerprint.chart.to_hex(),
			instrument_id: fingerprint.instrument.to_index() as u16,
			difficulty_id: fingerprint.difficulty.to_index() as u8,
			score: enriched.record.score,
			completion_percent: enriched.record.completion_percent,
			stars: enriched.record.stars,
			score_type: enriched.score_type.as_str(),
			song_title: (!enriched.song.title.is_empty()).then_some(&enriched.song.title),
			song_artist: (!enriched.song.artist.is_empty()).then_some(&enriched.song.artist),
			song_charter: (!enriched.song.charter.is_empty()).then_some(&enriched.song.charter),
			notes_hit: enriched.notes_hit,
			notes_total: enriched.notes_total,
			total_notes_in_chart: enriched.total_notes_in_chart,
			nps: enriched.nps,
			play_count: Some(enriched.record.play_count),
		};

		let response = self
			.http
			.post(self.url("/api/score"))
			.json(&payload)
			.send()
			.map_err(|error| SubmitError::Transient(error.into()))?;

		match response.status().as_u16() {
			200 => response
				.json()
				.map_err(|error| SubmitError::Transient(error.into())),
			401 => Err(SubmitError::Unauthorized),
			status => Err(SubmitError::Transient(anyhow::anyhow!(
				"Server answered {status} to a score submission"
			))),
		}
	}
	// }}}
	// {{{ Pairing
	pub fn request_pairing(&self, client_id: &str) -> Result<PairingCodeResponse, Error> {
		let response = self
			.http
			.post(self.url("/api/pair/request"))
			.json(&serde_json::json!({ "client_id": client_id }))
			.send()
			.with_context(|| "Could not reach the server for pairing")?
			.error_for_status()
			.with_context(|| "Pairing request rejected")?;

		Ok(response.json()?)
	}

	pub fn pairing_status(&self, client_id: &str) -> Result<Option<String>, Error> {
		let response: PairingStatusResponse = self
			.http
			.get(self.url(&format!("/api/pair/status/{client_id}")))
			.send()
			.with_context(|| "Could not reach the server for pairing status")?
			.error_for_status()?
			.json()?;

		Ok(response.paired.then_some(response.auth_token).flatten())
	}

	/// Poll until the pairing completes or the deadline passes.
	pub fn wait_for_pairing(&self, client_id: &str) -> Result<Option<String>, Error> {
		let deadline = std::time::Instant::now() + PAIRING_DEADLINE;

		while std::time::Instant::now() < deadline {
			if let Some(token) = self.pairing_status(client_id)? {
				return Ok(Some(token));
			}
			std::thread::sleep(PAIRING_POLL_INTERVAL);
		}

		Ok(None)
	}
	// }}}
	// {{{ Hash resolution
	pub fn unresolved_hashes(&self, auth_token: &str) -> Result<Vec<String>, Error> {
		let response: UnresolvedHashesResponse = self
			.http
			.get(self.url("/api/unresolved_hashes"))
			.bearer_auth(auth_token)
			.send()
			.with_context(|| "Could not fetch unresolved hashes")?
			.error_for_status()?
			.json()?;

		Ok(response.hashes)
	}

	pub fn resolve_hashes(
		&self,
		auth_token: &str,
		metadata: &[HashMetadata],
	) -> Result<ResolveHashesResponse, Error> {
		let response = self
			.http
			.post(self.url("/api/resolve_hashes"))
			.bearer_auth(auth_token)
			.json(&serde_json::json!({ "metadata": metadata }))
			.send()
			.with_context(|| "Could not push resolved hashes")?
			.error_for_status()?
			.json()?;

		Ok(response)
	}
	// }}}
}
// }}}
