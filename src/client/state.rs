//! Crash-safe record of the best score the client has ever seen per
//! fingerprint. This is what lets a restarted client tell "new score while
//! we were offline" from "same old file".

// {{{ Imports
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::clonehero::scoredata::ScoreRecord;
use crate::clonehero::Fingerprint;
use crate::context::Error;
// }}}

// {{{ File format
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
	score_values: BTreeMap<String, u32>,
	last_updated: u64,
}
// }}}
// {{{ Score state
#[derive(Debug)]
pub struct ScoreState {
	path: PathBuf,
	scores: BTreeMap<String, u32>,
	/// Set when the on-disk file used the legacy list format; the caller
	/// must reinitialize from the game's current score file.
	needs_migration: bool,
}

impl ScoreState {
	// {{{ Load
	pub fn load(path: &Path) -> Self {
		let mut state = Self {
			path: path.to_owned(),
			scores: BTreeMap::new(),
			needs_migration: false,
		};

		let Ok(content) = std::fs::read_to_string(path) else {
			tracing::info!(?path, "No existing state file, starting fresh");
			return state;
		};

		match serde_json::from_str::<serde_json::Value>(&content) {
			Ok(document) if document.get("score_values").is_some() => {
				match serde_json::from_value::<StateFile>(document) {
					Ok(file) => {
						state.scores = file.score_values;
						tracing::info!(count = state.scores.len(), "Loaded known scores");
					}
					Err(error) => {
						tracing::warn!(%error, "State file malformed, archiving");
						archive_corrupt(path);
					}
				}
			}
			Ok(document) if document.get("known_scores").is_some() => {
				// Legacy format stored a plain list without score values, so
				// there's nothing to carry over.
				tracing::info!("Old state format detected, will re-sync with current scores");
				state.needs_migration = true;
			}
			Ok(_) | Err(_) => {
				tracing::warn!(?path, "State file corrupt, archiving and starting fresh");
				archive_corrupt(path);
			}
		}

		state
	}

	#[inline]
	pub fn needs_migration(&self) -> bool {
		self.needs_migration
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.scores.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}
	// }}}
	// {{{ Queries
	pub fn best_score(&self, fingerprint: Fingerprint) -> Option<u32> {
		self.scores.get(&fingerprint.to_string()).copied()
	}

	/// True when this fingerprint has never been seen, or the score beats
	/// the stored value.
	pub fn is_new_or_improved(&self, fingerprint: Fingerprint, score: u32) -> bool {
		match self.best_score(fingerprint) {
			None => true,
			Some(best) => score > best,
		}
	}
	// }}}
	// {{{ Mutation
	/// Record a score, keeping the maximum, and persist.
	pub fn mark_seen(&mut self, fingerprint: Fingerprint, score: u32) -> Result<(), Error> {
		let entry = self.scores.entry(fingerprint.to_string()).or_insert(0);
		*entry = (*entry).max(score);
		self.save()
	}

	/// Replace the whole map from the game's current score file. First-run
	/// and legacy-migration path.
	pub fn initialize_from(&mut self, records: &[ScoreRecord]) -> Result<(), Error> {
		self.scores.clear();
		for record in records {
			let entry = self
				.scores
				.entry(record.fingerprint.to_string())
				.or_insert(0);
			*entry = (*entry).max(record.score);
		}

		self.needs_migration = false;
		self.save()?;
		tracing::info!(count = self.scores.len(), "Initialized state from score file");
		Ok(())
	}

	/// Whole-file atomic write: serialize to a temp file, rename over the
	/// real one. A crash mid-save leaves the previous state intact.
	fn save(&self) -> Result<(), Error> {
		let file = StateFile {
			score_values: self.scores.clone(),
			last_updated: SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map(|elapsed| elapsed.as_secs())
				.unwrap_or(0),
		};

		let parent = self
			.path
			.parent()
			.with_context(|| format!("State path {:?} has no parent", self.path))?;
		std::fs::create_dir_all(parent)
			.with_context(|| format!("Could not create state dir {parent:?}"))?;

		let temp = tempfile::NamedTempFile::new_in(parent)
			.with_context(|| "Could not create temp state file")?;
		std::fs::write(temp.path(), serde_json::to_string_pretty(&file)?)
			.with_context(|| "Could not write temp state file")?;
		temp.persist(&self.path)
			.with_context(|| format!("Could not replace state file at {:?}", self.path))?;

		Ok(())
	}
	// }}}
}

fn archive_corrupt(path: &Path) {
	let timestamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs())
		.unwrap_or(0);
	let archive = path.with_extension(format!("corrupt.{timestamp}.json"));

	if let Err(error) = std::fs::rename(path, &archive) {
		tracing::warn!(%error, ?path, "Could not archive corrupt state file");
	}
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;
	use crate::clonehero::{ChartId, Difficulty, Instrument};

	fn fingerprint(fill: u8) -> Fingerprint {
		Fingerprint::new(ChartId([fill; 16]), Instrument::Lead, Difficulty::Expert)
	}

	fn state_in(dir: &tempfile::TempDir) -> ScoreState {
		ScoreState::load(&dir.path().join("state.json"))
	}

	#[test]
	fn stores_the_maximum_score_ever_seen() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state_in(&dir);
		let fp = fingerprint(0x01);

		for score in [100, 500, 300, 500, 200] {
			state.mark_seen(fp, score).unwrap();
		}
		assert_eq!(state.best_score(fp), Some(500));

		// Persistence survives a reload
		let state = state_in(&dir);
		assert_eq!(state.best_score(fp), Some(500));
	}

	#[test]
	fn new_or_improved_logic() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state_in(&dir);
		let fp = fingerprint(0x02);

		assert!(state.is_new_or_improved(fp, 1));
		state.mark_seen(fp, 100).unwrap();
		assert!(!state.is_new_or_improved(fp, 100));
		assert!(!state.is_new_or_improved(fp, 50));
		assert!(state.is_new_or_improved(fp, 101));
	}

	#[test]
	fn legacy_format_flags_migration() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("state.json");
		std::fs::write(&path, r#"{"known_scores": ["a:0:3", "b:1:2"]}"#).unwrap();

		let state = ScoreState::load(&path);
		assert!(state.needs_migration());
		assert!(state.is_empty());
	}

	#[test]
	fn corrupt_file_is_archived() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("state.json");
		std::fs::write(&path, "{oops").unwrap();

		let state = ScoreState::load(&path);
		assert!(state.is_empty());
		assert!(!state.needs_migration());

		let archived = std::fs::read_dir(dir.path())
			.unwrap()
			.filter_map(|entry| entry.ok())
			.any(|entry| entry.file_name().to_string_lossy().contains("corrupt"));
		assert!(archived);
	}

	#[test]
	fn initialize_replaces_everything() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = state_in(&dir);
		state.mark_seen(fingerprint(0x01), 999_999).unwrap();

		let records = [ScoreRecord {
			fingerprint: fingerprint(0x02),
			score: 1234,
			stars: 3,
			completion_percent: 80.0,
			play_count: 1,
		}];
		state.initialize_from(&records).unwrap();

		assert_eq!(state.len(), 1);
		assert_eq!(state.best_score(fingerprint(0x01)), None);
		assert_eq!(state.best_score(fingerprint(0x02)), Some(1234));
	}
}
// }}}
