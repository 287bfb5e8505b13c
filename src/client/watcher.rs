//! Debounced filesystem watch over the game's score file, plus the startup
//! catch-up scan.
//!
//! Change classification compares two things: the previous in-memory parse
//! (did the file's content actually change?) and the persistent state store
//! (is the change an improvement?). The store is only advanced when the
//! caller reports the score as handled, so a failed submission re-emits on
//! the next write instead of vanishing.

// {{{ Imports
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Context;
use notify::{RecursiveMode, Watcher};

use crate::client::state::ScoreState;
use crate::clonehero::scoredata::{self, ScoreRecord};
use crate::clonehero::Fingerprint;
use crate::context::Error;
// }}}

pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);
pub const WRITE_SETTLE_DELAY: Duration = Duration::from_millis(500);

// {{{ Events
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreEvent {
	/// A score the state store hasn't seen at this value; submit it.
	NewScore(ScoreRecord),
	/// The file changed but the score doesn't beat the stored best.
	NotImproved {
		record: ScoreRecord,
		personal_best: u32,
	},
	/// The file was written but every score is identical to the last parse.
	NoOpWrite,
}

/// What the caller did with a [`ScoreEvent::NewScore`]. The state store
/// only advances on outcomes where retrying is pointless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
	/// Submission accepted; never emit this score again.
	Submitted,
	/// Auth failure. Re-submitting won't help until the user re-pairs, so
	/// the score still counts as seen.
	Unauthorized,
	/// Transient failure; leave the store alone so the score re-emits.
	Failed,
}
// }}}
// {{{ Watcher
pub struct ScoreWatcher {
	scoredata_path: PathBuf,
	state: ScoreState,
	previous_snapshot: HashMap<Fingerprint, u32>,
	first_check: bool,
}

impl ScoreWatcher {
	pub fn new(scoredata_path: PathBuf, state: ScoreState) -> Result<Self, Error> {
		if !scoredata_path.exists() {
			anyhow::bail!("Score file not found at {scoredata_path:?}");
		}

		Ok(Self {
			scoredata_path,
			state,
			previous_snapshot: HashMap::new(),
			first_check: true,
		})
	}

	#[inline]
	pub fn state(&self) -> &ScoreState {
		&self.state
	}

	/// First-run / legacy-migration path: trust the file as-is.
	pub fn initialize_state(&mut self) -> Result<(), Error> {
		let records = scoredata::decode_file(&self.scoredata_path)?;
		self.state.initialize_from(&records)
	}

	pub fn needs_state_migration(&self) -> bool {
		self.state.needs_migration()
	}

	// {{{ Catch-up scan
	/// One pass over the score file emitting everything the store says is
	/// new or improved: the scores made while the client wasn't running.
	///
	/// Idempotent by construction: the store only advances per-event when
	/// the handler reports success, and an advanced store emits nothing on
	/// the next pass.
	pub fn catch_up(
		&mut self,
		mut handle: impl FnMut(&ScoreRecord) -> HandleOutcome,
	) -> Result<Vec<ScoreRecord>, Error> {
		let records = scoredata::decode_file(&self.scoredata_path)?;
		let mut emitted = Vec::new();

		for record in &records {
			if !self.state.is_new_or_improved(record.fingerprint, record.score) {
				continue;
			}

			emitted.push(*record);
			self.apply_outcome(record, handle(record))?;
		}

		Ok(emitted)
	}
	// }}}
	// {{{ Change processing
	/// Re-parse the file after a modification event and classify what
	/// changed. Returns the events for logging/inspection; `NewScore`
	/// events are routed through the handler.
	pub fn process_change(
		&mut self,
		mut handle: impl FnMut(&ScoreRecord) -> HandleOutcome,
	) -> Result<Vec<ScoreEvent>, Error> {
		let records = scoredata::decode_file(&self.scoredata_path)?;

		let current_snapshot: HashMap<Fingerprint, u32> = records
			.iter()
			.map(|record| (record.fingerprint, record.score))
			.collect();

		let changed: Vec<&ScoreRecord> = records
			.iter()
			.filter(|record| {
				self.previous_snapshot.get(&record.fingerprint) != Some(&record.score)
			})
			.collect();

		let mut events = Vec::new();
		for record in changed.iter() {
			if self.state.is_new_or_improved(record.fingerprint, record.score) {
				events.push(ScoreEvent::NewScore(**record));
				self.apply_outcome(record, handle(record))?;
			} else if !self.first_check {
				let personal_best = self.state.best_score(record.fingerprint).unwrap_or(0);
				let delta = record.score as i64 - personal_best as i64;
				tracing::info!(
					chart = %record.fingerprint.chart.short_hex(),
					score = record.score,
					personal_best,
					delta,
					"Score changed but did not improve the personal best"
				);
				events.push(ScoreEvent::NotImproved {
					record: **record,
					personal_best,
				});
			}
		}

		if changed.is_empty() && !self.first_check {
			tracing::info!("Score file written with no score changes");
			events.push(ScoreEvent::NoOpWrite);
		}

		self.previous_snapshot = current_snapshot;
		self.first_check = false;
		Ok(events)
	}

	fn apply_outcome(
		&mut self,
		record: &ScoreRecord,
		outcome: HandleOutcome,
	) -> Result<(), Error> {
		match outcome {
			HandleOutcome::Submitted | HandleOutcome::Unauthorized => {
				self.state.mark_seen(record.fingerprint, record.score)
			}
			HandleOutcome::Failed => Ok(()),
		}
	}
	// }}}
	// {{{ Watch loop
	/// Block on filesystem events until `stop` flips. Modification events
	/// inside the debounce window are dropped; accepted events wait out the
	/// writer before parsing.
	pub fn run(
		&mut self,
		stop: &AtomicBool,
		mut handle: impl FnMut(&ScoreRecord) -> HandleOutcome,
	) -> Result<(), Error> {
		let (tx, rx) = mpsc::channel();
		let mut watcher =
			notify::recommended_watcher(tx).with_context(|| "Could not create file watcher")?;

		let watch_dir = self
			.scoredata_path
			.parent()
			.with_context(|| "Score file has no parent directory")?
			.to_owned();
		watcher
			.watch(&watch_dir, RecursiveMode::NonRecursive)
			.with_context(|| format!("Could not watch {watch_dir:?}"))?;

		tracing::info!(path = ?self.scoredata_path, "Watching score file");
		let mut last_processed: Option<Instant> = None;

		while !stop.load(Ordering::Relaxed) {
			let event = match rx.recv_timeout(Duration::from_millis(250)) {
				Ok(Ok(event)) => event,
				Ok(Err(error)) => {
					tracing::warn!(%error, "File watcher error");
					continue;
				}
				Err(mpsc::RecvTimeoutError::Timeout) => continue,
				Err(mpsc::RecvTimeoutError::Disconnected) => break,
			};

			if !event.kind.is_modify() && !event.kind.is_create() {
				continue;
			}
			if !event
				.paths
				.iter()
				.any(|path| path.file_name() == self.scoredata_path.file_name())
			{
				continue;
			}

			if last_processed.is_some_and(|at| at.elapsed() < DEBOUNCE_WINDOW) {
				continue;
			}
			last_processed = Some(Instant::now());

			// Give the game time to finish writing
			std::thread::sleep(WRITE_SETTLE_DELAY);

			if let Err(error) = self.process_change(&mut handle) {
				tracing::warn!(%error, "Could not process score file change");
			}
		}

		Ok(())
	}
	// }}}
}

/// Standard location of the score file inside the game's data directory.
pub fn scoredata_path(game_dir: &Path) -> PathBuf {
	game_dir.join("scoredata.bin")
}

/// Standard location of the client's state file, next to the score file.
pub fn state_path(game_dir: &Path) -> PathBuf {
	game_dir.join("encore_state.json")
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use byteorder::{LittleEndian, WriteBytesExt};

	use super::*;
	use crate::clonehero::ChartId;

	// {{{ Score file synthesizer
	fn write_scoredata(path: &Path, songs: &[(u8, u32)]) {
		let mut out = Vec::new();
		out.extend_from_slice(&[0x20, 0x06, 0x20, 0x08]);
		out.write_u32::<LittleEndian>(songs.len() as u32).unwrap();

		for &(fill, score) in songs {
			out.extend_from_slice(&[fill; 16]);
			out.write_u8(1).unwrap();
			out.write_u24::<LittleEndian>(1).unwrap();

			out.write_u16::<LittleEndian>(0).unwrap();
			out.write_u8(3).unwrap();
			out.write_u16::<LittleEndian>(95).unwrap();
			out.write_u16::<LittleEndian>(100).unwrap();
			out.write_u8(5).unwrap();
			out.extend_from_slice(&[1, 0, 0, 0]);
			out.write_u32::<LittleEndian>(score).unwrap();
		}

		std::fs::write(path, out).unwrap();
	}

	fn fingerprint(fill: u8) -> Fingerprint {
		Fingerprint::new(
			ChartId([fill; 16]),
			crate::clonehero::Instrument::Lead,
			crate::clonehero::Difficulty::Expert,
		)
	}

	fn watcher_in(dir: &tempfile::TempDir, songs: &[(u8, u32)]) -> ScoreWatcher {
		let scoredata = dir.path().join("scoredata.bin");
		write_scoredata(&scoredata, songs);
		let state = ScoreState::load(&dir.path().join("state.json"));
		ScoreWatcher::new(scoredata, state).unwrap()
	}
	// }}}

	#[test]
	fn catch_up_emits_once_then_never_again() {
		let dir = tempfile::tempdir().unwrap();
		let mut watcher = watcher_in(&dir, &[(0x01, 100_000), (0x02, 50_000)]);

		let first = watcher
			.catch_up(|_| HandleOutcome::Submitted)
			.unwrap();
		assert_eq!(first.len(), 2);

		let second = watcher
			.catch_up(|_| HandleOutcome::Submitted)
			.unwrap();
		assert!(second.is_empty());
	}

	#[test]
	fn failed_submissions_reemit() {
		let dir = tempfile::tempdir().unwrap();
		let mut watcher = watcher_in(&dir, &[(0x01, 100_000)]);

		let first = watcher.catch_up(|_| HandleOutcome::Failed).unwrap();
		assert_eq!(first.len(), 1);

		// The store didn't advance, so the score comes back
		let second = watcher
			.catch_up(|_| HandleOutcome::Submitted)
			.unwrap();
		assert_eq!(second.len(), 1);

		let third = watcher.catch_up(|_| HandleOutcome::Submitted).unwrap();
		assert!(third.is_empty());
	}

	#[test]
	fn unauthorized_still_marks_seen() {
		let dir = tempfile::tempdir().unwrap();
		let mut watcher = watcher_in(&dir, &[(0x01, 100_000)]);

		watcher.catch_up(|_| HandleOutcome::Unauthorized).unwrap();
		let again = watcher
			.catch_up(|_| HandleOutcome::Submitted)
			.unwrap();
		assert!(again.is_empty());
	}

	#[test]
	fn replayed_identical_score_is_a_noop_write() {
		let dir = tempfile::tempdir().unwrap();
		let mut watcher = watcher_in(&dir, &[(0x01, 150_000)]);

		// Startup: parse once, submit, mark seen
		watcher.process_change(|_| HandleOutcome::Submitted).unwrap();

		// Game rewrites the same file; no submissions, one no-op event
		let mut submissions = 0;
		let events = watcher
			.process_change(|_| {
				submissions += 1;
				HandleOutcome::Submitted
			})
			.unwrap();
		assert_eq!(submissions, 0);
		assert_eq!(events, vec![ScoreEvent::NoOpWrite]);
		assert_eq!(
			watcher.state().best_score(fingerprint(0x01)),
			Some(150_000)
		);
	}

	#[test]
	fn changed_but_lower_score_reports_personal_best() {
		let dir = tempfile::tempdir().unwrap();
		let scoredata = dir.path().join("scoredata.bin");
		write_scoredata(&scoredata, &[(0x01, 150_000)]);

		let state = ScoreState::load(&dir.path().join("state.json"));
		let mut watcher = ScoreWatcher::new(scoredata.clone(), state).unwrap();
		watcher.process_change(|_| HandleOutcome::Submitted).unwrap();

		// The game wrote a lower score for the same fingerprint
		write_scoredata(&scoredata, &[(0x01, 90_000)]);
		let events = watcher.process_change(|_| HandleOutcome::Submitted).unwrap();

		assert_eq!(events.len(), 1);
		match &events[0] {
			ScoreEvent::NotImproved {
				record,
				personal_best,
			} => {
				assert_eq!(record.score, 90_000);
				assert_eq!(*personal_best, 150_000);
			}
			other => panic!("Expected NotImproved, got {other:?}"),
		}
	}

	#[test]
	fn first_parse_suppresses_not_improved_noise() {
		let dir = tempfile::tempdir().unwrap();
		let scoredata = dir.path().join("scoredata.bin");
		write_scoredata(&scoredata, &[(0x01, 100_000)]);

		let mut state = ScoreState::load(&dir.path().join("state.json"));
		state.mark_seen(fingerprint(0x01), 150_000).unwrap();

		let mut watcher = ScoreWatcher::new(scoredata, state).unwrap();
		let events = watcher.process_change(|_| HandleOutcome::Submitted).unwrap();
		// The stored best is higher, but on the first parse we stay quiet
		assert!(events.is_empty());
	}
}
// }}}
