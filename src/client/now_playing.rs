//! The game's live "now playing" export and the cache that papers over its
//! write gap.
//!
//! The game clears `currentsong.txt` the moment a song ends, but writes the
//! score file *after* clearing it. A 1 Hz poller keeps the last non-empty
//! read cached so the score processor still knows what was playing. The
//! cache is cleared exactly once per fully-processed score event.

// {{{ Imports
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
// }}}

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

// {{{ Now playing data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlaying {
	pub title: String,
	pub artist: String,
	pub charter: String,
}

impl NowPlaying {
	/// Three UTF-8 lines: title, artist, charter. A file without a title
	/// line counts as empty.
	fn parse(content: &str) -> Option<Self> {
		let mut lines = content.lines();
		let title = lines.next()?.trim();
		if title.is_empty() {
			return None;
		}

		Some(Self {
			title: title.to_owned(),
			artist: lines.next().map(str::trim).unwrap_or_default().to_owned(),
			charter: lines.next().map(str::trim).unwrap_or_default().to_owned(),
		})
	}
}
// }}}
// {{{ Cache
/// Shared between the poller thread and the score processor.
#[derive(Debug, Default)]
pub struct NowPlayingCache {
	current: Mutex<Option<NowPlaying>>,
}

impl NowPlayingCache {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Read the live file; a non-empty read replaces the cache, an empty or
	/// unreadable file leaves the cached song in place.
	pub fn refresh_from(&self, path: &Path) {
		let Ok(content) = std::fs::read_to_string(path) else {
			return;
		};

		if let Some(now_playing) = NowPlaying::parse(&content) {
			*self.current.lock().unwrap() = Some(now_playing);
		}
	}

	pub fn current(&self) -> Option<NowPlaying> {
		self.current.lock().unwrap().clone()
	}

	/// Called once per fully-processed score event so a stale song can't
	/// leak onto the next score.
	pub fn clear(&self) {
		*self.current.lock().unwrap() = None;
	}
}
// }}}
// {{{ Poller
pub struct NowPlayingPoller {
	stop: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl NowPlayingPoller {
	pub fn spawn(path: PathBuf, cache: Arc<NowPlayingCache>) -> Self {
		let stop = Arc::new(AtomicBool::new(false));
		let stop_flag = Arc::clone(&stop);

		let handle = std::thread::Builder::new()
			.name("now-playing-poller".to_owned())
			.spawn(move || {
				while !stop_flag.load(Ordering::Relaxed) {
					cache.refresh_from(&path);
					std::thread::sleep(POLL_INTERVAL);
				}
			})
			.expect("Could not spawn now-playing poller thread");

		Self {
			stop,
			handle: Some(handle),
		}
	}

	pub fn stop(mut self) {
		self.stop.store(true, Ordering::Relaxed);
		if let Some(handle) = self.handle.take() {
			let _ = handle.join();
		}
	}
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn caches_across_the_write_gap() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("currentsong.txt");
		let cache = NowPlayingCache::new();

		std::fs::write(&path, "Soulless 5\nExileLord\nGHS\n").unwrap();
		cache.refresh_from(&path);
		assert_eq!(
			cache.current().unwrap(),
			NowPlaying {
				title: "Soulless 5".into(),
				artist: "ExileLord".into(),
				charter: "GHS".into(),
			}
		);

		// Game clears the file; cache must survive
		std::fs::write(&path, "").unwrap();
		cache.refresh_from(&path);
		assert!(cache.current().is_some());

		// Explicit clear after a processed score event
		cache.clear();
		assert!(cache.current().is_none());
	}

	#[test]
	fn missing_file_keeps_cache() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("currentsong.txt");
		let cache = NowPlayingCache::new();

		std::fs::write(&path, "Song Title\n").unwrap();
		cache.refresh_from(&path);
		std::fs::remove_file(&path).unwrap();
		cache.refresh_from(&path);

		let current = cache.current().unwrap();
		assert_eq!(current.title, "Song Title");
		assert_eq!(current.artist, "");
	}

	#[test]
	fn newer_song_replaces_older() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("currentsong.txt");
		let cache = NowPlayingCache::new();

		std::fs::write(&path, "First Song\nA\nB\n").unwrap();
		cache.refresh_from(&path);
		std::fs::write(&path, "Second Song\nC\nD\n").unwrap();
		cache.refresh_from(&path);

		assert_eq!(cache.current().unwrap().title, "Second Song");
	}
}
// }}}
