//! Brute-force chart-file lookup by chart id.
//!
//! The game never tells us where a chart lives, only its 16-byte id. For
//! charts distributed as plain folders that id happens to be the MD5 of the
//! `notes.chart`/`notes.mid` file, so we walk the configured songs roots,
//! hash every chart file, and cache whatever we learn (including misses).
//! The cache lives for the process lifetime.

// {{{ Imports
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::clonehero::ChartId;
// }}}

const CHART_FILENAMES: [&str; 3] = ["notes.chart", "notes.mid", "notes.midi"];

// {{{ Cache
pub struct ChartFileCache {
	roots: Vec<PathBuf>,
	cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl ChartFileCache {
	pub fn new(roots: Vec<PathBuf>) -> Self {
		Self {
			roots,
			cache: Mutex::new(HashMap::new()),
		}
	}

	#[inline]
	pub fn find(&self, chart: ChartId) -> Option<PathBuf> {
		self.find_hex(&chart.to_hex())
	}

	/// Find a chart file whose MD5 matches the given hex (full, or a
	/// truncated prefix of at least 8 chars). Negative results are cached
	/// too, so an unknown id costs one scan, not one per score.
	pub fn find_hex(&self, target: &str) -> Option<PathBuf> {
		if target.len() < 8 {
			return None;
		}

		if let Some(cached) = self.cache.lock().unwrap().get(target) {
			return cached.clone();
		}

		let found = self.scan_for(target);
		self.cache
			.lock()
			.unwrap()
			.insert(target.to_owned(), found.clone());
		found
	}

	fn scan_for(&self, target: &str) -> Option<PathBuf> {
		for root in &self.roots {
			for entry in WalkDir::new(root)
				.into_iter()
				.filter_map(|entry| entry.ok())
				.filter(|entry| entry.file_type().is_file())
			{
				let name = entry.file_name().to_string_lossy().to_lowercase();
				if !CHART_FILENAMES.contains(&name.as_str()) {
					continue;
				}

				match file_md5_hex(entry.path()) {
					Some(hash) if hash == target || hash.starts_with(target) => {
						tracing::debug!(path = ?entry.path(), hash = target, "Chart file located");
						return Some(entry.into_path());
					}
					Some(_) => {}
					None => continue,
				}
			}
		}

		tracing::debug!(hash = target, "No chart file matches this id");
		None
	}
}

fn file_md5_hex(path: &Path) -> Option<String> {
	let bytes = std::fs::read(path).ok()?;
	Some(format!("{:x}", md5::compute(&bytes)))
}
// }}}
