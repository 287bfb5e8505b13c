//! Best-effort decoder for the game's song cache (`songcache.bin`).
//!
//! The file has no documented structure. What IS stable across game versions
//! is that the byte string `0x0A "Clone Hero" 0x00` immediately precedes each
//! entry's 16-byte chart id, and that a Windows filesystem path to the chart
//! follows within a few hundred bytes. We scan for the sentinel and fish the
//! path out of the window after each hit; entries without a recognizable
//! path are skipped.

// {{{ Imports
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::clonehero::ChartId;
use crate::context::Error;
// }}}

const SENTINEL: &[u8] = b"\x0aClone Hero\x00";
const PATH_WINDOW: usize = 500;
const PATH_STARTS: [&[u8]; 3] = [b":\\", b"Songs\\", b"songs\\"];
const PATH_ENDS: [&[u8]; 3] = [b".sng", b".chart", b".mid"];

// {{{ Cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
	pub title: String,
	pub filepath: String,
}
// }}}
// {{{ Scan
pub fn decode(bytes: &[u8]) -> HashMap<ChartId, CacheEntry> {
	let mut entries = HashMap::new();
	let mut pos = 0;

	while let Some(offset) = find(bytes, SENTINEL, pos) {
		let hash_pos = offset + SENTINEL.len();
		let Some(id_bytes) = bytes.get(hash_pos..hash_pos + 16) else {
			break;
		};

		let chart = ChartId::from_bytes(id_bytes.try_into().unwrap());
		let window_end = (hash_pos + 16 + PATH_WINDOW).min(bytes.len());
		let window = &bytes[hash_pos + 16..window_end];

		if let Some(filepath) = extract_path(window) {
			let title = title_from_path(&filepath);
			entries.insert(chart, CacheEntry { title, filepath });
		}

		pos = hash_pos + 16;
	}

	entries
}

pub fn decode_file(path: &Path) -> Result<HashMap<ChartId, CacheEntry>, Error> {
	let bytes =
		std::fs::read(path).with_context(|| format!("Could not read song cache at {path:?}"))?;
	Ok(decode(&bytes))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
	if from >= haystack.len() {
		return None;
	}

	haystack[from..]
		.windows(needle.len())
		.position(|window| window == needle)
		.map(|i| i + from)
}

/// Fish a filesystem path out of the bytes following a chart id.
fn extract_path(window: &[u8]) -> Option<String> {
	for pattern in PATH_STARTS {
		let Some(pattern_idx) = find(window, pattern, 0) else {
			continue;
		};

		// For drive-letter matches, back up one byte to include the letter.
		let start = if pattern == b":\\" {
			pattern_idx.saturating_sub(1)
		} else {
			pattern_idx
		};

		let mut end = window.len();
		for suffix in PATH_ENDS {
			if let Some(idx) = find(window, suffix, start) {
				end = idx + suffix.len();
				break;
			}
		}
		if let Some(null_idx) = find(window, b"\x00", start) {
			end = end.min(null_idx);
		}

		if end <= start {
			continue;
		}

		return Some(String::from_utf8_lossy(&window[start..end]).into_owned());
	}

	None
}

/// Derive a displayable title from the path's file stem: strip known chart
/// suffixes and title-case the remainder.
fn title_from_path(filepath: &str) -> String {
	let filename = filepath
		.rsplit(['\\', '/'])
		.next()
		.unwrap_or(filepath);

	let mut stem = filename;
	for suffix in [".sng", ".chart", ".mid", ".ini"] {
		if stem.to_lowercase().ends_with(suffix) {
			stem = &stem[..stem.len() - suffix.len()];
			break;
		}
	}

	title_case(stem)
}

fn title_case(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut at_word_start = true;

	for char in text.chars() {
		if char.is_alphanumeric() {
			if at_word_start {
				out.extend(char.to_uppercase());
			} else {
				out.extend(char.to_lowercase());
			}
			at_word_start = false;
		} else {
			out.push(char);
			at_word_start = true;
		}
	}

	out
}
// }}}
