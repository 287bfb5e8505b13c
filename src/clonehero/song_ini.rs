//! Forgiving reader for the `song.ini` file that sits next to most chart
//! files. Real-world files are messy: BOMs, `[song]` vs `[Song]`, duplicate
//! keys, stray whitespace. We match sections case-insensitively, never
//! interpolate, and take the first non-empty value for each field.

// {{{ Imports
use std::path::Path;

use crate::clonehero::chart::ChartData;
// }}}

// {{{ Song ini data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongIni {
	pub name: String,
	pub artist: String,
	pub album: String,
	pub genre: String,
	pub year: String,
	pub charter: String,
	pub song_length_ms: Option<u64>,
}

impl SongIni {
	pub fn is_empty(&self) -> bool {
		self.name.is_empty()
			&& self.artist.is_empty()
			&& self.album.is_empty()
			&& self.genre.is_empty()
			&& self.year.is_empty()
			&& self.charter.is_empty()
			&& self.song_length_ms.is_none()
	}

	/// Fill gaps in chart-parsed metadata. Chart data wins where present.
	pub fn merge_into(&self, data: &mut ChartData) {
		if data.song_name.is_empty() {
			data.song_name = self.name.clone();
		}
		if data.artist.is_empty() {
			data.artist = self.artist.clone();
		}
		if data.charter.is_empty() {
			data.charter = self.charter.clone();
		}
		if data.album.is_empty() {
			data.album = self.album.clone();
		}
		if data.genre.is_empty() {
			data.genre = self.genre.clone();
		}
		if data.year.is_empty() {
			data.year = self.year.clone();
		}
	}
}
// }}}
// {{{ Parse
pub fn parse(content: &str) -> SongIni {
	let content = content.strip_prefix('\u{feff}').unwrap_or(content);

	let mut ini = SongIni::default();
	let mut in_song_section = false;

	for line in content.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
			continue;
		}

		if line.starts_with('[') && line.ends_with(']') {
			in_song_section = line[1..line.len() - 1].eq_ignore_ascii_case("song");
			continue;
		}

		if !in_song_section {
			continue;
		}

		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let key = key.trim().to_lowercase();
		let value = value.trim();
		if value.is_empty() {
			continue;
		}

		match key.as_str() {
			"name" | "title" | "song" if ini.name.is_empty() => ini.name = value.to_owned(),
			"artist" if ini.artist.is_empty() => ini.artist = value.to_owned(),
			"album" if ini.album.is_empty() => ini.album = value.to_owned(),
			"genre" if ini.genre.is_empty() => ini.genre = value.to_owned(),
			"year" if ini.year.is_empty() => ini.year = value.to_owned(),
			"charter" | "frets" if ini.charter.is_empty() => ini.charter = value.to_owned(),
			"song_length" if ini.song_length_ms.is_none() => {
				ini.song_length_ms = value.parse().ok();
			}
			_ => {}
		}
	}

	ini
}

/// Look for `song.ini` next to a chart file (or one directory up, for nested
/// chart layouts). `.sng` bundles have no adjacent ini.
pub fn for_chart_file(chart_path: &Path) -> Option<SongIni> {
	if chart_path
		.extension()
		.is_some_and(|ext| ext.eq_ignore_ascii_case("sng"))
	{
		return None;
	}

	let folder = chart_path.parent()?;
	let candidates = [
		folder.join("song.ini"),
		folder.parent()?.join("song.ini"),
	];

	for candidate in candidates {
		let Ok(content) = std::fs::read_to_string(&candidate) else {
			continue;
		};

		let ini = parse(&content);
		if !ini.is_empty() {
			return Some(ini);
		}
	}

	None
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_song_section_case_insensitively() {
		let ini = parse("\u{feff}[song]\nname = Through the Fire\nartist=DragonForce\ncharter = Narrow\nsong_length = 444000\n");
		assert_eq!(ini.name, "Through the Fire");
		assert_eq!(ini.artist, "DragonForce");
		assert_eq!(ini.charter, "Narrow");
		assert_eq!(ini.song_length_ms, Some(444_000));
	}

	#[test]
	fn ignores_other_sections_and_comments() {
		let ini = parse("[display]\nname = nope\n; comment\n[Song]\nname = Yep\n");
		assert_eq!(ini.name, "Yep");
	}

	#[test]
	fn first_value_wins() {
		let ini = parse("[Song]\nname = First\ntitle = Second\n");
		assert_eq!(ini.name, "First");
	}

	#[test]
	fn frets_key_maps_to_charter() {
		let ini = parse("[Song]\nfrets = SomeCharter\n");
		assert_eq!(ini.charter, "SomeCharter");
	}

	#[test]
	fn empty_file_is_empty() {
		assert!(parse("").is_empty());
		assert!(parse("[Song]\nname =\n").is_empty());
	}
}
// }}}
