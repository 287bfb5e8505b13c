//! Parser for the text-based `.chart` format.
//!
//! The format is a sequence of named sections:
//!
//! ```text
//! [SectionName]
//! {
//!   key = value
//! }
//! ```
//!
//! `[Song]` holds metadata, `[SyncTrack]` tempo events, `[Events]` practice
//! markers, and one section per (instrument, difficulty) holds note events.
//! Unknown sections are skipped so charts from newer chart editors still
//! parse.

// {{{ Imports
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::clonehero::chart::{
	ChartData, PracticeSection, TempoChange, TimeSignature, TrackBuilder, DEFAULT_RESOLUTION,
};
use crate::clonehero::{Difficulty, Instrument, NoteKind};
use crate::context::Error;
// }}}

// {{{ Section name table
const INSTRUMENT_SUFFIXES: [(&str, Instrument); 7] = [
	("Single", Instrument::Lead),
	("DoubleBass", Instrument::Bass),
	("DoubleRhythm", Instrument::Rhythm),
	("Keyboard", Instrument::Keys),
	("Drums", Instrument::Drums),
	("GHLGuitar", Instrument::GhlLead),
	("GHLBass", Instrument::GhlBass),
];

fn parse_section_name(name: &str) -> Option<(Instrument, Difficulty)> {
	for (i, prefix) in Difficulty::DIFFICULTY_STRINGS.iter().enumerate() {
		let Some(rest) = name.strip_prefix(prefix) else {
			continue;
		};

		for (suffix, instrument) in INSTRUMENT_SUFFIXES {
			if rest == suffix {
				return Some((instrument, Difficulty::DIFFICULTIES[i]));
			}
		}
	}

	None
}
// }}}
// {{{ Parse
pub fn parse_file(path: &Path) -> Result<ChartData, Error> {
	let content =
		std::fs::read_to_string(path).with_context(|| format!("Could not read {path:?}"))?;
	parse(&content)
}

pub fn parse(content: &str) -> Result<ChartData, Error> {
	let content = content.strip_prefix('\u{feff}').unwrap_or(content);

	let mut data = ChartData {
		resolution: DEFAULT_RESOLUTION,
		..ChartData::default()
	};
	let mut builders: HashMap<(Instrument, Difficulty), TrackBuilder> = HashMap::new();

	let mut current_section: Option<String> = None;
	for line in content.lines() {
		let line = line.trim();
		if line.is_empty() || line == "{" || line == "}" {
			continue;
		}

		if line.starts_with('[') && line.ends_with(']') {
			current_section = Some(line[1..line.len() - 1].to_owned());
			continue;
		}

		let Some(section) = current_section.as_deref() else {
			continue;
		};

		match section {
			"Song" => parse_song_line(&mut data, line),
			"SyncTrack" => parse_sync_line(&mut data, line),
			"Events" => parse_event_line(&mut data, line),
			_ => {
				if let Some(key) = parse_section_name(section) {
					parse_note_line(builders.entry(key).or_default(), line);
				}
			}
		}
	}

	data.finish(builders);
	Ok(data)
}
// }}}
// {{{ Line parsers
/// `key = value` or `key = "value"`.
fn parse_song_line(data: &mut ChartData, line: &str) {
	let Some((key, value)) = line.split_once('=') else {
		return;
	};
	let key = key.trim();
	let value = value.trim().trim_matches('"').trim();

	match key {
		"Name" => data.song_name = value.to_owned(),
		"Artist" => data.artist = value.to_owned(),
		"Charter" => data.charter = value.to_owned(),
		"Album" => data.album = value.to_owned(),
		"Year" => data.year = value.to_owned(),
		"Genre" => data.genre = value.to_owned(),
		"Resolution" => {
			if let Ok(resolution) = value.parse() {
				data.resolution = resolution;
			}
		}
		_ => {}
	}
}

/// `tick = B bpm_times_1000` and `tick = TS numerator`.
fn parse_sync_line(data: &mut ChartData, line: &str) {
	let Some((tick, event, value)) = split_event(line) else {
		return;
	};
	let Ok(value) = value.parse::<u32>() else {
		return;
	};

	match event {
		"B" => data.tempo_map.push(TempoChange {
			tick,
			bpm_times_1000: value,
		}),
		"TS" => data.time_signatures.push(TimeSignature {
			tick,
			numerator: value,
		}),
		_ => {}
	}
}

/// `tick = E "section <name>"`.
fn parse_event_line(data: &mut ChartData, line: &str) {
	let Some((lhs, rhs)) = line.split_once('=') else {
		return;
	};
	let Ok(tick) = lhs.trim().parse::<u32>() else {
		return;
	};

	let rhs = rhs.trim();
	let Some(text) = rhs.strip_prefix('E') else {
		return;
	};
	let text = text.trim().trim_matches('"');

	if let Some(name) = text.strip_prefix("section ") {
		data.practice_sections.push(PracticeSection {
			start_tick: tick,
			name: name.to_owned(),
		});
	}
}

/// `tick = N code duration` and `tick = S 2 duration`.
///
/// Note codes 0-4 are colored frets, 5 marks the chord at that tick as
/// forced (hopo), 6 as tap, and 7 is an open note. The modifiers attach to
/// the simultaneous chord instead of adding a note of their own.
fn parse_note_line(builder: &mut TrackBuilder, line: &str) {
	let Some((tick, event, rest)) = split_event_rest(line) else {
		return;
	};

	let mut parts = rest.split_whitespace();
	let Some(Ok(code)) = parts.next().map(|c| c.parse::<u32>()) else {
		return;
	};
	let duration = parts
		.next()
		.and_then(|d| d.parse::<u32>().ok())
		.unwrap_or(0);

	match event {
		"N" => {
			let fret = code % 8;
			let kind = match fret {
				0..=4 => NoteKind::Normal,
				5 => NoteKind::Hopo,
				6 => NoteKind::Tap,
				_ => NoteKind::Open,
			};

			match kind {
				NoteKind::Normal => builder.add_fret(tick, fret as u8, duration),
				NoteKind::Hopo => builder.add_forced(tick),
				NoteKind::Tap => builder.add_tap(tick),
				NoteKind::Open => builder.add_open(tick, duration),
			}
		}
		"S" if code == 2 => builder.add_star_power(tick, duration),
		_ => {}
	}
}

fn split_event(line: &str) -> Option<(u32, &str, &str)> {
	let (tick, event, rest) = split_event_rest(line)?;
	Some((tick, event, rest.split_whitespace().next()?))
}

fn split_event_rest(line: &str) -> Option<(u32, &str, &str)> {
	let (lhs, rhs) = line.split_once('=')?;
	let tick = lhs.trim().parse().ok()?;
	let mut parts = rhs.trim().splitn(2, char::is_whitespace);
	let event = parts.next()?;
	Some((tick, event, parts.next().unwrap_or("")))
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[Song]
{
  Name = "Example Song"
  Artist = "Example Artist"
  Charter = "somecharter"
  Resolution = 192
}
[SyncTrack]
{
  0 = TS 4
  0 = B 120000
}
[Events]
{
  0 = E "section Intro"
  768 = E "section Solo 1"
}
[ExpertSingle]
{
  100 = N 0 0
  100 = N 1 0
  100 = N 2 0
  200 = N 0 0
}
"#;

	#[test]
	fn counts_chords_as_one_playable_note() {
		let data = parse(MINIMAL).unwrap();
		let track = data.track(Instrument::Lead, Difficulty::Expert).unwrap();

		assert_eq!(track.total_playable_notes, 2);
		assert_eq!(track.chord_count, 1);
		assert_eq!(track.hopo_count, 0);
		assert_eq!(track.tap_count, 0);
	}

	#[test]
	fn reads_song_metadata() {
		let data = parse(MINIMAL).unwrap();
		assert_eq!(data.song_name, "Example Song");
		assert_eq!(data.artist, "Example Artist");
		assert_eq!(data.charter, "somecharter");
		assert_eq!(data.resolution, 192);
		assert_eq!(data.tempo_map.len(), 1);
		assert_eq!(data.time_signatures[0].numerator, 4);
	}

	#[test]
	fn reads_practice_sections() {
		let data = parse(MINIMAL).unwrap();
		assert_eq!(data.practice_sections.len(), 2);
		assert_eq!(data.practice_sections[1].name, "Solo 1");
		assert_eq!(data.practice_sections[1].start_tick, 768);
	}

	#[test]
	fn modifiers_attach_to_chords() {
		let content = r#"
[Song]
{
  Resolution = 192
}
[SyncTrack]
{
  0 = B 120000
}
[ExpertSingle]
{
  100 = N 0 0
  100 = N 5 0
  200 = N 2 0
  200 = N 6 0
  300 = N 7 96
  400 = S 2 192
}
"#;
		let data = parse(content).unwrap();
		let track = data.track(Instrument::Lead, Difficulty::Expert).unwrap();

		assert_eq!(track.total_playable_notes, 3);
		assert_eq!(track.hopo_count, 1);
		assert_eq!(track.tap_count, 1);
		assert_eq!(track.open_count, 1);
		assert_eq!(track.star_power_phrases.len(), 1);
		assert_eq!(track.star_power_phrases[0].end_tick, 592);
	}

	#[test]
	fn skips_unknown_sections() {
		let content = "[Song]\n{\nResolution = 192\n}\n[Weirdness]\n{\n100 = N 0 0\n}\n";
		let data = parse(content).unwrap();
		assert!(data.tracks.is_empty());
	}

	#[test]
	fn maps_ghl_and_drum_sections() {
		let content = r#"
[SyncTrack]
{
  0 = B 120000
}
[HardDrums]
{
  0 = N 0 0
}
[ExpertGHLGuitar]
{
  0 = N 1 0
}
"#;
		let data = parse(content).unwrap();
		assert!(data.track(Instrument::Drums, Difficulty::Hard).is_some());
		assert!(data.track(Instrument::GhlLead, Difficulty::Expert).is_some());
	}

	#[test]
	fn tolerates_bom() {
		let content = "\u{feff}[Song]\n{\nName = Bommed\n}\n";
		let data = parse(content).unwrap();
		assert_eq!(data.song_name, "Bommed");
	}

	#[test]
	fn computes_length_and_density() {
		let data = parse(MINIMAL).unwrap();
		// Last note at tick 200, 120bpm at 192 tpb: 200/192 beats * 500ms
		assert_eq!(data.song_length_ms, 520);

		let nps = data.note_density(Instrument::Lead, Difficulty::Expert);
		assert!((nps - 2.0 * 1000.0 / 520.0).abs() < 1e-9);
	}
}
// }}}
