//! Parser for `.mid`/`.midi` charts, built on [`midly`].
//!
//! Instrument tracks are identified by their track name (`PART GUITAR` and
//! friends); MIDI note numbers map by range to (difficulty, fret). Tempo
//! events are honored from every track since some charts keep them outside
//! track 0.

// {{{ Imports
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::clonehero::chart::{ChartData, PracticeSection, TempoChange, TrackBuilder};
use crate::clonehero::{Difficulty, Instrument};
use crate::context::Error;
// }}}

// {{{ Note maps
const TRACK_NAMES: [(&str, Instrument); 5] = [
	("PART GUITAR", Instrument::Lead),
	("PART BASS", Instrument::Bass),
	("PART RHYTHM", Instrument::Rhythm),
	("PART KEYS", Instrument::Keys),
	("PART DRUMS", Instrument::Drums),
];

fn guitar_slot(key: u8) -> Option<(Difficulty, u8)> {
	match key {
		96..=100 => Some((Difficulty::Expert, key - 96)),
		84..=88 => Some((Difficulty::Hard, key - 84)),
		72..=76 => Some((Difficulty::Medium, key - 72)),
		60..=64 => Some((Difficulty::Easy, key - 60)),
		_ => None,
	}
}

fn drum_slot(key: u8) -> Option<(Difficulty, u8)> {
	// Orange cymbal lives outside the expert range
	if key == 110 {
		return Some((Difficulty::Expert, 5));
	}
	guitar_slot(key)
}
// }}}
// {{{ Parse
pub fn parse_file(path: &Path) -> Result<ChartData, Error> {
	let bytes = std::fs::read(path).with_context(|| format!("Could not read {path:?}"))?;
	parse(&bytes)
}

pub fn parse(bytes: &[u8]) -> Result<ChartData, Error> {
	let smf = Smf::parse(bytes).with_context(|| "Not a valid MIDI file")?;

	let resolution = match smf.header.timing {
		Timing::Metrical(ticks_per_beat) => ticks_per_beat.as_int() as u32,
		Timing::Timecode(..) => {
			anyhow::bail!("SMPTE-timed MIDI charts are not supported")
		}
	};

	let mut data = ChartData {
		resolution,
		..ChartData::default()
	};
	let mut builders: HashMap<(Instrument, Difficulty), TrackBuilder> = HashMap::new();

	for track in &smf.tracks {
		let track_name = track_name(track);

		collect_tempo(&mut data, track);

		match track_name.as_deref() {
			Some("EVENTS") => collect_sections(&mut data, track),
			Some(name) => {
				if let Some(&(_, instrument)) =
					TRACK_NAMES.iter().find(|(candidate, _)| *candidate == name)
				{
					collect_notes(&mut builders, instrument, track);
				}
			}
			None => {}
		}
	}

	data.finish(builders);
	Ok(data)
}
// }}}
// {{{ Track passes
fn track_name(track: &[TrackEvent]) -> Option<String> {
	track.iter().find_map(|event| match event.kind {
		TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
			Some(String::from_utf8_lossy(name).into_owned())
		}
		_ => None,
	})
}

fn collect_tempo(data: &mut ChartData, track: &[TrackEvent]) {
	let mut time = 0u32;
	for event in track {
		time += event.delta.as_int();
		if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) = event.kind {
			let us_per_beat = us_per_beat.as_int() as u64;
			let bpm_times_1000 = if us_per_beat > 0 {
				(60_000_000_000 / us_per_beat) as u32
			} else {
				120_000
			};

			data.tempo_map.push(TempoChange {
				tick: time,
				bpm_times_1000,
			});
		}
	}
}

/// `[section <name>]` text events on the EVENTS track.
fn collect_sections(data: &mut ChartData, track: &[TrackEvent]) {
	let mut time = 0u32;
	for event in track {
		time += event.delta.as_int();
		let TrackEventKind::Meta(MetaMessage::Text(text)) = event.kind else {
			continue;
		};

		let text = String::from_utf8_lossy(text);
		let trimmed = text.trim();
		if !trimmed.starts_with('[') || !trimmed.ends_with(']') {
			continue;
		}

		let inner = &trimmed[1..trimmed.len() - 1];
		if inner.to_lowercase().starts_with("section ") {
			let Some(name) = inner.get("section ".len()..) else {
				continue;
			};

			data.practice_sections.push(PracticeSection {
				start_tick: time,
				name: name.to_owned(),
			});
		}
	}
}

fn collect_notes(
	builders: &mut HashMap<(Instrument, Difficulty), TrackBuilder>,
	instrument: Instrument,
	track: &[TrackEvent],
) {
	let slot = if instrument == Instrument::Drums {
		drum_slot
	} else {
		guitar_slot
	};

	let mut time = 0u32;
	let mut note_starts: HashMap<u8, u32> = HashMap::new();

	for event in track {
		time += event.delta.as_int();
		let TrackEventKind::Midi { message, .. } = event.kind else {
			continue;
		};

		match message {
			MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
				note_starts.insert(key.as_int(), time);
			}
			MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
				let Some(start) = note_starts.remove(&key.as_int()) else {
					continue;
				};
				let Some((difficulty, fret)) = slot(key.as_int()) else {
					continue;
				};

				builders
					.entry((instrument, difficulty))
					.or_default()
					.add_fret(start, fret, time - start);
			}
			_ => {}
		}
	}
}
// }}}
