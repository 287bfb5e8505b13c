//! Chart file parsing: the text `.chart` format and `.mid`/`.midi` MIDI
//! charts share the [`ChartData`] output shape defined here.
//!
//! The headline number is `total_playable_notes`: one playable note per
//! distinct note tick, so a five-fret chord counts once. The game scores by
//! note onsets, and full-combo detection depends on this matching what the
//! player can actually hit.

// {{{ Imports
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::clonehero::{Difficulty, Instrument};
// }}}

pub mod midi;
pub mod text;

pub const DEFAULT_RESOLUTION: u32 = 192;

// {{{ Events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
	pub tick: u32,
	/// BPM multiplied by 1000, as stored by the `.chart` format.
	pub bpm_times_1000: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
	pub tick: u32,
	pub numerator: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarPowerPhrase {
	pub start_tick: u32,
	pub end_tick: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeSection {
	pub start_tick: u32,
	pub name: String,
}
// }}}
// {{{ Tick accumulator
/// Everything that happened at one tick of one (instrument, difficulty)
/// track. Chords and modifiers collapse into this before any counting
/// happens, which is what makes the distinct-tick rule hold by construction.
#[derive(Debug, Clone, Copy, Default)]
struct TickNotes {
	fret_mask: u8,
	open: bool,
	forced: bool,
	tap: bool,
	max_end: u32,
}

impl TickNotes {
	#[inline]
	fn is_playable(&self) -> bool {
		self.fret_mask != 0 || self.open
	}

	#[inline]
	fn fret_count(&self) -> u32 {
		self.fret_mask.count_ones()
	}
}
// }}}
// {{{ Track builder
/// Per-(instrument, difficulty) accumulator the two parsers feed into.
#[derive(Debug, Default)]
pub(crate) struct TrackBuilder {
	ticks: BTreeMap<u32, TickNotes>,
	star_power_phrases: Vec<StarPowerPhrase>,
}

impl TrackBuilder {
	pub(crate) fn add_fret(&mut self, tick: u32, fret: u8, duration: u32) {
		let notes = self.ticks.entry(tick).or_default();
		notes.fret_mask |= 1 << (fret & 0x7);
		notes.max_end = notes.max_end.max(tick + duration);
	}

	pub(crate) fn add_open(&mut self, tick: u32, duration: u32) {
		let notes = self.ticks.entry(tick).or_default();
		notes.open = true;
		notes.max_end = notes.max_end.max(tick + duration);
	}

	pub(crate) fn add_forced(&mut self, tick: u32) {
		self.ticks.entry(tick).or_default().forced = true;
	}

	pub(crate) fn add_tap(&mut self, tick: u32) {
		self.ticks.entry(tick).or_default().tap = true;
	}

	pub(crate) fn add_star_power(&mut self, start_tick: u32, duration: u32) {
		self.star_power_phrases.push(StarPowerPhrase {
			start_tick,
			end_tick: start_tick + duration,
		});
	}

	fn build(self) -> TrackData {
		let mut data = TrackData {
			star_power_phrases: self.star_power_phrases,
			..TrackData::default()
		};

		for notes in self.ticks.values() {
			if !notes.is_playable() {
				// A lone modifier with no note at its tick plays nothing.
				continue;
			}

			data.total_playable_notes += 1;
			data.max_note_end = data.max_note_end.max(notes.max_end);

			if notes.fret_count() >= 2 {
				data.chord_count += 1;
			}
			if notes.forced {
				data.hopo_count += 1;
			}
			if notes.tap {
				data.tap_count += 1;
			}
			if notes.open {
				data.open_count += 1;
			}
		}

		data
	}
}
// }}}
// {{{ Track data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackData {
	pub total_playable_notes: u32,
	pub chord_count: u32,
	pub hopo_count: u32,
	pub tap_count: u32,
	pub open_count: u32,
	pub star_power_phrases: Vec<StarPowerPhrase>,
	/// Latest note onset + sustain, in ticks. Feeds the song length.
	pub max_note_end: u32,
}
// }}}
// {{{ Chart data
#[derive(Debug, Clone, Default)]
pub struct ChartData {
	pub song_name: String,
	pub artist: String,
	pub charter: String,
	pub album: String,
	pub year: String,
	pub genre: String,

	/// Ticks per beat.
	pub resolution: u32,
	pub tempo_map: Vec<TempoChange>,
	pub time_signatures: Vec<TimeSignature>,
	pub practice_sections: Vec<PracticeSection>,

	pub tracks: HashMap<(Instrument, Difficulty), TrackData>,
	pub song_length_ms: u64,
}

impl ChartData {
	#[inline]
	pub fn track(&self, instrument: Instrument, difficulty: Difficulty) -> Option<&TrackData> {
		self.tracks.get(&(instrument, difficulty))
	}

	/// Playable notes per second over the chart's length.
	pub fn note_density(&self, instrument: Instrument, difficulty: Difficulty) -> f64 {
		let Some(track) = self.track(instrument, difficulty) else {
			return 0.0;
		};

		if self.song_length_ms == 0 {
			return 0.0;
		}

		track.total_playable_notes as f64 * 1000.0 / self.song_length_ms as f64
	}

	pub(crate) fn finish(
		&mut self,
		builders: HashMap<(Instrument, Difficulty), TrackBuilder>,
	) {
		self.tracks = builders
			.into_iter()
			.map(|(key, builder)| (key, builder.build()))
			.collect();

		self.tempo_map.sort_by_key(|change| change.tick);
		self.song_length_ms = self.compute_song_length_ms();
	}

	/// Integrate the piecewise-constant tempo map from tick 0 to the last
	/// note end. The first tempo change covers everything before it (charts
	/// put one at tick 0 anyway).
	fn compute_song_length_ms(&self) -> u64 {
		let max_tick = self
			.tracks
			.values()
			.map(|track| track.max_note_end)
			.max()
			.unwrap_or(0);

		if max_tick == 0 || self.tempo_map.is_empty() {
			return 0;
		}

		let ticks_per_beat = if self.resolution > 0 {
			self.resolution
		} else {
			DEFAULT_RESOLUTION
		};

		let mut total_ms = 0.0f64;
		for (i, change) in self.tempo_map.iter().enumerate() {
			let segment_start = if i == 0 { 0 } else { change.tick.min(max_tick) };
			let segment_end = self
				.tempo_map
				.get(i + 1)
				.map(|next| next.tick)
				.unwrap_or(max_tick)
				.min(max_tick);

			if segment_end <= segment_start || change.bpm_times_1000 == 0 {
				continue;
			}

			let beats = (segment_end - segment_start) as f64 / ticks_per_beat as f64;
			let bpm = change.bpm_times_1000 as f64 / 1000.0;
			total_ms += beats / bpm * 60_000.0;
		}

		total_ms as u64
	}
}
// }}}
// {{{ Format dispatch
/// Parse a chart file, auto-detecting the format from the extension.
///
/// Returns `None` on any structural error (logged at warn); partial data is
/// never surfaced.
pub fn parse_file(path: &Path) -> Option<ChartData> {
	let extension = path
		.extension()
		.map(|ext| ext.to_string_lossy().to_lowercase())
		.unwrap_or_default();

	let result = match extension.as_str() {
		"chart" => text::parse_file(path),
		"mid" | "midi" => midi::parse_file(path),
		_ => {
			tracing::warn!(?path, "Unsupported chart format");
			return None;
		}
	};

	match result {
		Ok(data) => Some(data),
		Err(error) => {
			tracing::warn!(?path, %error, "Failed to parse chart file");
			None
		}
	}
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chord_collapses_to_one_playable_note() {
		let mut builder = TrackBuilder::default();
		builder.add_fret(100, 0, 0);
		builder.add_fret(100, 1, 0);
		builder.add_fret(100, 2, 0);
		builder.add_fret(200, 0, 0);

		let track = builder.build();
		assert_eq!(track.total_playable_notes, 2);
		assert_eq!(track.chord_count, 1);
		assert_eq!(track.hopo_count, 0);
		assert_eq!(track.tap_count, 0);
	}

	#[test]
	fn modifiers_do_not_create_notes() {
		let mut builder = TrackBuilder::default();
		builder.add_fret(100, 0, 0);
		builder.add_forced(100);
		builder.add_tap(300);

		let track = builder.build();
		assert_eq!(track.total_playable_notes, 1);
		assert_eq!(track.hopo_count, 1);
		// The tap at tick 300 has no note under it
		assert_eq!(track.tap_count, 0);
	}

	#[test]
	fn song_length_integrates_tempo_segments() {
		let mut data = ChartData {
			resolution: 192,
			tempo_map: vec![
				TempoChange {
					tick: 0,
					bpm_times_1000: 120_000,
				},
				TempoChange {
					tick: 192 * 4,
					bpm_times_1000: 240_000,
				},
			],
			..ChartData::default()
		};

		let mut builder = TrackBuilder::default();
		builder.add_fret(192 * 8, 0, 0);
		let mut builders = HashMap::new();
		builders.insert((Instrument::Lead, Difficulty::Expert), builder);
		data.finish(builders);

		// 4 beats at 120bpm = 2000ms, 4 beats at 240bpm = 1000ms
		assert_eq!(data.song_length_ms, 3000);
	}

	#[test]
	fn density_is_zero_without_length() {
		let data = ChartData::default();
		assert_eq!(data.note_density(Instrument::Lead, Difficulty::Expert), 0.0);
	}
}
// }}}
