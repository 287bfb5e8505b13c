//! Decoder for the game's packed score file (`scoredata.bin`).
//!
//! Layout (everything little-endian):
//!
//! ```text
//! header(4) songCount(u32)
//! per song:  chartId(16) instrCount(u8) playCount(u24)
//! per instr: instrId(u16) difficulty(u8) num(u16) den(u16)
//!            stars(u8) padding(4) score(u32)
//! ```
//!
//! The completion numerator/denominator are a game-internal metric, NOT
//! notes hit/total. They are surfaced only as an opaque percentage.

// {{{ Imports
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use byteorder::{LittleEndian, ReadBytesExt};

use crate::clonehero::{ChartId, Difficulty, Fingerprint, Instrument};
use crate::context::Error;
// }}}

// {{{ Score record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
	pub fingerprint: Fingerprint,
	pub score: u32,
	pub stars: u8,
	pub completion_percent: f64,
	pub play_count: u32,
}
// }}}
// {{{ Decoding
/// Decode every score record in the file.
///
/// Instrument records with ids the game doesn't document yet are skipped
/// (the surrounding song still decodes); truncation inside a record is an
/// error. Bytes after the declared song count are ignored, so files written
/// by future game versions with trailing sections still decode.
pub fn decode(bytes: &[u8]) -> Result<Vec<ScoreRecord>, Error> {
	let mut cursor = bytes;
	let mut records = Vec::new();

	let mut header = [0u8; 4];
	cursor
		.read_exact(&mut header)
		.with_context(|| "Score file too short for header")?;

	let song_count = cursor
		.read_u32::<LittleEndian>()
		.with_context(|| "Score file too short for song count")?;

	for song_index in 0..song_count {
		let mut id_bytes = [0u8; 16];
		cursor
			.read_exact(&mut id_bytes)
			.with_context(|| format!("Truncated chart id in song {song_index}"))?;
		let chart = ChartId::from_bytes(id_bytes);

		let instrument_count = cursor
			.read_u8()
			.with_context(|| format!("Truncated instrument count in song {song_index}"))?;
		let play_count = cursor
			.read_u24::<LittleEndian>()
			.with_context(|| format!("Truncated play count in song {song_index}"))?;

		for _ in 0..instrument_count {
			let instrument_id = cursor
				.read_u16::<LittleEndian>()
				.with_context(|| format!("Truncated instrument record in song {song_index}"))?;
			let difficulty_id = cursor
				.read_u8()
				.with_context(|| format!("Truncated difficulty in song {song_index}"))?;
			let numerator = cursor
				.read_u16::<LittleEndian>()
				.with_context(|| format!("Truncated completion data in song {song_index}"))?;
			let denominator = cursor
				.read_u16::<LittleEndian>()
				.with_context(|| format!("Truncated completion data in song {song_index}"))?;
			let stars = cursor
				.read_u8()
				.with_context(|| format!("Truncated star count in song {song_index}"))?;

			let mut padding = [0u8; 4];
			cursor
				.read_exact(&mut padding)
				.with_context(|| format!("Truncated padding in song {song_index}"))?;

			let score = cursor
				.read_u32::<LittleEndian>()
				.with_context(|| format!("Truncated score in song {song_index}"))?;

			let (Some(instrument), Some(difficulty)) = (
				Instrument::from_id(instrument_id),
				Difficulty::from_id(difficulty_id),
			) else {
				tracing::warn!(
					instrument_id,
					difficulty_id,
					chart = %chart,
					"Skipping score record with unknown instrument/difficulty"
				);
				continue;
			};

			let completion_percent = if denominator > 0 {
				numerator as f64 / denominator as f64 * 100.0
			} else {
				0.0
			};

			records.push(ScoreRecord {
				fingerprint: Fingerprint::new(chart, instrument, difficulty),
				score,
				stars,
				completion_percent,
				play_count,
			});
		}
	}

	Ok(records)
}

pub fn decode_file(path: &Path) -> Result<Vec<ScoreRecord>, Error> {
	let bytes =
		std::fs::read(path).with_context(|| format!("Could not read score file at {path:?}"))?;
	decode(&bytes)
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use byteorder::WriteBytesExt;

	use super::*;

	// {{{ Synthesizer
	struct SongEntry {
		chart: ChartId,
		play_count: u32,
		instruments: Vec<(u16, u8, u16, u16, u8, u32)>,
	}

	fn synthesize(songs: &[SongEntry]) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&[0x20, 0x06, 0x20, 0x08]);
		out.write_u32::<LittleEndian>(songs.len() as u32).unwrap();

		for song in songs {
			out.extend_from_slice(&song.chart.0);
			out.write_u8(song.instruments.len() as u8).unwrap();
			out.write_u24::<LittleEndian>(song.play_count).unwrap();

			for &(instrument, difficulty, num, den, stars, score) in &song.instruments {
				out.write_u16::<LittleEndian>(instrument).unwrap();
				out.write_u8(difficulty).unwrap();
				out.write_u16::<LittleEndian>(num).unwrap();
				out.write_u16::<LittleEndian>(den).unwrap();
				out.write_u8(stars).unwrap();
				out.extend_from_slice(&[1, 0, 0, 0]);
				out.write_u32::<LittleEndian>(score).unwrap();
			}
		}

		out
	}

	fn chart(fill: u8) -> ChartId {
		ChartId([fill; 16])
	}
	// }}}

	#[test]
	fn round_trips_synthesized_records() {
		let bytes = synthesize(&[
			SongEntry {
				chart: chart(0xab),
				play_count: 17,
				instruments: vec![(0, 3, 950, 1000, 5, 147_392), (4, 2, 10, 100, 1, 22_000)],
			},
			SongEntry {
				chart: chart(0x01),
				play_count: 1,
				instruments: vec![(1, 0, 0, 0, 0, 5_000)],
			},
		]);

		let records = decode(&bytes).unwrap();
		assert_eq!(records.len(), 3);

		assert_eq!(
			records[0].fingerprint,
			Fingerprint::new(chart(0xab), Instrument::Lead, Difficulty::Expert)
		);
		assert_eq!(records[0].score, 147_392);
		assert_eq!(records[0].stars, 5);
		assert_eq!(records[0].play_count, 17);
		assert!((records[0].completion_percent - 95.0).abs() < 1e-9);

		assert_eq!(records[1].fingerprint.instrument, Instrument::Drums);
		assert_eq!(records[1].fingerprint.difficulty, Difficulty::Hard);

		// den == 0 must yield 0%, not a division error
		assert_eq!(records[2].completion_percent, 0.0);
	}

	#[test]
	fn tolerates_trailing_bytes() {
		let mut bytes = synthesize(&[SongEntry {
			chart: chart(0x42),
			play_count: 3,
			instruments: vec![(0, 3, 1, 2, 4, 100_000)],
		}]);
		bytes.extend_from_slice(b"future version section");

		let records = decode(&bytes).unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].score, 100_000);
	}

	#[test]
	fn fails_on_truncated_record() {
		let bytes = synthesize(&[SongEntry {
			chart: chart(0x42),
			play_count: 3,
			instruments: vec![(0, 3, 1, 2, 4, 100_000)],
		}]);

		// Chop the file in the middle of the instrument record
		let err = decode(&bytes[..bytes.len() - 6]).unwrap_err();
		assert!(err.to_string().contains("Truncated"));
	}

	#[test]
	fn skips_unknown_instruments() {
		let bytes = synthesize(&[SongEntry {
			chart: chart(0x42),
			play_count: 1,
			instruments: vec![(99, 3, 1, 2, 4, 1_000), (0, 3, 1, 2, 4, 2_000)],
		}]);

		let records = decode(&bytes).unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].score, 2_000);
	}
}
// }}}
