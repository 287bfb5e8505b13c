//! Core identifiers shared between the game's on-disk formats, the client
//! and the server: chart ids, instruments, difficulties and the
//! (chart, instrument, difficulty) fingerprint a best score is keyed by.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::context::Error;

pub mod chart;
pub mod scoredata;
pub mod song_ini;
pub mod songcache;

// {{{ ChartId
/// Opaque 16-byte identifier the game assigns to a chart.
///
/// We make no attempt to recompute it; it's a primary key and nothing more.
/// Displayed as 32 lowercase hex chars everywhere (db, wire, state file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChartId(pub [u8; 16]);

impl ChartId {
	#[inline]
	pub fn from_bytes(bytes: [u8; 16]) -> Self {
		Self(bytes)
	}

	pub fn to_hex(self) -> String {
		let mut out = String::with_capacity(32);
		for byte in self.0 {
			out.push_str(&format!("{:02x}", byte));
		}
		out
	}

	/// First 8 hex chars, used for bracketed fallback display.
	pub fn short_hex(self) -> String {
		let mut out = String::with_capacity(8);
		for byte in &self.0[..4] {
			out.push_str(&format!("{:02x}", byte));
		}
		out
	}
}

impl Default for ChartId {
	fn default() -> Self {
		Self([0; 16])
	}
}

impl Display for ChartId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl FromStr for ChartId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() != 32 || !s.is_ascii() {
			bail!("Chart id '{s}' is not 32 hex chars");
		}

		let mut bytes = [0u8; 16];
		for (i, byte) in bytes.iter_mut().enumerate() {
			*byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
				.map_err(|_| anyhow!("Chart id '{s}' contains non-hex chars"))?;
		}

		Ok(Self(bytes))
	}
}

impl Serialize for ChartId {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for ChartId {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

impl FromSql for ChartId {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		let str: String = FromSql::column_result(value)?;
		str.parse()
			.map_err(|e: Error| FromSqlError::Other(e.into()))
	}
}

impl ToSql for ChartId {
	fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
		Ok(rusqlite::types::ToSqlOutput::from(self.to_hex()))
	}
}
// }}}
// {{{ Instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
	Lead,
	Bass,
	Rhythm,
	Keys,
	Drums,
	GhlLead,
	GhlBass,
}

impl Instrument {
	pub const INSTRUMENTS: [Self; 7] = [
		Self::Lead,
		Self::Bass,
		Self::Rhythm,
		Self::Keys,
		Self::Drums,
		Self::GhlLead,
		Self::GhlBass,
	];

	pub const INSTRUMENT_STRINGS: [&'static str; 7] = [
		"Lead Guitar",
		"Bass",
		"Rhythm",
		"Keys",
		"Drums",
		"GH Live Guitar",
		"GH Live Bass",
	];

	#[inline]
	pub fn to_index(self) -> usize {
		self as usize
	}

	/// Matches the instrument ids in the game's score file.
	#[inline]
	pub fn from_id(id: u16) -> Option<Self> {
		Self::INSTRUMENTS.get(id as usize).copied()
	}
}

impl Default for Instrument {
	fn default() -> Self {
		Self::Lead
	}
}

impl Display for Instrument {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", Self::INSTRUMENT_STRINGS[self.to_index()])
	}
}

impl FromSql for Instrument {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		let id: i64 = FromSql::column_result(value)?;
		Self::from_id(id as u16).ok_or_else(|| {
			FromSqlError::Other(format!("Cannot convert {} to an instrument", id).into())
		})
	}
}

impl ToSql for Instrument {
	fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
		Ok(rusqlite::types::ToSqlOutput::from(self.to_index() as i64))
	}
}
// }}}
// {{{ Difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
	Easy,
	Medium,
	Hard,
	Expert,
}

impl Difficulty {
	pub const DIFFICULTIES: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Expert];
	pub const DIFFICULTY_STRINGS: [&'static str; 4] = ["Easy", "Medium", "Hard", "Expert"];

	#[inline]
	pub fn to_index(self) -> usize {
		self as usize
	}

	#[inline]
	pub fn from_id(id: u8) -> Option<Self> {
		Self::DIFFICULTIES.get(id as usize).copied()
	}
}

impl Default for Difficulty {
	fn default() -> Self {
		Self::Expert
	}
}

impl Display for Difficulty {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", Self::DIFFICULTY_STRINGS[self.to_index()])
	}
}

impl FromSql for Difficulty {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		let id: i64 = FromSql::column_result(value)?;
		Self::from_id(id as u8).ok_or_else(|| {
			FromSqlError::Other(format!("Cannot convert {} to a difficulty", id).into())
		})
	}
}

impl ToSql for Difficulty {
	fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
		Ok(rusqlite::types::ToSqlOutput::from(self.to_index() as i64))
	}
}
// }}}
// {{{ NoteKind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
	Normal,
	Hopo,
	Tap,
	Open,
}
// }}}
// {{{ Fingerprint
/// The key under which a player has at most one best score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
	pub chart: ChartId,
	pub instrument: Instrument,
	pub difficulty: Difficulty,
}

impl Fingerprint {
	#[inline]
	pub fn new(chart: ChartId, instrument: Instrument, difficulty: Difficulty) -> Self {
		Self {
			chart,
			instrument,
			difficulty,
		}
	}
}

/// State-file key format: `<chart hex>:<instrument id>:<difficulty id>`.
impl Display for Fingerprint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"{}:{}:{}",
			self.chart,
			self.instrument.to_index(),
			self.difficulty.to_index()
		)
	}
}

impl FromStr for Fingerprint {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split(':');
		let chart = parts
			.next()
			.ok_or_else(|| anyhow!("Empty fingerprint key"))?
			.parse()?;
		let instrument: u16 = parts
			.next()
			.ok_or_else(|| anyhow!("Fingerprint key '{s}' is missing an instrument"))?
			.parse()?;
		let difficulty: u8 = parts
			.next()
			.ok_or_else(|| anyhow!("Fingerprint key '{s}' is missing a difficulty"))?
			.parse()?;

		if parts.next().is_some() {
			bail!("Fingerprint key '{s}' has trailing segments");
		}

		Ok(Self {
			chart,
			instrument: Instrument::from_id(instrument)
				.ok_or_else(|| anyhow!("Unknown instrument id {instrument}"))?,
			difficulty: Difficulty::from_id(difficulty)
				.ok_or_else(|| anyhow!("Unknown difficulty id {difficulty}"))?,
		})
	}
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chart_id_hex_round_trip() {
		let id = ChartId([
			0xec, 0xd1, 0xc6, 0x9a, 0xf0, 0x9e, 0xbe, 0xec, 0x96, 0xa4, 0xad, 0x24, 0x75, 0x4f,
			0x3e, 0xed,
		]);
		let hex = id.to_hex();
		assert_eq!(hex, "ecd1c69af09ebeec96a4ad24754f3eed");
		assert_eq!(hex.parse::<ChartId>().unwrap(), id);
		assert_eq!(id.short_hex(), "ecd1c69a");
	}

	#[test]
	fn fingerprint_key_round_trip() {
		let fp = Fingerprint::new(
			"ecd1c69af09ebeec96a4ad24754f3eed".parse().unwrap(),
			Instrument::Drums,
			Difficulty::Expert,
		);
		let key = fp.to_string();
		assert_eq!(key, "ecd1c69af09ebeec96a4ad24754f3eed:4:3");
		assert_eq!(key.parse::<Fingerprint>().unwrap(), fp);
	}

	#[test]
	fn rejects_malformed_keys() {
		assert!("tooshort:0:0".parse::<Fingerprint>().is_err());
		assert!("ecd1c69af09ebeec96a4ad24754f3eed:9:0"
			.parse::<Fingerprint>()
			.is_err());
		assert!("ecd1c69af09ebeec96a4ad24754f3eed:0:7"
			.parse::<Fingerprint>()
			.is_err());
	}
}
// }}}
