//! Song metadata and parsed chart metadata storage.
//!
//! The merge rule everywhere: a non-empty incoming field overwrites the
//! stored one, an empty incoming field never clears stored data. Clients
//! see songs at different enrichment levels (raw hash vs full metadata), so
//! the database keeps the best of everything it has been told.

// {{{ Imports
use rusqlite::{Connection, OptionalExtension};

use crate::clonehero::chart::ChartData;
use crate::clonehero::{ChartId, Difficulty, Instrument};
use crate::context::Error;
// }}}

// {{{ Song upsert
#[derive(Debug, Clone, Default)]
pub struct SongInfo {
	pub title: String,
	pub artist: String,
	pub charter: String,
}

pub fn save_song_info(conn: &Connection, chart: ChartId, info: &SongInfo) -> Result<(), Error> {
	conn.prepare_cached(
		"
      INSERT INTO songs (chart_hash, title, artist, charter)
      VALUES (?, ?, ?, ?)
      ON CONFLICT(chart_hash) DO UPDATE SET
          title = COALESCE(NULLIF(excluded.title, ''), songs.title),
          artist = COALESCE(NULLIF(excluded.artist, ''), songs.artist),
          charter = COALESCE(NULLIF(excluded.charter, ''), songs.charter)
    ",
	)?
	.execute(rusqlite::params![
		chart,
		info.title,
		info.artist,
		info.charter
	])?;
	Ok(())
}

pub fn song_title(conn: &Connection, chart: ChartId) -> Result<Option<String>, Error> {
	let title = conn
		.prepare_cached("SELECT title FROM songs WHERE chart_hash = ?")?
		.query_row([chart], |row| row.get::<_, Option<String>>("title"))
		.optional()?
		.flatten();
	Ok(title)
}
// }}}
// {{{ Unresolved hashes
/// Chart hashes a user has scores on but the songs table knows nothing
/// useful about. The client resolves these from its local files.
pub fn unresolved_hashes(conn: &Connection, user_id: i64) -> Result<Vec<String>, Error> {
	let mut query = conn.prepare_cached(
		"
      SELECT DISTINCT s.chart_hash
      FROM scores s
      LEFT JOIN songs ON songs.chart_hash = s.chart_hash
      WHERE s.user_id = ?
      AND (songs.title IS NULL OR songs.title = ''
           OR songs.title LIKE '[%]')
      ORDER BY s.chart_hash
    ",
	)?;

	let hashes = query
		.query_map([user_id], |row| row.get("chart_hash"))?
		.collect::<Result<Vec<String>, _>>()?;
	Ok(hashes)
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct HashMetadata {
	pub chart_hash: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub artist: String,
	#[serde(default)]
	pub charter: String,
}

/// Batch-apply client-resolved metadata. Returns how many rows changed.
pub fn resolve_hashes(conn: &Connection, metadata: &[HashMetadata]) -> Result<usize, Error> {
	let mut updated = 0;

	for entry in metadata {
		let Ok(chart) = entry.chart_hash.parse::<ChartId>() else {
			tracing::warn!(hash = entry.chart_hash, "Skipping malformed chart hash");
			continue;
		};
		if entry.title.is_empty() && entry.artist.is_empty() && entry.charter.is_empty() {
			continue;
		}

		save_song_info(
			conn,
			chart,
			&SongInfo {
				title: entry.title.clone(),
				artist: entry.artist.clone(),
				charter: entry.charter.clone(),
			},
		)?;
		updated += 1;
	}

	Ok(updated)
}
// }}}
// {{{ Chart metadata
#[derive(Debug, Clone)]
pub struct ChartMetadataRow {
	pub chart: ChartId,
	pub instrument: Instrument,
	pub difficulty: Difficulty,
	pub total_notes: u32,
	pub chord_count: u32,
	pub tap_count: u32,
	pub open_note_count: u32,
	pub star_power_phrases: u32,
	pub song_length_ms: u64,
	pub note_density: f64,
	pub song_name: String,
	pub artist: String,
	pub charter: String,
	pub genre: String,
	pub chart_file_path: String,
}

impl ChartMetadataRow {
	/// Every (instrument, difficulty) row a parsed chart file yields.
	pub fn from_chart_data(chart: ChartId, path: &str, data: &ChartData) -> Vec<Self> {
		data.tracks
			.iter()
			.map(|(&(instrument, difficulty), track)| Self {
				chart,
				instrument,
				difficulty,
				total_notes: track.total_playable_notes,
				chord_count: track.chord_count,
				tap_count: track.tap_count,
				open_note_count: track.open_count,
				star_power_phrases: track.star_power_phrases.len() as u32,
				song_length_ms: data.song_length_ms,
				note_density: data.note_density(instrument, difficulty),
				song_name: data.song_name.clone(),
				artist: data.artist.clone(),
				charter: data.charter.clone(),
				genre: data.genre.clone(),
				chart_file_path: path.to_owned(),
			})
			.collect()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
	pub inserted: usize,
	pub updated: usize,
}

pub fn batch_insert_chart_metadata(
	conn: &Connection,
	rows: &[ChartMetadataRow],
) -> Result<BatchCounts, Error> {
	let mut counts = BatchCounts::default();

	for row in rows {
		let existing: Option<i64> = conn
			.prepare_cached(
				"
          SELECT id FROM chart_metadata
          WHERE chart_hash = ? AND instrument_id = ? AND difficulty_id = ?
        ",
			)?
			.query_row(
				rusqlite::params![row.chart, row.instrument, row.difficulty],
				|r| r.get("id"),
			)
			.optional()?;

		conn.prepare_cached(
			"
        INSERT OR REPLACE INTO chart_metadata (
            chart_hash, instrument_id, difficulty_id,
            total_notes, chord_count, tap_count, open_note_count,
            star_power_phrases, song_length_ms, note_density,
            song_name, artist, charter, genre,
            parsed_at, chart_file_path
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, ?)
      ",
		)?
		.execute(rusqlite::params![
			row.chart,
			row.instrument,
			row.difficulty,
			row.total_notes,
			row.chord_count,
			row.tap_count,
			row.open_note_count,
			row.star_power_phrases,
			row.song_length_ms as i64,
			row.note_density,
			row.song_name,
			row.artist,
			row.charter,
			row.genre,
			row.chart_file_path,
		])?;

		if existing.is_some() {
			counts.updated += 1;
		} else {
			counts.inserted += 1;
		}
	}

	Ok(counts)
}

pub fn chart_total_notes(
	conn: &Connection,
	chart: ChartId,
	instrument: Instrument,
	difficulty: Difficulty,
) -> Result<Option<u32>, Error> {
	let notes = conn
		.prepare_cached(
			"
        SELECT total_notes FROM chart_metadata
        WHERE chart_hash = ? AND instrument_id = ? AND difficulty_id = ?
      ",
		)?
		.query_row(rusqlite::params![chart, instrument, difficulty], |row| {
			row.get("total_notes")
		})
		.optional()?;
	Ok(notes)
}
// }}}
// {{{ Bot metadata
pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, Error> {
	let value = conn
		.prepare_cached("SELECT value FROM bot_metadata WHERE key = ?")?
		.query_row([key], |row| row.get("value"))
		.optional()?;
	Ok(value)
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), Error> {
	conn.prepare_cached(
		"
      INSERT INTO bot_metadata (key, value, updated_at)
      VALUES (?, ?, CURRENT_TIMESTAMP)
      ON CONFLICT(key) DO UPDATE SET
          value = excluded.value,
          updated_at = CURRENT_TIMESTAMP
    ",
	)?
	.execute([key, value])?;
	Ok(())
}
// }}}
