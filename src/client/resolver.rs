//! Multi-source metadata resolution for a freshly detected score.
//!
//! Precedence for title/artist/charter: the live now-playing cache, then
//! the game's song cache, then the chart file itself (with its adjacent
//! `song.ini`). Note counts and NPS only ever come from chart parsing; the
//! score file's numerator/denominator are NOT note counts and must never be
//! plumbed into those fields.

// {{{ Imports
use std::collections::HashMap;
use std::sync::Arc;

use crate::client::chart_lookup::ChartFileCache;
use crate::client::now_playing::NowPlayingCache;
use crate::clonehero::scoredata::ScoreRecord;
use crate::clonehero::songcache::CacheEntry;
use crate::clonehero::{chart, song_ini, ChartId};
use crate::links::strip_color_tags;
use crate::songs::SongInfo;
// }}}

// {{{ Enriched score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreType {
	/// Only the chart hash is known.
	Raw,
	/// At least one metadata source resolved.
	Rich,
}

impl ScoreType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Raw => "raw",
			Self::Rich => "rich",
		}
	}
}

#[derive(Debug, Clone)]
pub struct EnrichedScore {
	pub record: ScoreRecord,
	pub song: SongInfo,
	pub score_type: ScoreType,
	pub notes_hit: Option<u32>,
	pub notes_total: Option<u32>,
	pub total_notes_in_chart: Option<u32>,
	pub nps: Option<f64>,
}

impl EnrichedScore {
	/// Display name for terminal output: song title, or the bracketed short
	/// id when nothing resolved.
	pub fn display_title(&self) -> String {
		if self.song.title.is_empty() {
			format!("[{}]", self.record.fingerprint.chart.short_hex())
		} else {
			self.song.title.clone()
		}
	}
}
// }}}
// {{{ Resolver
pub struct MetadataResolver {
	now_playing: Arc<NowPlayingCache>,
	song_cache: HashMap<ChartId, CacheEntry>,
	chart_files: ChartFileCache,
}

impl MetadataResolver {
	pub fn new(
		now_playing: Arc<NowPlayingCache>,
		song_cache: HashMap<ChartId, CacheEntry>,
		chart_files: ChartFileCache,
	) -> Self {
		Self {
			now_playing,
			song_cache,
			chart_files,
		}
	}

	pub fn resolve(&self, record: &ScoreRecord) -> EnrichedScore {
		self.resolve_inner(record, true)
	}

	/// Resolution for scores that are not "the song that just ended": the
	/// live now-playing cache is skipped since it describes the present,
	/// not the chart in question.
	pub fn resolve_offline(&self, record: &ScoreRecord) -> EnrichedScore {
		self.resolve_inner(record, false)
	}

	fn resolve_inner(&self, record: &ScoreRecord, use_live_source: bool) -> EnrichedScore {
		let chart = record.fingerprint.chart;
		let mut song = SongInfo::default();
		let mut resolved_any = false;

		// {{{ Source 1: live now-playing cache
		if let Some(now_playing) = self.now_playing.current().filter(|_| use_live_source) {
			song.title = strip_color_tags(&now_playing.title);
			song.artist = strip_color_tags(&now_playing.artist);
			song.charter = strip_color_tags(&now_playing.charter);
			resolved_any = true;
			tracing::debug!(title = song.title, "Metadata from now-playing export");
		}
		// }}}
		// {{{ Source 2: the game's song cache
		if song.title.is_empty() {
			if let Some(entry) = self.song_cache.get(&chart) {
				if !entry.title.is_empty() {
					song.title = entry.title.clone();
					resolved_any = true;
					tracing::debug!(title = song.title, "Metadata from song cache");
				}
			}
		}
		// }}}
		// {{{ Source 3: the chart file itself
		let mut total_notes_in_chart = None;
		let mut nps = None;

		if let Some(chart_path) = self.chart_files.find(chart) {
			if let Some(mut data) = chart::parse_file(&chart_path) {
				if let Some(ini) = song_ini::for_chart_file(&chart_path) {
					ini.merge_into(&mut data);
				}

				if let Some(track) = data.track(
					record.fingerprint.instrument,
					record.fingerprint.difficulty,
				) {
					total_notes_in_chart = Some(track.total_playable_notes);
					nps = Some(data.note_density(
						record.fingerprint.instrument,
						record.fingerprint.difficulty,
					));
					resolved_any = true;
				}

				if song.title.is_empty() && !data.song_name.is_empty() {
					song.title = data.song_name.clone();
					resolved_any = true;
				}
				if song.artist.is_empty() && !data.artist.is_empty() {
					song.artist = data.artist.clone();
				}
				if song.charter.is_empty() && !data.charter.is_empty() {
					song.charter = strip_color_tags(&data.charter);
				}
			}
		}
		// }}}
		// {{{ Derived note counts
		// notes_hit is a truncated estimate from the opaque completion
		// percent; the chart's own count is the denominator. Full-combo
		// detection is the server's call, so no snapping happens here.
		let notes_total = total_notes_in_chart;
		let notes_hit = notes_total
			.filter(|_| record.completion_percent > 0.0)
			.map(|total| (total as f64 * record.completion_percent / 100.0) as u32);
		// }}}

		EnrichedScore {
			record: *record,
			song,
			score_type: if resolved_any {
				ScoreType::Rich
			} else {
				ScoreType::Raw
			},
			notes_hit,
			notes_total,
			total_notes_in_chart,
			nps,
		}
	}
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;
	use crate::clonehero::{Difficulty, Fingerprint, Instrument};

	fn record(chart: ChartId) -> ScoreRecord {
		ScoreRecord {
			fingerprint: Fingerprint::new(chart, Instrument::Lead, Difficulty::Expert),
			score: 100_000,
			stars: 5,
			completion_percent: 100.0,
			play_count: 3,
		}
	}

	fn empty_resolver(now_playing: Arc<NowPlayingCache>) -> MetadataResolver {
		MetadataResolver::new(now_playing, HashMap::new(), ChartFileCache::new(vec![]))
	}

	#[test]
	fn now_playing_takes_precedence() {
		let chart = ChartId([0x01; 16]);
		let now_playing = NowPlayingCache::new();

		let dir = tempfile::tempdir().unwrap();
		let live_path = dir.path().join("currentsong.txt");
		std::fs::write(
			&live_path,
			"Live Title\nLive Artist\n<color=#FFDE2B>RL</color>\n",
		)
		.unwrap();
		now_playing.refresh_from(&live_path);

		let mut song_cache = HashMap::new();
		song_cache.insert(
			chart,
			CacheEntry {
				title: "Cached Title".into(),
				filepath: String::new(),
			},
		);

		let resolver = MetadataResolver::new(
			Arc::clone(&now_playing),
			song_cache,
			ChartFileCache::new(vec![]),
		);
		let enriched = resolver.resolve(&record(chart));

		assert_eq!(enriched.song.title, "Live Title");
		assert_eq!(enriched.song.charter, "RL");
		assert_eq!(enriched.score_type, ScoreType::Rich);
	}

	#[test]
	fn song_cache_fills_in_when_live_file_is_gone() {
		let chart = ChartId([0x02; 16]);
		let now_playing = NowPlayingCache::new();

		let mut song_cache = HashMap::new();
		song_cache.insert(
			chart,
			CacheEntry {
				title: "Cached Title".into(),
				filepath: String::new(),
			},
		);

		let resolver =
			MetadataResolver::new(now_playing, song_cache, ChartFileCache::new(vec![]));
		let enriched = resolver.resolve(&record(chart));

		assert_eq!(enriched.song.title, "Cached Title");
		assert_eq!(enriched.score_type, ScoreType::Rich);
	}

	#[test]
	fn chart_parse_supplies_note_counts() {
		let now_playing = NowPlayingCache::new();

		// A real chart file on disk, addressed by its own md5
		let dir = tempfile::tempdir().unwrap();
		let song_dir = dir.path().join("Artist - Song");
		std::fs::create_dir_all(&song_dir).unwrap();
		let content = "[Song]\n{\nName = Disk Song\nResolution = 192\n}\n[SyncTrack]\n{\n0 = B 120000\n}\n[ExpertSingle]\n{\n100 = N 0 0\n100 = N 1 0\n200 = N 0 0\n}\n";
		std::fs::write(song_dir.join("notes.chart"), content).unwrap();

		let digest = md5::compute(content.as_bytes());
		let chart = ChartId(digest.0);

		let resolver = MetadataResolver::new(
			now_playing,
			HashMap::new(),
			ChartFileCache::new(vec![dir.path().to_owned()]),
		);
		let enriched = resolver.resolve(&record(chart));

		assert_eq!(enriched.total_notes_in_chart, Some(2));
		assert_eq!(enriched.notes_total, Some(2));
		// 100% completion: notes_hit matches the chart count
		assert_eq!(enriched.notes_hit, Some(2));
		assert_eq!(enriched.song.title, "Disk Song");
		assert!(enriched.nps.unwrap() > 0.0);
	}

	#[test]
	fn notes_hit_estimate_truncates_without_snapping() {
		let now_playing = NowPlayingCache::new();

		let dir = tempfile::tempdir().unwrap();
		let song_dir = dir.path().join("Artist - Song");
		std::fs::create_dir_all(&song_dir).unwrap();
		let content = "[Song]\n{\nResolution = 192\n}\n[SyncTrack]\n{\n0 = B 120000\n}\n[ExpertSingle]\n{\n100 = N 0 0\n200 = N 0 0\n}\n";
		std::fs::write(song_dir.join("notes.chart"), content).unwrap();

		let chart = ChartId(md5::compute(content.as_bytes()).0);
		let resolver = MetadataResolver::new(
			now_playing,
			HashMap::new(),
			ChartFileCache::new(vec![dir.path().to_owned()]),
		);

		// 2 * 99.99% = 1.9998 notes: truncates to 1, never rounds up to the
		// full count. Whether that's a full combo is the server's decision.
		let mut rec = record(chart);
		rec.completion_percent = 99.99;
		assert_eq!(resolver.resolve(&rec).notes_hit, Some(1));

		// Zero completion yields no estimate at all
		rec.completion_percent = 0.0;
		assert_eq!(resolver.resolve(&rec).notes_hit, None);
	}

	#[test]
	fn unresolvable_score_stays_raw() {
		let chart = ChartId([0x03; 16]);
		let resolver = empty_resolver(NowPlayingCache::new());

		let enriched = resolver.resolve(&record(chart));
		assert_eq!(enriched.score_type, ScoreType::Raw);
		assert_eq!(enriched.display_title(), "[03030303]");
		assert_eq!(enriched.notes_hit, None);
	}
}
// }}}
