//! Versioned JSON configuration with additive migrations.
//!
//! The document on disk is free-form JSON carrying a `config_version`. On
//! load we migrate old documents forward (user-set values always win, new
//! keys are filled from defaults, obsolete keys get deleted), then expose a
//! strongly-typed [`Config`] view. Policy decisions elsewhere (announcement
//! palettes in particular) go through the typed view, never through string
//! lookups.

// {{{ Imports
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::Error;
// }}}

pub const CONFIG_VERSION: i64 = 5;
pub const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

// {{{ Display settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
	#[serde(rename = "MM/DD/YYYY")]
	MonthFirst,
	#[serde(rename = "DD/MM/YYYY")]
	DayFirst,
	#[serde(rename = "YYYY-MM-DD")]
	Iso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
	#[serde(rename = "12-hour")]
	TwelveHour,
	#[serde(rename = "24-hour")]
	TwentyFourHour,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
	pub timezone: String,
	pub date_format: DateFormat,
	pub time_format: TimeFormat,
	pub show_timezone_in_embeds: bool,
}

impl Default for DisplaySettings {
	fn default() -> Self {
		Self {
			timezone: "UTC".to_owned(),
			date_format: DateFormat::MonthFirst,
			time_format: TimeFormat::TwelveHour,
			show_timezone_in_embeds: true,
		}
	}
}
// }}}
// {{{ Api & logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiting {
	pub enabled: bool,
	pub max_requests_per_minute: u32,
	pub failed_auth_limit: u32,
}

impl Default for RateLimiting {
	fn default() -> Self {
		Self {
			enabled: true,
			max_requests_per_minute: 60,
			failed_auth_limit: 5,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
	pub host: String,
	pub port: u16,
	pub debug_password: String,
	pub rate_limiting: RateLimiting,
}

impl Default for ApiSettings {
	fn default() -> Self {
		Self {
			host: "localhost".to_owned(),
			port: 8080,
			debug_password: String::new(),
			rate_limiting: RateLimiting::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRotation {
	pub enabled: bool,
	pub max_size_mb: u32,
	pub keep_backups: u32,
}

impl Default for LogRotation {
	fn default() -> Self {
		Self {
			enabled: true,
			max_size_mb: 10,
			keep_backups: 5,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
	pub enabled: bool,
	pub level: String,
	pub rotation: LogRotation,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			level: "INFO".to_owned(),
			rotation: LogRotation::default(),
		}
	}
}
// }}}
// {{{ Announcement palettes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementStyle {
	Full,
	Minimalist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFormat {
	Abbreviated,
	Full,
}

/// One category's field toggles. Which toggles matter depends on the
/// category (only record breaks read the footer_* ones, only personal bests
/// read `previous_best`), but keeping one shape makes the deep-merge and the
/// settings UI uniform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPalette {
	pub song_title: bool,
	pub artist: bool,
	pub difficulty_instrument: bool,
	pub score: bool,
	pub stars: bool,
	pub charter: bool,
	pub accuracy: bool,
	pub play_count: bool,
	pub best_streak: bool,
	pub previous_record: bool,
	pub previous_best: bool,
	pub server_record_holder: bool,
	pub improvement: bool,
	pub enchor_link: bool,
	pub chart_hash: bool,
	pub chart_hash_format: HashFormat,
	pub timestamp: bool,
	pub footer_show_previous_holder: bool,
	pub footer_show_previous_score: bool,
	pub footer_show_held_duration: bool,
	pub footer_show_set_timestamp: bool,
}

impl Default for FieldPalette {
	fn default() -> Self {
		Self {
			song_title: true,
			artist: true,
			difficulty_instrument: true,
			score: true,
			stars: true,
			charter: true,
			accuracy: true,
			play_count: true,
			best_streak: false,
			previous_record: true,
			previous_best: true,
			server_record_holder: true,
			improvement: true,
			enchor_link: true,
			chart_hash: true,
			chart_hash_format: HashFormat::Full,
			timestamp: true,
			footer_show_previous_holder: true,
			footer_show_previous_score: true,
			footer_show_held_duration: true,
			footer_show_set_timestamp: true,
		}
	}
}

impl FieldPalette {
	/// The common minimalist baseline: identity fields only, abbreviated
	/// hash, no outbound links.
	fn minimalist() -> Self {
		Self {
			charter: false,
			accuracy: false,
			play_count: false,
			enchor_link: false,
			chart_hash_format: HashFormat::Abbreviated,
			..Self::default()
		}
	}
}
// }}}
// {{{ Accuracy display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyFormat {
	PercentageOnly,
	NotesOnly,
	CombinedPercentageFirst,
	CombinedNotesFirst,
	SeparateFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyDisplay {
	pub format: AccuracyFormat,
	pub show_notes_label: bool,
}

impl Default for AccuracyDisplay {
	fn default() -> Self {
		Self {
			format: AccuracyFormat::CombinedPercentageFirst,
			show_notes_label: true,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyDisplaySettings {
	pub record_breaks: AccuracyDisplay,
	pub first_time_scores: AccuracyDisplay,
	pub personal_bests: AccuracyDisplay,
	pub full_combos: AccuracyDisplay,
}
// }}}
// {{{ Announcement categories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordBreakSettings {
	pub enabled: bool,
	pub min_score_threshold: u32,
	pub ping_previous_holder: bool,
	pub embed_color: String,
	pub style: AnnouncementStyle,
	pub full_fields: FieldPalette,
	pub minimalist_fields: FieldPalette,
}

impl Default for RecordBreakSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			min_score_threshold: 0,
			ping_previous_holder: true,
			embed_color: "#FFD700".to_owned(),
			style: AnnouncementStyle::Full,
			full_fields: FieldPalette::default(),
			minimalist_fields: FieldPalette::minimalist(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstTimeSettings {
	pub enabled: bool,
	pub embed_color: String,
	pub style: AnnouncementStyle,
	pub full_fields: FieldPalette,
	pub minimalist_fields: FieldPalette,
}

impl Default for FirstTimeSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			embed_color: "#4169E1".to_owned(),
			style: AnnouncementStyle::Full,
			full_fields: FieldPalette::default(),
			minimalist_fields: FieldPalette::minimalist(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
	Both,
	Either,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalBestSettings {
	pub enabled: bool,
	pub min_improvement_percent: f64,
	pub min_improvement_points: u32,
	pub threshold_mode: ThresholdMode,
	pub embed_color: String,
	pub style: AnnouncementStyle,
	pub full_fields: FieldPalette,
	pub minimalist_fields: FieldPalette,
}

impl Default for PersonalBestSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			min_improvement_percent: 5.0,
			min_improvement_points: 10_000,
			threshold_mode: ThresholdMode::Both,
			embed_color: "#32CD32".to_owned(),
			style: AnnouncementStyle::Full,
			full_fields: FieldPalette::default(),
			minimalist_fields: FieldPalette::minimalist(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FullComboSettings {
	pub enabled: bool,
	pub announce_regular_fc: bool,
	pub announce_first_fc: bool,
	pub announce_fc_record_break: bool,
	pub announce_retroactive_fcs: bool,
	pub embed_color: String,
	pub style: AnnouncementStyle,
	pub full_fields: FieldPalette,
	pub minimalist_fields: FieldPalette,
}

impl Default for FullComboSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			announce_regular_fc: true,
			announce_first_fc: true,
			announce_fc_record_break: true,
			announce_retroactive_fcs: true,
			embed_color: "#FF4500".to_owned(),
			style: AnnouncementStyle::Full,
			full_fields: FieldPalette::default(),
			minimalist_fields: FieldPalette::minimalist(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementSettings {
	pub record_breaks: RecordBreakSettings,
	pub first_time_scores: FirstTimeSettings,
	pub personal_bests: PersonalBestSettings,
	pub full_combos: FullComboSettings,
	pub accuracy_display: AccuracyDisplaySettings,
}
// }}}
// {{{ Difficulty tiers & misc sections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyTier {
	pub name: String,
	pub emoji: String,
	pub min_nps: f64,
	pub max_nps: f64,
}

impl Default for DifficultyTier {
	fn default() -> Self {
		Self {
			name: String::new(),
			emoji: String::new(),
			min_nps: 0.0,
			max_nps: 0.0,
		}
	}
}

fn tier(name: &str, emoji: &str, min_nps: f64, max_nps: f64) -> DifficultyTier {
	DifficultyTier {
		name: name.to_owned(),
		emoji: emoji.to_owned(),
		min_nps,
		max_nps,
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyTiers {
	pub tier1: DifficultyTier,
	pub tier2: DifficultyTier,
	pub tier3: DifficultyTier,
	pub tier4: DifficultyTier,
}

impl Default for DifficultyTiers {
	fn default() -> Self {
		Self {
			tier1: tier("Casual", "🟢", 0.0, 3.0),
			tier2: tier("Moderate", "🟡", 3.0, 6.0),
			tier3: tier("Intense", "🟠", 6.0, 9.0),
			tier4: tier("Extreme", "🔴", 9.0, 99.0),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardestCommand {
	pub min_notes_filter: u32,
	pub default_min_nps: f64,
	pub default_max_nps: f64,
}

impl Default for HardestCommand {
	fn default() -> Self {
		Self {
			min_notes_filter: 100,
			default_min_nps: 0.0,
			default_max_nps: 10.0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyActivityLog {
	pub enabled: bool,
	pub generation_time: String,
	pub keep_days: u32,
}

impl Default for DailyActivityLog {
	fn default() -> Self {
		Self {
			enabled: false,
			generation_time: "00:00".to_owned(),
			keep_days: 30,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseBackup {
	pub enabled: bool,
	pub frequency: String,
	pub time: String,
	pub keep_days: u32,
	pub location: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
	pub path: String,
	pub backup: DatabaseBackup,
}
// }}}
// {{{ Config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub config_version: i64,
	pub bot_version: String,
	pub last_updated: String,
	pub display: DisplaySettings,
	pub api: ApiSettings,
	pub logging: LoggingSettings,
	pub announcements: AnnouncementSettings,
	pub difficulty_tiers: DifficultyTiers,
	pub hardest_command: HardestCommand,
	pub daily_activity_log: DailyActivityLog,
	pub database: DatabaseSettings,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			config_version: CONFIG_VERSION,
			bot_version: BOT_VERSION.to_owned(),
			last_updated: String::new(),
			display: DisplaySettings::default(),
			api: ApiSettings::default(),
			logging: LoggingSettings::default(),
			announcements: AnnouncementSettings::default(),
			difficulty_tiers: DifficultyTiers::default(),
			hardest_command: HardestCommand::default(),
			daily_activity_log: DailyActivityLog::default(),
			database: DatabaseSettings::default(),
		}
	}
}
// }}}
// {{{ Config manager
fn default_document() -> Value {
	serde_json::to_value(Config::default()).expect("Default config must serialize")
}

pub struct ConfigManager {
	path: PathBuf,
	document: Value,
}

impl ConfigManager {
	// {{{ Load
	pub fn load(path: &Path) -> Result<Self, Error> {
		if !path.exists() {
			tracing::info!(?path, "No config file found, writing defaults");
			let mut manager = Self {
				path: path.to_owned(),
				document: default_document(),
			};
			manager.save()?;
			return Ok(manager);
		}

		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Could not read config at {path:?}"))?;

		let (document, regenerated) = match serde_json::from_str::<Value>(&content) {
			Ok(document) if document.is_object() => (document, false),
			Ok(_) | Err(_) => {
				tracing::warn!(?path, "Config file corrupt, backing up and regenerating");
				backup_file(path)?;
				(default_document(), true)
			}
		};

		let mut manager = Self {
			path: path.to_owned(),
			document,
		};

		let version = manager
			.get("config_version")
			.and_then(Value::as_i64)
			.unwrap_or(1);
		if version < CONFIG_VERSION {
			tracing::info!(from = version, to = CONFIG_VERSION, "Migrating config");
			manager.migrate(version);
			manager.save()?;
		} else if regenerated {
			manager.save()?;
		}

		Ok(manager)
	}
	// }}}
	// {{{ Dotted-path accessors
	pub fn get(&self, path: &str) -> Option<&Value> {
		let mut value = &self.document;
		for key in path.split('.') {
			value = value.get(key)?;
		}
		Some(value)
	}

	pub fn get_or<T: serde::de::DeserializeOwned>(&self, path: &str, default: T) -> T {
		self.get(path)
			.cloned()
			.and_then(|value| serde_json::from_value(value).ok())
			.unwrap_or(default)
	}

	pub fn set(&mut self, path: &str, new_value: Value) {
		let keys: Vec<&str> = path.split('.').collect();
		let mut current = &mut self.document;

		for key in &keys[..keys.len() - 1] {
			if !current.get(*key).is_some_and(Value::is_object) {
				current[*key] = Value::Object(Map::new());
			}
			current = current.get_mut(*key).unwrap();
		}

		current[keys[keys.len() - 1]] = new_value;
	}
	// }}}
	// {{{ Save
	/// Atomic write-then-rename; stamps version metadata on the way out.
	pub fn save(&mut self) -> Result<(), Error> {
		self.set("config_version", json!(CONFIG_VERSION));
		self.set("bot_version", json!(BOT_VERSION));
		self.set("last_updated", json!(Utc::now().to_rfc3339()));

		let parent = self
			.path
			.parent()
			.with_context(|| format!("Config path {:?} has no parent", self.path))?;
		std::fs::create_dir_all(parent)
			.with_context(|| format!("Could not create config dir {parent:?}"))?;

		let content = serde_json::to_string_pretty(&self.document)?;
		let temp = tempfile::NamedTempFile::new_in(parent)
			.with_context(|| "Could not create temp config file")?;
		std::fs::write(temp.path(), content)
			.with_context(|| "Could not write temp config file")?;
		temp.persist(&self.path)
			.with_context(|| format!("Could not replace config at {:?}", self.path))?;

		Ok(())
	}
	// }}}
	// {{{ Migrations
	/// Migrations are additive: each step tweaks what it must (moving or
	/// deleting keys), then a final deep merge against current defaults
	/// fills everything that's missing while preserving user values.
	fn migrate(&mut self, from_version: i64) {
		if from_version < 3 {
			// The per-category minimalist palettes replaced this section.
			if let Some(announcements) = self
				.document
				.get_mut("announcements")
				.and_then(Value::as_object_mut)
			{
				announcements.remove("global_fields");
			}
		}

		if from_version < 4 {
			// full_combos & accuracy_display arrived with chart parsing;
			// nothing to move, the deep merge below adds them.
		}

		if from_version < 5 {
			// difficulty_tiers/hardest_command/daily_activity_log: same.
		}

		self.document = deep_merge(self.document.take(), default_document());
	}
	// }}}

	pub fn typed(&self) -> Result<Config, Error> {
		serde_json::from_value(self.document.clone())
			.with_context(|| "Config document does not match the expected schema")
	}

	#[inline]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Recursive merge where user values win and defaults fill the gaps.
fn deep_merge(user: Value, default: Value) -> Value {
	match (user, default) {
		(Value::Object(user), Value::Object(mut merged)) => {
			for (key, user_value) in user {
				let merged_value = match merged.remove(&key) {
					Some(default_value) if default_value.is_object() && user_value.is_object() => {
						deep_merge(user_value, default_value)
					}
					_ => user_value,
				};
				merged.insert(key, merged_value);
			}
			Value::Object(merged)
		}
		(user, _) => user,
	}
}

fn backup_file(path: &Path) -> Result<(), Error> {
	let stem = path
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_else(|| "config".to_owned());
	let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
	let backup_path = path.with_file_name(format!("{stem}_backup_{timestamp}.json"));

	std::fs::copy(path, &backup_path)
		.with_context(|| format!("Could not back up config to {backup_path:?}"))?;
	tracing::info!(?backup_path, "Config backup created");
	Ok(())
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	fn manager_in(dir: &tempfile::TempDir) -> ConfigManager {
		ConfigManager::load(&dir.path().join("config.json")).unwrap()
	}

	#[test]
	fn creates_defaults_when_absent() {
		let dir = tempfile::tempdir().unwrap();
		let manager = manager_in(&dir);

		assert!(manager.path().exists());
		assert_eq!(
			manager.get("config_version").and_then(Value::as_i64),
			Some(CONFIG_VERSION)
		);

		let config = manager.typed().unwrap();
		assert_eq!(config.display.timezone, "UTC");
		assert!(config.announcements.record_breaks.enabled);
		assert!(!config.announcements.personal_bests.enabled);
	}

	#[test]
	fn dotted_get_and_set() {
		let dir = tempfile::tempdir().unwrap();
		let mut manager = manager_in(&dir);

		assert_eq!(
			manager
				.get("announcements.record_breaks.style")
				.and_then(Value::as_str),
			Some("full")
		);

		manager.set("announcements.record_breaks.style", json!("minimalist"));
		manager.set("brand.new.key", json!(42));

		assert_eq!(
			manager.typed().unwrap().announcements.record_breaks.style,
			AnnouncementStyle::Minimalist
		);
		assert_eq!(manager.get("brand.new.key").and_then(Value::as_i64), Some(42));
	}

	#[test]
	fn migration_preserves_user_values_and_adds_new_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");

		// An old v2 document: user changed a color, carries an obsolete
		// section, and predates the full_combos category entirely.
		let old = json!({
			"config_version": 2,
			"display": { "timezone": "Europe/Vienna" },
			"announcements": {
				"record_breaks": { "embed_color": "#123456" },
				"global_fields": { "song_title": true }
			}
		});
		std::fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();

		let manager = ConfigManager::load(&path).unwrap();
		let config = manager.typed().unwrap();

		// User-set values survive
		assert_eq!(config.display.timezone, "Europe/Vienna");
		assert_eq!(config.announcements.record_breaks.embed_color, "#123456");
		// New defaults appear
		assert_eq!(config.config_version, CONFIG_VERSION);
		assert!(config.announcements.full_combos.announce_first_fc);
		assert_eq!(config.hardest_command.min_notes_filter, 100);
		// Obsolete keys are gone
		assert!(manager.get("announcements.global_fields").is_none());
		// Untouched siblings keep their defaults
		assert!(config.announcements.record_breaks.ping_previous_holder);
	}

	#[test]
	fn corrupt_file_is_backed_up_and_regenerated() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, "{not valid json").unwrap();

		let manager = ConfigManager::load(&path).unwrap();
		assert!(manager.typed().is_ok());

		let backups: Vec<_> = std::fs::read_dir(dir.path())
			.unwrap()
			.filter_map(|entry| entry.ok())
			.filter(|entry| {
				entry
					.file_name()
					.to_string_lossy()
					.starts_with("config_backup_")
			})
			.collect();
		assert_eq!(backups.len(), 1);
	}

	#[test]
	fn palette_round_trips_through_json() {
		let palette = FieldPalette::minimalist();
		let value = serde_json::to_value(&palette).unwrap();
		assert_eq!(value["chart_hash_format"], json!("abbreviated"));

		let back: FieldPalette = serde_json::from_value(value).unwrap();
		assert_eq!(back.chart_hash_format, HashFormat::Abbreviated);
		assert!(!back.enchor_link);
	}

	#[test]
	fn accuracy_format_names_are_stable() {
		let value = serde_json::to_value(AccuracyFormat::CombinedNotesFirst).unwrap();
		assert_eq!(value, json!("combined_notes_first"));
	}
}
// }}}
