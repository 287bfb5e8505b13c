//! The client's own settings file: server URL, pairing identity, and where
//! to find the game.

// {{{ Imports
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::context::Error;
// }}}

// {{{ Settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
	pub server_url: String,
	/// Random identity used by the pairing handshake.
	pub client_id: String,
	pub auth_token: Option<String>,
	/// Override for the game's data directory (where `scoredata.bin` and
	/// `currentsong.txt` live).
	pub game_dir: Option<PathBuf>,
	/// Songs roots scanned by the chart-file lookup. When empty, the game's
	/// own `settings.ini` is consulted.
	pub songs_dirs: Vec<PathBuf>,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			server_url: "http://localhost:8080".to_owned(),
			client_id: uuid::Uuid::new_v4().to_string(),
			auth_token: None,
			game_dir: None,
			songs_dirs: Vec::new(),
		}
	}
}

impl ClientSettings {
	pub fn default_path() -> Result<PathBuf, Error> {
		let dirs = ProjectDirs::from("", "", "encore")
			.with_context(|| "Could not determine a config directory")?;
		Ok(dirs.config_dir().join("client.json"))
	}

	pub fn load(path: &Path) -> Result<Self, Error> {
		if !path.exists() {
			let settings = Self::default();
			settings.save(path)?;
			return Ok(settings);
		}

		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Could not read client settings at {path:?}"))?;
		serde_json::from_str(&content)
			.with_context(|| format!("Client settings at {path:?} are not valid JSON"))
	}

	pub fn save(&self, path: &Path) -> Result<(), Error> {
		let parent = path
			.parent()
			.with_context(|| format!("Settings path {path:?} has no parent"))?;
		std::fs::create_dir_all(parent)
			.with_context(|| format!("Could not create settings dir {parent:?}"))?;

		let temp = tempfile::NamedTempFile::new_in(parent)
			.with_context(|| "Could not create temp settings file")?;
		std::fs::write(temp.path(), serde_json::to_string_pretty(self)?)?;
		temp.persist(path)
			.with_context(|| format!("Could not replace settings at {path:?}"))?;
		Ok(())
	}

	// {{{ Game directory discovery
	/// The configured game dir, or the standard `Documents/Clone Hero`.
	pub fn resolve_game_dir(&self) -> Option<PathBuf> {
		if let Some(dir) = &self.game_dir {
			return Some(dir.clone());
		}

		let base = BaseDirs::new()?;
		let documents = base.home_dir().join("Documents").join("Clone Hero");
		documents.exists().then_some(documents)
	}

	/// Songs roots for the chart-file scan: the explicit config, else the
	/// `pathN = …` entries of the game's own `settings.ini`.
	pub fn resolve_songs_dirs(&self) -> Vec<PathBuf> {
		if !self.songs_dirs.is_empty() {
			return self.songs_dirs.clone();
		}

		let Some(game_dir) = self.resolve_game_dir() else {
			return Vec::new();
		};

		parse_song_paths(&game_dir.join("settings.ini"))
	}
	// }}}
}

/// Pull `path0 = C:\…` style entries out of the game's settings file,
/// whatever section they're in.
fn parse_song_paths(settings_ini: &Path) -> Vec<PathBuf> {
	let Ok(content) = std::fs::read_to_string(settings_ini) else {
		return Vec::new();
	};

	let mut paths = Vec::new();
	for line in content.lines() {
		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let key = key.trim().to_lowercase();
		let value = value.trim();

		let Some(suffix) = key.strip_prefix("path") else {
			continue;
		};
		if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
			continue;
		}

		let path = PathBuf::from(value);
		if path.exists() {
			paths.push(path);
		}
	}

	paths
}
// }}}
// {{{ Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_load_creates_defaults_with_a_client_id() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("client.json");

		let settings = ClientSettings::load(&path).unwrap();
		assert!(path.exists());
		assert!(!settings.client_id.is_empty());
		assert!(settings.auth_token.is_none());

		// Reloading keeps the same identity
		let reloaded = ClientSettings::load(&path).unwrap();
		assert_eq!(reloaded.client_id, settings.client_id);
	}

	#[test]
	fn parses_song_paths_from_game_settings() {
		let dir = tempfile::tempdir().unwrap();
		let songs = dir.path().join("songs");
		std::fs::create_dir_all(&songs).unwrap();

		let ini = dir.path().join("settings.ini");
		std::fs::write(
			&ini,
			format!(
				"[Paths]\npath0 = {}\npath1 = /definitely/not/a/real/dir\npathological = nope\n",
				songs.display()
			),
		)
		.unwrap();

		let paths = parse_song_paths(&ini);
		assert_eq!(paths, vec![songs]);
	}
}
// }}}
