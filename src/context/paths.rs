//! Where the server runtime keeps its files. Everything hangs off two
//! environment variables: `$ENCORE_DATA_DIR` (database + config document)
//! and `$ENCORE_LOG_DIR`.

use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct EncorePaths {
	/// Files entirely managed by the runtime: the sqlite database and the
	/// versioned config document.
	data_dir: PathBuf,

	/// Logs and other debugging output.
	log_dir: PathBuf,
}

/// A missing variable is a fatal configuration error; an absent directory
/// is not, we just create it.
fn dir_from_env(name: &str) -> anyhow::Result<PathBuf> {
	let raw = std::env::var(name)
		.map_err(|_| anyhow!("${name} must point at a writable directory"))?;

	let path = PathBuf::from(raw);
	std::fs::create_dir_all(&path)
		.with_context(|| format!("Could not create the ${name} directory at {path:?}"))?;

	Ok(path)
}

impl EncorePaths {
	pub fn new() -> anyhow::Result<Self> {
		Ok(Self {
			data_dir: dir_from_env("ENCORE_DATA_DIR")?,
			log_dir: dir_from_env("ENCORE_LOG_DIR")?,
		})
	}

	/// Point every path at a single directory. Used by tests and by the
	/// CLI's `--data-dir` override.
	pub fn rooted_at(root: &Path) -> anyhow::Result<Self> {
		std::fs::create_dir_all(root)
			.with_context(|| format!("Could not create data dir {root:?}"))?;

		Ok(Self {
			data_dir: root.to_owned(),
			log_dir: root.to_owned(),
		})
	}

	#[inline]
	pub fn data_dir(&self) -> &PathBuf {
		&self.data_dir
	}

	#[inline]
	pub fn log_dir(&self) -> &PathBuf {
		&self.log_dir
	}

	#[inline]
	pub fn db_path(&self) -> PathBuf {
		self.data_dir.join("db.sqlite")
	}

	#[inline]
	pub fn config_path(&self) -> PathBuf {
		self.data_dir.join("config.json")
	}
}
