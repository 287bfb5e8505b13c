// {{{ Imports
use db::{connect_db, SqlitePool};

use crate::config::{Config, ConfigManager};
use crate::context::paths::EncorePaths;
// }}}

pub mod db;
pub mod paths;

// {{{ Common types
pub type Error = anyhow::Error;
// }}}
// {{{ AppContext
/// Everything the server side needs to do its job: the connection pool and
/// the loaded configuration. Loaded once per process.
pub struct AppContext {
	pub db: SqlitePool,
	pub config: Config,
	pub paths: EncorePaths,
}

impl AppContext {
	pub fn new() -> Result<Self, Error> {
		let paths = EncorePaths::new()?;
		Self::with_paths(paths)
	}

	pub fn with_paths(paths: EncorePaths) -> Result<Self, Error> {
		let db = connect_db(&paths)?;
		let config = ConfigManager::load(&paths.config_path())?.typed()?;

		Ok(Self { db, config, paths })
	}
}
// }}}
