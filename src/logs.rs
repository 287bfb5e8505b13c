//! Tracing subscriber setup shared by the binaries.
//!
//! `RUST_LOG` wins when set; otherwise the level from the config's
//! `logging` section applies.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

pub fn init(settings: &LoggingSettings) {
	if !settings.enabled {
		return;
	}

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(settings.level.to_lowercase()));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.init();
}

/// For binaries that run before any config exists (the client).
pub fn init_default() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.init();
}
