use encore::context::paths::EncorePaths;
use encore::context::{AppContext, Error};

/// Resolve the app context honoring the global `--data-dir` override.
pub fn load_context(data_dir: Option<&std::path::Path>) -> Result<AppContext, Error> {
	let paths = match data_dir {
		Some(dir) => EncorePaths::rooted_at(dir)?,
		None => EncorePaths::new()?,
	};
	AppContext::with_paths(paths)
}
