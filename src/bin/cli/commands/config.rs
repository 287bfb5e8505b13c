// {{{ Imports
use encore::config::ConfigManager;
use encore::context::{AppContext, Error};
// }}}

#[derive(clap::Args)]
pub struct Args {
	/// Dotted config path, e.g. `announcements.record_breaks.style`.
	pub path: String,
	/// New value as JSON; omit to read the current value.
	pub value: Option<String>,
}

pub fn run(ctx: &AppContext, args: Args) -> Result<(), Error> {
	let mut manager = ConfigManager::load(&ctx.paths.config_path())?;

	match args.value {
		None => match manager.get(&args.path) {
			Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
			None => anyhow::bail!("No config value at '{}'", args.path),
		},
		Some(raw) => {
			let value = serde_json::from_str(&raw)
				.unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
			manager.set(&args.path, value);

			// Refuse writes that would leave the document undeserializable
			manager.typed()?;
			manager.save()?;
			println!("✅ Updated {}", args.path);
		}
	}

	Ok(())
}
