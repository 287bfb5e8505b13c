#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	/// Use this directory for the database and config instead of
	/// $ENCORE_DATA_DIR.
	#[arg(long, global = true)]
	pub data_dir: Option<std::path::PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
	/// Walk songs directories, parse every chart, and store per-difficulty
	/// note counts in the database.
	ImportCharts(crate::commands::import_charts::Args),
	/// Re-check historical scores for full combos that were missed before
	/// chart metadata existed.
	BackfillFcs(crate::commands::backfill_fcs::Args),
	/// Read or write a config value by dotted path.
	Config(crate::commands::config::Args),
}
