use clap::Parser;
use command::{Cli, Command};
use encore::context::Error;
use encore::logs;

mod command;
mod commands;
mod context;

fn main() -> Result<(), Error> {
	let cli = Cli::parse();
	let ctx = context::load_context(cli.data_dir.as_deref())?;
	logs::init(&ctx.config.logging);

	match cli.command {
		Command::ImportCharts(args) => commands::import_charts::run(&ctx, args)?,
		Command::BackfillFcs(args) => commands::backfill_fcs::run(&ctx, args)?,
		Command::Config(args) => commands::config::run(&ctx, args)?,
	}

	Ok(())
}
