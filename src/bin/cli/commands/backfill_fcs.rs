// {{{ Imports
use encore::announce::render_retro_fc;
use encore::backfill::scan_historical_fcs;
use encore::context::{AppContext, Error};
use encore::time::now_utc;
// }}}

#[derive(clap::Args)]
pub struct Args {
	/// Print the announcements the formatter would emit for each newly
	/// detected full combo.
	#[arg(long)]
	pub announce: bool,
}

pub fn run(ctx: &AppContext, args: Args) -> Result<(), Error> {
	let mut conn = ctx.db.get()?;
	let report = scan_historical_fcs(&mut conn, args.announce)?;

	println!(
		"✅ Scanned {} scores, found {} missed full combo(s)",
		report.scanned, report.fcs_found
	);

	if args.announce {
		let now = now_utc();
		for event in &report.events {
			let Some(announcement) = render_retro_fc(event, &ctx.config, now) else {
				continue;
			};
			println!("\n* {}\n{}", announcement.title, announcement.description);
		}
	}

	Ok(())
}
