// {{{ Imports
use std::path::PathBuf;

use walkdir::WalkDir;

use encore::clonehero::{chart, song_ini, ChartId};
use encore::context::{AppContext, Error};
use encore::songs::{batch_insert_chart_metadata, BatchCounts, ChartMetadataRow};
// }}}

#[derive(clap::Args)]
pub struct Args {
	/// Songs directories to scan (repeatable).
	#[arg(long = "songs-dir", required = true)]
	pub songs_dirs: Vec<PathBuf>,
}

const CHART_FILENAMES: [&str; 3] = ["notes.chart", "notes.mid", "notes.midi"];

pub fn run(ctx: &AppContext, args: Args) -> Result<(), Error> {
	let conn = ctx.db.get()?;
	let mut totals = BatchCounts::default();
	let mut failed = 0usize;

	for root in &args.songs_dirs {
		println!("📂 Scanning {root:?}");

		for entry in WalkDir::new(root)
			.into_iter()
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_type().is_file())
		{
			let name = entry.file_name().to_string_lossy().to_lowercase();
			if !CHART_FILENAMES.contains(&name.as_str()) {
				continue;
			}

			let path = entry.path();
			let Ok(bytes) = std::fs::read(path) else {
				failed += 1;
				continue;
			};

			// The chart's identity is the md5 of its file contents
			let chart_id = ChartId(md5::compute(&bytes).0);

			let Some(mut data) = chart::parse_file(path) else {
				failed += 1;
				continue;
			};
			if let Some(ini) = song_ini::for_chart_file(path) {
				ini.merge_into(&mut data);
			}

			let rows =
				ChartMetadataRow::from_chart_data(chart_id, &path.to_string_lossy(), &data);
			let counts = batch_insert_chart_metadata(&conn, &rows)?;
			totals.inserted += counts.inserted;
			totals.updated += counts.updated;
		}
	}

	println!(
		"✅ Chart import done: {} inserted, {} updated, {} failed",
		totals.inserted, totals.updated, failed
	);
	Ok(())
}
