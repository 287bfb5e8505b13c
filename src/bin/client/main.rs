// {{{ Imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use encore::announce::format_points;
use encore::client::api::{ApiClient, SubmitError};
use encore::client::chart_lookup::ChartFileCache;
use encore::client::now_playing::{NowPlayingCache, NowPlayingPoller};
use encore::client::resolver::{EnrichedScore, MetadataResolver};
use encore::client::settings::ClientSettings;
use encore::client::state::ScoreState;
use encore::client::watcher::{scoredata_path, state_path, HandleOutcome, ScoreWatcher};
use encore::clonehero::songcache;
use encore::context::Error;
use encore::logs;
use encore::songs::HashMetadata;
// }}}

fn main() -> Result<(), Error> {
	logs::init_default();

	// {{{ Settings & pairing
	let settings_path = ClientSettings::default_path()?;
	let mut settings = ClientSettings::load(&settings_path)?;

	let game_dir = settings.resolve_game_dir().ok_or_else(|| {
		anyhow::anyhow!(
			"Could not find the game's data directory; set game_dir in {settings_path:?}"
		)
	})?;

	let api = ApiClient::new(&settings.server_url)?;
	let auth_token = match settings.auth_token.clone() {
		Some(token) => token,
		None => {
			let pairing = api.request_pairing(&settings.client_id)?;
			println!(
				"🔗 Pairing code: {} (expires in {}s)",
				pairing.pairing_code, pairing.expires_in
			);
			println!("   Approve it in the chat channel, then wait here...");

			let Some(token) = api.wait_for_pairing(&settings.client_id)? else {
				anyhow::bail!("Pairing timed out; run the client again to retry");
			};

			settings.auth_token = Some(token.clone());
			settings.save(&settings_path)?;
			println!("✅ Paired!");
			token
		}
	};
	// }}}
	// {{{ Metadata sources
	let song_cache = match songcache::decode_file(&game_dir.join("songcache.bin")) {
		Ok(entries) => {
			println!("✅ Song cache: {} entries", entries.len());
			entries
		}
		Err(error) => {
			tracing::warn!(%error, "Could not read the song cache; continuing without it");
			Default::default()
		}
	};

	let now_playing = NowPlayingCache::new();
	let poller = NowPlayingPoller::spawn(
		game_dir.join("currentsong.txt"),
		Arc::clone(&now_playing),
	);

	let chart_files = ChartFileCache::new(settings.resolve_songs_dirs());
	let resolver = MetadataResolver::new(Arc::clone(&now_playing), song_cache, chart_files);
	// }}}
	// {{{ Watcher state
	let scoredata = scoredata_path(&game_dir);
	let state = ScoreState::load(&state_path(&game_dir));
	let first_run = state.is_empty() && !state.needs_migration();

	let mut score_watcher = ScoreWatcher::new(scoredata, state)?;

	if score_watcher.needs_state_migration() {
		score_watcher.initialize_state()?;
		println!("✅ State migrated from the legacy format");
	} else if first_run {
		// Don't spam the server with a whole history on first launch
		score_watcher.initialize_state()?;
		println!("✅ First run: initialized state with existing scores");
	}
	// }}}
	// {{{ Score handler
	let mut handle = |record: &encore::clonehero::scoredata::ScoreRecord| -> HandleOutcome {
		let enriched = resolver.resolve(record);
		print_detection(&enriched);

		let outcome = match api.submit_score(&auth_token, &enriched) {
			Ok(response) => {
				let verdict = if response.is_record_broken {
					"🏆 RECORD BROKEN!".to_owned()
				} else if response.is_first_time_score {
					"🎸 First score on this chart!".to_owned()
				} else if response.is_personal_best {
					"📈 Personal best!".to_owned()
				} else if let Some(best) = response.your_best_score {
					format!("Not a high score (your best: {})", format_points(best))
				} else {
					"Not a high score".to_owned()
				};
				println!("   {verdict}");

				if let (Some(holder), Some(score)) =
					(&response.previous_holder, response.previous_score)
				{
					println!("   Previous: {holder} ({} pts)", format_points(score));
				}

				HandleOutcome::Submitted
			}
			Err(SubmitError::Unauthorized) => {
				tracing::error!("Authentication failed; delete the auth token and re-pair");
				HandleOutcome::Unauthorized
			}
			Err(SubmitError::Transient(error)) => {
				tracing::warn!(%error, "Submission failed; will retry on the next change");
				HandleOutcome::Failed
			}
		};

		// One clear per fully-processed score event. Transient failures keep
		// the cache so the retry still knows what was playing.
		if outcome != HandleOutcome::Failed {
			now_playing.clear();
		}
		outcome
	};
	// }}}
	// {{{ Catch-up & hash resolution
	let offline_scores = score_watcher.catch_up(&mut handle)?;
	if offline_scores.is_empty() {
		println!("✅ No offline scores to submit");
	} else {
		println!("✅ Submitted {} offline score(s)", offline_scores.len());
	}

	if let Err(error) = resolve_server_hashes(&api, &auth_token, &resolver) {
		tracing::warn!(%error, "Hash resolution pass failed");
	}
	// }}}
	// {{{ Watch until interrupted
	let stop = Arc::new(AtomicBool::new(false));
	{
		let stop = Arc::clone(&stop);
		std::thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
				.expect("Could not build signal runtime");
			let _ = runtime.block_on(tokio::signal::ctrl_c());
			println!("\nShutting down...");
			stop.store(true, Ordering::Relaxed);
		});
	}

	println!("🎮 Watching for new scores (ctrl-c to stop)");
	score_watcher.run(&stop, &mut handle)?;

	poller.stop();
	Ok(())
}

// {{{ Helpers
fn print_detection(enriched: &EnrichedScore) {
	let fingerprint = enriched.record.fingerprint;
	println!(
		"\n🎵 {} - {} pts ({} {}) [{}]",
		enriched.display_title(),
		format_points(enriched.record.score),
		fingerprint.difficulty,
		fingerprint.instrument,
		enriched.score_type.as_str(),
	);

	if let (Some(hit), Some(total)) = (enriched.notes_hit, enriched.notes_total) {
		println!("   Notes: {hit}/{total} ({:.1}%)", enriched.record.completion_percent);
	}
}

/// Ask the server which of our submitted charts it can't name, then answer
/// from the local song cache and chart files.
fn resolve_server_hashes(
	api: &ApiClient,
	auth_token: &str,
	resolver: &MetadataResolver,
) -> Result<(), Error> {
	let hashes = api.unresolved_hashes(auth_token)?;
	if hashes.is_empty() {
		return Ok(());
	}

	let mut metadata = Vec::new();
	for hex in &hashes {
		let Ok(chart) = hex.parse::<encore::clonehero::ChartId>() else {
			continue;
		};

		let record = encore::clonehero::scoredata::ScoreRecord {
			fingerprint: encore::clonehero::Fingerprint::new(
				chart,
				Default::default(),
				Default::default(),
			),
			score: 0,
			stars: 0,
			completion_percent: 0.0,
			play_count: 0,
		};

		let enriched = resolver.resolve_offline(&record);
		if !enriched.song.title.is_empty() {
			metadata.push(HashMetadata {
				chart_hash: hex.clone(),
				title: enriched.song.title,
				artist: enriched.song.artist,
				charter: enriched.song.charter,
			});
		}
	}

	if !metadata.is_empty() {
		let response = api.resolve_hashes(auth_token, &metadata)?;
		println!("✅ Resolved {} chart name(s) for the server", response.updated_count);
	}

	Ok(())
}
// }}}
