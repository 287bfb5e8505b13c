use context::ServerState;
use encore::context::{AppContext, Error};
use encore::logs;
use routes::hashes::{resolve_hashes, unresolved_hashes};
use routes::health::health;
use routes::pair::{pairing_status, request_pairing};
use routes::score::submit_score;

mod context;
mod error;
mod routes;

#[tokio::main]
async fn main() -> Result<(), Error> {
	let ctx = Box::leak(Box::new(AppContext::new()?));
	logs::init(&ctx.config.logging);

	let state = ServerState::new(ctx);
	let app = axum::Router::new()
		.route("/health", axum::routing::get(health))
		.route("/api/score", axum::routing::post(submit_score))
		.route("/api/pair/request", axum::routing::post(request_pairing))
		.route(
			"/api/pair/status/:client_id",
			axum::routing::get(pairing_status),
		)
		.route(
			"/api/unresolved_hashes",
			axum::routing::get(unresolved_hashes),
		)
		.route("/api/resolve_hashes", axum::routing::post(resolve_hashes))
		.with_state(state);

	let address = format!("{}:{}", ctx.config.api.host, ctx.config.api.port);
	let listener = tokio::net::TcpListener::bind(&address).await?;

	println!("✅ Listening on {}", listener.local_addr()?);

	axum::serve(listener, app).await?;

	Ok(())
}
