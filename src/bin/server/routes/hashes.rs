// {{{ Imports
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use encore::songs::{self, HashMetadata};
use encore::user::User;

use crate::context::ServerState;
use crate::error::AppError;
// }}}

// {{{ Bearer auth
fn authenticated_user(state: &ServerState, headers: &HeaderMap) -> Result<User, AppError> {
	let token = headers
		.get("Authorization")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.ok_or_else(|| AppError::unauthorized("Missing auth token"))?;

	let conn = state.ctx.db.get()?;
	User::by_auth_token(&conn, token)?
		.ok_or_else(|| AppError::unauthorized("Invalid auth token"))
}
// }}}
// {{{ Handlers
pub async fn unresolved_hashes(
	State(state): State<ServerState>,
	headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
	let user = authenticated_user(&state, &headers)?;

	let conn = state.ctx.db.get()?;
	let hashes = songs::unresolved_hashes(&conn, user.id)?;

	Ok(Json(json!({
		"success": true,
		"count": hashes.len(),
		"hashes": hashes,
	})))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
	metadata: Vec<HashMetadata>,
}

pub async fn resolve_hashes(
	State(state): State<ServerState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
	let user = authenticated_user(&state, &headers)?;

	let request: ResolveRequest =
		serde_json::from_value(body).map_err(|error| AppError::bad_request(error.into()))?;
	if request.metadata.is_empty() {
		return Err(AppError::bad_request(anyhow::anyhow!(
			"No metadata provided"
		)));
	}

	let conn = state.ctx.db.get()?;
	let updated_count = songs::resolve_hashes(&conn, &request.metadata)?;
	println!(
		"[hashes] {} resolved {updated_count} chart hashes",
		user.display_name
	);

	Ok(Json(json!({
		"success": true,
		"updated_count": updated_count,
	})))
}
// }}}
