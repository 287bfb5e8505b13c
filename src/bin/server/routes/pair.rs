// {{{ Imports
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use encore::user;

use crate::context::ServerState;
use crate::error::AppError;
// }}}

#[derive(Debug, Deserialize)]
struct PairRequest {
	client_id: String,
}

pub async fn request_pairing(
	State(state): State<ServerState>,
	Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
	let request: PairRequest =
		serde_json::from_value(body).map_err(|error| AppError::bad_request(error.into()))?;
	if request.client_id.is_empty() {
		return Err(AppError::bad_request(anyhow::anyhow!("Empty client_id")));
	}

	let conn = state.ctx.db.get()?;
	let code = user::create_pairing_code(&conn, &request.client_id)?;
	println!("[pair] Issued code {code} for client {}", request.client_id);

	Ok(Json(json!({
		"pairing_code": code,
		"expires_in": user::PAIRING_EXPIRY_SECONDS,
	})))
}

pub async fn pairing_status(
	State(state): State<ServerState>,
	Path(client_id): Path<String>,
) -> Result<Json<Value>, AppError> {
	let conn = state.ctx.db.get()?;
	let token = user::pairing_status(&conn, &client_id)?;

	Ok(Json(match token {
		Some(auth_token) => json!({ "paired": true, "auth_token": auth_token }),
		None => json!({ "paired": false }),
	}))
}
