use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
};
use axum::Json;
use serde_json::json;

pub struct AppError {
	pub error: anyhow::Error,
	pub status_code: StatusCode,
}

impl AppError {
	pub fn new(error: anyhow::Error, status_code: StatusCode) -> Self {
		Self { error, status_code }
	}

	pub fn bad_request(error: anyhow::Error) -> Self {
		Self::new(error, StatusCode::BAD_REQUEST)
	}

	pub fn unauthorized(message: &str) -> Self {
		Self::new(anyhow::anyhow!("{message}"), StatusCode::UNAUTHORIZED)
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		(
			self.status_code,
			Json(json!({
				"success": false,
				"error": format!("{}", self.error),
			})),
		)
			.into_response()
	}
}

impl<E> From<E> for AppError
where
	E: Into<anyhow::Error>,
{
	fn from(err: E) -> Self {
		Self::new(err.into(), StatusCode::INTERNAL_SERVER_ERROR)
	}
}
