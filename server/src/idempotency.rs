//! Idempotency-Key handling: write-once response snapshots keyed by
//! `(workspace, route, key)`, replayed only when the request digest matches.

use axum::{
	http::{header, HeaderMap, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
};
use std::future::Future;

use crate::core::etag::sha256_hex;
use crate::prelude::*;

pub const HEADER: &str = "Idempotency-Key";
pub const REPLAYED_HEADER: &str = "Idempotency-Replayed";

pub fn request_digest(route: &str, payload: &str) -> String {
	sha256_hex(format!("{}\n{}", route, payload).as_bytes())
}

fn replay_response(status: u16, body: &str) -> Response {
	let mut headers = HeaderMap::new();
	headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
	headers.insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
	let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
	(status, headers, body.to_string()).into_response()
}

/// Run a mutating operation under an optional `Idempotency-Key`.
///
/// The operation returns `(status, envelope-json)`; on first execution the
/// snapshot is stored, and an exact repeat replays it with
/// `Idempotency-Replayed: true`. A repeat with a different request digest is
/// rejected.
pub async fn run<F, Fut>(
	app: &App,
	ws: WsRid,
	route: &'static str,
	idem_key: Option<&str>,
	digest_payload: &str,
	op: F,
) -> ApiResult<Response>
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = ApiResult<(StatusCode, serde_json::Value)>>,
{
	let Some(idem_key) = idem_key else {
		let (status, body) = op().await?;
		return Ok(json_response(status, &body));
	};

	if idem_key.is_empty() || idem_key.len() > 255 {
		return Err(Error::InvalidRequest("Idempotency-Key must be 1-255 characters".into()));
	}

	let digest = request_digest(route, digest_payload);
	if let Some(existing) = app.store.read_idempotency(ws, route, idem_key).await? {
		if existing.request_digest.as_ref() != digest {
			return Err(Error::IdempotencyMismatch);
		}
		debug!("idempotent replay on {} for key {}", route, idem_key);
		return Ok(replay_response(existing.response_status, &existing.response_body));
	}

	let (status, body) = op().await?;
	let body_text = body.to_string();
	app.store
		.store_idempotency(
			ws,
			route,
			idem_key,
			&digest,
			status.as_u16(),
			&body_text,
			Timestamp::now(),
		)
		.await?;

	Ok(json_response(status, &body))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
	let mut headers = HeaderMap::new();
	headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
	(status, headers, body.to_string()).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn digest_separates_routes_and_payloads() {
		let a = request_digest("move", "/a -> /b");
		let b = request_digest("move", "/a -> /c");
		let c = request_digest("delete", "/a -> /b");
		assert_ne!(a, b);
		assert_ne!(a, c);
		assert_eq!(a, request_digest("move", "/a -> /b"));
	}
}

// vim: ts=4
