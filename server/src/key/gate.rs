//! Key-gate middleware: resolves the capability key from the URL, checks the
//! permission class of the surface (`/r`, `/a`, `/w`), applies the per-key
//! rate limit and stashes the record for the `KeyAuth` extractor.

use axum::{
	extract::{Request, State},
	http::HeaderValue,
	middleware::Next,
	response::{IntoResponse, Response},
};
use std::{future::Future, pin::Pin};

use crate::core::extract::KeyAuth;
use crate::core::rate_limit::RateLimitStatus;
use crate::key::engine;
use crate::prelude::*;
use crate::store_adapter::Permission;

type GateOutput = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;

/// Middleware factory: one gate per permission class
pub fn key_gate(
	required: Permission,
) -> impl Fn(State<App>, Request, Next) -> GateOutput + Clone {
	move |state, req, next| Box::pin(gate(state, req, next, required))
}

async fn gate(
	State(app): State<App>,
	mut req: Request,
	next: Next,
	required: Permission,
) -> Result<Response, Error> {
	// URL shape: /{r|a|w}/{key}[/...]; the key segment is base62, so the raw
	// path needs no decoding here
	let path = req.uri().path();
	let mut segments = path.trim_start_matches('/').splitn(3, '/');
	let _class = segments.next();
	let plaintext = segments.next().filter(|s| !s.is_empty()).ok_or(Error::InvalidKey)?;

	let record = engine::resolve(&app, plaintext).await?;
	engine::authorize(&record, required)?;

	let status = match app.rate_limiter.check(record.key_id) {
		Ok(status) => status,
		Err(Error::RateLimited { retry_after }) => {
			// The 429 itself still carries the limit surface
			let reset = (Timestamp::now().0 / 1000).max(0) as u64 + retry_after;
			let mut res = Error::RateLimited { retry_after }.into_response();
			attach_headers(
				&mut res,
				RateLimitStatus { limit: app.rate_limiter.limit(), remaining: 0, reset },
			);
			return Ok(res);
		}
		Err(err) => return Err(err),
	};

	let plaintext = plaintext.to_string();
	req.extensions_mut().insert(KeyAuth(record));
	req.extensions_mut().insert(crate::core::extract::RequestKey(plaintext));
	let mut res = next.run(req).await;
	if let Some(status) = status {
		attach_headers(&mut res, status);
	}
	Ok(res)
}

fn attach_headers(res: &mut Response, status: RateLimitStatus) {
	let headers = res.headers_mut();
	if let Ok(v) = HeaderValue::from_str(&status.limit.to_string()) {
		headers.insert("X-RateLimit-Limit", v);
	}
	if let Ok(v) = HeaderValue::from_str(&status.remaining.to_string()) {
		headers.insert("X-RateLimit-Remaining", v);
	}
	if let Ok(v) = HeaderValue::from_str(&status.reset.to_string()) {
		headers.insert("X-RateLimit-Reset", v);
	}
}

// vim: ts=4
