//! Custom extractors for key-authorized requests

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::prelude::*;
use crate::store_adapter::KeyRecord;

// KeyAuth //
//*********//
/// The capability key resolved by the key-gate middleware. Handlers on the
/// `/r`, `/a` and `/w` surfaces take this; it is absent only if a route was
/// wired without the gate, which is a server bug, not a client error.
#[derive(Clone, Debug)]
pub struct KeyAuth(pub KeyRecord);

impl<S> FromRequestParts<S> for KeyAuth
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		if let Some(auth) = parts.extensions.get::<KeyAuth>().cloned() {
			Ok(auth)
		} else {
			error!("KeyAuth extractor used on a route without the key gate");
			Err(Error::Internal("missing key context".into()))
		}
	}
}

// RequestKey //
//************//
/// The plaintext key of the current request, as it appeared in the URL.
/// Needed where responses render capability links relative to the caller's
/// own key (folder listings); never persisted.
#[derive(Clone, Debug)]
pub struct RequestKey(pub String);

impl<S> FromRequestParts<S> for RequestKey
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		if let Some(key) = parts.extensions.get::<RequestKey>().cloned() {
			Ok(key)
		} else {
			error!("RequestKey extractor used on a route without the key gate");
			Err(Error::Internal("missing key context".into()))
		}
	}
}

/// Parse a JSON request body with a closed-schema error surface: malformed
/// JSON and wrong-typed fields become `INVALID_REQUEST`; unknown fields are
/// ignored by serde's defaults.
pub fn parse_json<T: serde::de::DeserializeOwned>(bytes: &axum::body::Bytes) -> ApiResult<T> {
	serde_json::from_slice(bytes).map_err(|err| Error::InvalidRequest(err.to_string()))
}

// vim: ts=4
