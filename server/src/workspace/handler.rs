//! Workspace lifecycle: bootstrap and the one-way ownership claim.

use axum::{
	body::Bytes,
	extract::State,
	http::{header, HeaderMap, StatusCode},
	Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::core::extract::{parse_json, KeyAuth};
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::ScopeType;
use crate::types::ApiResponse;

#[derive(Debug, Default, Deserialize)]
struct BootstrapReq {
	#[serde(rename = "workspaceName")]
	workspace_name: Option<String>,
}

/// POST /bootstrap - create a workspace and its primary key triple.
/// Unauthenticated by design: the returned URLs are the only authority.
pub async fn post_bootstrap(
	State(app): State<App>,
	body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<serde_json::Value>>)> {
	let req: BootstrapReq =
		if body.is_empty() { BootstrapReq::default() } else { parse_json(&body)? };
	if let Some(name) = &req.workspace_name {
		if name.len() > 128 {
			return Err(Error::InvalidRequest("workspaceName is too long".into()));
		}
	}

	let workspace_id = format!("ws_{}", key_engine::generate_token(14));
	let ws = app.store.create_workspace(&workspace_id, req.workspace_name.as_deref()).await?;
	let triple = key_engine::mint_triple(&app, ws, ScopeType::Workspace, "/").await?;
	info!("bootstrapped workspace {}", workspace_id);

	let view = json!({
		"workspaceId": workspace_id,
		"name": req.workspace_name,
		"urls": key_engine::KeyUrls::from_triple(&app.opts.base_url, &triple),
		"createdAt": Timestamp::now(),
	});
	Ok((StatusCode::CREATED, Json(ApiResponse::with_server_time(view))))
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
	let raw = headers.get(header::COOKIE)?.to_str().ok()?;
	raw.split(';')
		.map(str::trim)
		.find_map(|pair| pair.strip_prefix("session="))
		.map(str::to_string)
}

/// POST /w/:writeKey/claim - OAuth-gated transition to a claimed workspace.
/// Duplicate claim is contractually 400, not 409.
pub async fn post_claim(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<ApiResponse<serde_json::Value>>)> {
	if key.scope_type != ScopeType::Workspace {
		return Err(Error::PermissionDenied(
			"workspace claim requires a workspace-scoped write key".into(),
		));
	}

	let cookie = session_cookie(&headers).ok_or(Error::Unauthorized)?;
	let email = app.sessions.verify_session(&cookie).await?;

	let workspace = app.store.claim_workspace(key.ws, &email).await?;
	info!("workspace {} claimed", workspace.workspace_id);

	let view = json!({
		"claimed": true,
		"workspaceId": workspace.workspace_id,
		"message": "claimed",
	});
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cookie_parsing_finds_the_session_pair() {
		let mut headers = HeaderMap::new();
		headers.insert(header::COOKIE, "theme=dark; session=abc123; lang=en".parse().unwrap());
		assert_eq!(session_cookie(&headers).as_deref(), Some("abc123"));

		headers.insert(header::COOKIE, "theme=dark".parse().unwrap());
		assert_eq!(session_cookie(&headers), None);
	}
}

// vim: ts=4
