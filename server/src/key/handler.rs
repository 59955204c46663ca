//! Key management endpoints: mint scoped keys, list key metadata

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::core::extract::{parse_json, KeyAuth};
use crate::key::engine::{self, MintSpec};
use crate::prelude::*;
use crate::store_adapter::{AppendType, KeyRecord, Permission, ScopeType};
use crate::types::ApiResponse;

#[derive(Debug, Deserialize)]
struct CreateKeyReq {
	permission: String,
	#[serde(rename = "scopeType")]
	scope_type: Option<String>,
	#[serde(rename = "scopePath")]
	scope_path: Option<String>,
	/// Shorthand: mint one file-scoped key per path
	paths: Option<Vec<String>>,
	#[serde(rename = "wipLimit")]
	wip_limit: Option<u32>,
	#[serde(rename = "allowedTypes")]
	allowed_types: Option<Vec<String>>,
	#[serde(rename = "displayName")]
	display_name: Option<String>,
	#[serde(rename = "boundAuthor")]
	bound_author: Option<String>,
	#[serde(rename = "expiresAt")]
	expires_at: Option<Timestamp>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct KeyView {
	#[serde(rename = "keyId")]
	key_id: i64,
	/// Plaintext, present only in mint responses
	key: Option<String>,
	url: Option<String>,
	prefix: Box<str>,
	permission: Permission,
	#[serde(rename = "scopeType")]
	scope_type: ScopeType,
	#[serde(rename = "scopePath")]
	scope_path: Box<str>,
	#[serde(rename = "displayName")]
	display_name: Option<Box<str>>,
	#[serde(rename = "boundAuthor")]
	bound_author: Option<Box<str>>,
	#[serde(rename = "wipLimit")]
	wip_limit: Option<u32>,
	#[serde(rename = "allowedTypes")]
	allowed_types: Option<Box<[AppendType]>>,
	#[serde(rename = "createdAt")]
	created_at: Timestamp,
	#[serde(rename = "expiresAt")]
	expires_at: Option<Timestamp>,
	#[serde(rename = "revokedAt")]
	revoked_at: Option<Timestamp>,
}

impl KeyView {
	fn from_record(record: KeyRecord) -> Self {
		Self {
			key_id: record.key_id,
			key: None,
			url: None,
			prefix: record.prefix,
			permission: record.permission,
			scope_type: record.scope_type,
			scope_path: record.scope_path,
			display_name: record.display_name,
			bound_author: record.bound_author,
			wip_limit: record.wip_limit,
			allowed_types: record.allowed_types,
			created_at: record.created_at,
			expires_at: record.expires_at,
			revoked_at: record.revoked_at,
		}
	}

	fn minted(app: &App, minted: engine::MintedKey) -> Self {
		let url = format!(
			"{}/{}/{}",
			app.opts.base_url,
			minted.record.permission.url_prefix(),
			minted.plaintext
		);
		let mut view = Self::from_record(minted.record);
		view.key = Some(minted.plaintext);
		view.url = Some(url);
		view
	}
}

fn parse_allowed_types(raw: &[String]) -> ApiResult<Vec<AppendType>> {
	raw.iter()
		.map(|s| {
			AppendType::parse(s)
				.ok_or_else(|| Error::InvalidRequest(format!("unknown append type '{}'", s)))
		})
		.collect()
}

/// POST /w/:key/keys - mint scoped keys from a write key
pub async fn post_keys(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vec<KeyView>>>)> {
	let req: CreateKeyReq = parse_json(&body)?;

	let permission = Permission::parse(&req.permission)
		.ok_or_else(|| Error::InvalidRequest(format!("unknown permission '{}'", req.permission)))?;
	if let Some(limit) = req.wip_limit {
		if limit < 1 {
			return Err(Error::InvalidRequest("wipLimit must be at least 1".into()));
		}
	}
	if let Some(author) = &req.bound_author {
		engine::validate_author(author)?;
	}
	let allowed_types = match &req.allowed_types {
		Some(raw) => Some(parse_allowed_types(raw)?),
		None => None,
	};

	// Scope resolution: explicit paths mint file keys; otherwise one key over
	// the requested (or inherited) scope
	let mut scopes: Vec<(ScopeType, String)> = Vec::new();
	if let Some(paths) = &req.paths {
		if paths.is_empty() {
			return Err(Error::InvalidRequest("paths must not be empty".into()));
		}
		for raw in paths {
			scopes.push((ScopeType::File, crate::core::path::normalize(raw)?));
		}
	} else {
		let scope_type = match req.scope_type.as_deref() {
			None => key.scope_type,
			Some(raw) => ScopeType::parse(raw)
				.ok_or_else(|| Error::InvalidRequest(format!("unknown scopeType '{}'", raw)))?,
		};
		let scope_path = match (&req.scope_path, scope_type) {
			(Some(raw), _) => crate::core::path::normalize(raw)?,
			(None, ScopeType::Workspace) => "/".to_string(),
			(None, _) => key.scope_path.to_string(),
		};
		scopes.push((scope_type, scope_path));
	}

	// A key can only delegate inside its own scope
	for (_, scope_path) in &scopes {
		engine::check_scope(&key, scope_path)?;
	}

	let mut views = Vec::with_capacity(scopes.len());
	for (scope_type, scope_path) in &scopes {
		let minted = engine::mint(
			&app,
			key.ws,
			&MintSpec {
				permission,
				scope_type: *scope_type,
				scope_path: scope_path.as_str(),
				bound_author: req.bound_author.as_deref(),
				wip_limit: req.wip_limit,
				allowed_types: allowed_types.as_deref(),
				display_name: req.display_name.as_deref(),
				expires_at: req.expires_at,
			},
		)
		.await?;
		info!("minted {} key for scope {}", permission.as_str(), scope_path);
		views.push(KeyView::minted(&app, minted));
	}

	Ok((StatusCode::CREATED, Json(ApiResponse::with_server_time(views))))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKeysQuery {
	#[serde(rename = "includeRevoked", default)]
	include_revoked: Option<bool>,
}

impl ListKeysQuery {
	pub fn from_flag(include_revoked: Option<bool>) -> Self {
		Self { include_revoked }
	}
}

/// GET /w/:key/keys - list key metadata (never plaintext or hashes)
pub async fn get_keys(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	axum::extract::Query(query): axum::extract::Query<ListKeysQuery>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vec<KeyView>>>)> {
	let keys = app.store.list_keys(key.ws, query.include_revoked.unwrap_or(false)).await?;
	let views = keys.into_iter().map(KeyView::from_record).collect();
	Ok((StatusCode::OK, Json(ApiResponse::new(views))))
}

// vim: ts=4
