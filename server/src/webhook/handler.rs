//! Webhook management endpoints: register, list, delete.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::core::extract::{parse_json, KeyAuth};
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::{AppendType, NewWebhook, ScopeType, WebhookRow, WebhookStatus};
use crate::types::ApiResponse;
use crate::webhook::{guard, ALLOWED_EVENTS};

#[derive(Debug, Default, Deserialize)]
struct FiltersReq {
	authors: Option<Vec<String>>,
	#[serde(rename = "appendTypes")]
	append_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CreateWebhookReq {
	url: String,
	events: Vec<String>,
	filters: Option<FiltersReq>,
	recursive: Option<bool>,
	#[serde(rename = "includeUrls")]
	include_urls: Option<bool>,
	secret: Option<String>,
	#[serde(rename = "scopeType")]
	scope_type: Option<String>,
	#[serde(rename = "scopePath")]
	scope_path: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct WebhookView {
	pub id: Box<str>,
	pub url: Box<str>,
	pub events: Box<[Box<str>]>,
	#[serde(rename = "scopeType")]
	pub scope_type: ScopeType,
	#[serde(rename = "scopePath")]
	pub scope_path: Box<str>,
	pub recursive: bool,
	#[serde(rename = "includeUrls")]
	pub include_urls: bool,
	pub status: WebhookStatus,
	/// Returned exactly once, at creation
	pub secret: Option<Box<str>>,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
}

impl WebhookView {
	fn from_row(row: WebhookRow, with_secret: bool) -> Self {
		Self {
			id: row.webhook_id,
			url: row.url,
			events: row.events,
			scope_type: row.scope_type,
			scope_path: row.scope_path,
			recursive: row.recursive,
			include_urls: row.include_urls,
			status: row.status,
			secret: with_secret.then_some(row.secret),
			created_at: row.created_at,
		}
	}
}

/// POST /w/:key/webhooks
pub async fn post_webhook(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<WebhookView>>)> {
	let req: CreateWebhookReq = parse_json(&body)?;

	if req.events.is_empty() {
		return Err(Error::InvalidRequest("events must not be empty".into()));
	}
	for event in &req.events {
		if !ALLOWED_EVENTS.contains(&event.as_str()) {
			return Err(Error::InvalidEventType(event.clone()));
		}
	}

	guard::validate_url(&req.url).await?;

	let (scope_type, scope_path) = match (&req.scope_type, &req.scope_path) {
		(None, None) => (key.scope_type, key.scope_path.to_string()),
		(raw_type, raw_path) => {
			let scope_type = match raw_type.as_deref() {
				None => ScopeType::Folder,
				Some(raw) => ScopeType::parse(raw).ok_or_else(|| {
					Error::InvalidRequest(format!("unknown scopeType '{}'", raw))
				})?,
			};
			let scope_path = match raw_path.as_deref() {
				Some(raw) => crate::core::path::normalize(raw)?,
				None => "/".to_string(),
			};
			(scope_type, scope_path)
		}
	};
	key_engine::check_scope(&key, &scope_path)?;

	let filter_authors: Option<Vec<Box<str>>> = req
		.filters
		.as_ref()
		.and_then(|f| f.authors.as_ref())
		.map(|authors| authors.iter().map(|a| Box::from(a.as_str())).collect());
	let filter_append_types: Option<Vec<AppendType>> = match req
		.filters
		.as_ref()
		.and_then(|f| f.append_types.as_ref())
	{
		Some(raw) => Some(
			raw.iter()
				.map(|s| {
					AppendType::parse(s).ok_or_else(|| {
						Error::InvalidRequest(format!("unknown append type '{}'", s))
					})
				})
				.collect::<ApiResult<Vec<_>>>()?,
		),
		None => None,
	};

	let secret = match req.secret {
		Some(secret) => {
			if !secret.starts_with("whsec_") || secret.len() < 16 {
				return Err(Error::InvalidRequest(
					"secret must start with 'whsec_' and be at least 16 characters".into(),
				));
			}
			secret
		}
		None => format!("whsec_{}", key_engine::generate_token(24)),
	};
	let webhook_id = format!("wh_{}", key_engine::generate_token(12));

	let events: Vec<Box<str>> = req.events.iter().map(|e| Box::from(e.as_str())).collect();
	let row = app
		.store
		.create_webhook(
			key.ws,
			&NewWebhook {
				webhook_id: &webhook_id,
				scope_type,
				scope_path: &scope_path,
				url: &req.url,
				events: &events,
				filter_authors: filter_authors.as_deref(),
				filter_append_types: filter_append_types.as_deref(),
				recursive: req.recursive.unwrap_or(true),
				include_urls: req.include_urls.unwrap_or(false),
				secret: &secret,
			},
		)
		.await?;
	info!("registered webhook {} for {}", webhook_id, scope_path);

	let view = WebhookView::from_row(row, true);
	Ok((StatusCode::CREATED, Json(ApiResponse::with_server_time(view))))
}

/// GET /w/:key/webhooks - secrets are never listed
pub async fn get_webhooks(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vec<WebhookView>>>)> {
	let rows = app.store.list_webhooks(key.ws).await?;
	let views = rows.into_iter().map(|row| WebhookView::from_row(row, false)).collect();
	Ok((StatusCode::OK, Json(ApiResponse::new(views))))
}

/// DELETE /w/:key/webhooks/:id
pub async fn delete_webhook(
	app: &App,
	key: &crate::store_adapter::KeyRecord,
	webhook_id: &str,
) -> ApiResult<(StatusCode, Json<ApiResponse<serde_json::Value>>)> {
	app.store.delete_webhook(key.ws, webhook_id).await?;
	info!("deleted webhook {}", webhook_id);
	let view = serde_json::json!({ "id": webhook_id, "deleted": true });
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))))
}

// vim: ts=4
