//! Append surface: `POST /a/:key/:path` (single or batch) and single-append
//! reads.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::core::extract::KeyAuth;
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::{
	AppendContext, AppendInput, AppendRow, AppendType, FileRow, KeyRecord,
};
use crate::types::ApiResponse;
use crate::webhook;

/// Single-append content cap (1 MiB)
pub const MAX_APPEND_BYTES: usize = 1024 * 1024;
/// Batch size cap; a batch is one transaction, so keep it bounded
pub const MAX_BATCH_ITEMS: usize = 100;

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct AppendView {
	pub id: String,
	#[serde(rename = "type")]
	pub typ: AppendType,
	#[serde(rename = "ref")]
	pub parent_ref: Option<String>,
	pub author: Box<str>,
	pub status: Option<Box<str>>,
	pub priority: Option<Box<str>>,
	pub labels: Option<Box<[Box<str>]>>,
	pub content: Option<Box<str>>,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<Timestamp>,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
}

impl From<AppendRow> for AppendView {
	fn from(row: AppendRow) -> Self {
		Self {
			id: row.wire_id(),
			typ: row.typ,
			parent_ref: row.parent_ref.map(|seq| format!("a{}", seq)),
			author: row.author,
			status: row.status,
			priority: row.priority,
			labels: row.labels,
			content: row.content,
			expires_at: row.expires_at,
			created_at: row.created_at,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AppendResult {
	Single(AppendView),
	Batch { results: Vec<AppendView> },
}

/// Parse a wire append id (`a17`) into the sequence number
pub fn parse_append_id(raw: &str) -> ApiResult<i64> {
	raw.strip_prefix('a')
		.and_then(|digits| digits.parse::<i64>().ok())
		.filter(|seq| *seq >= 1)
		.ok_or_else(|| Error::InvalidRequest(format!("invalid append id '{}'", raw)))
}

fn parse_priority(value: &Value) -> ApiResult<Box<str>> {
	match value {
		Value::String(s) => Ok(s.as_str().into()),
		Value::Number(n) => Ok(n.to_string().into()),
		_ => Err(Error::InvalidRequest("priority must be a string or number".into())),
	}
}

fn parse_item(item: &Value, batch_author: Option<&str>, key: &KeyRecord) -> ApiResult<AppendInput> {
	let obj = item
		.as_object()
		.ok_or_else(|| Error::InvalidRequest("append must be an object".into()))?;

	let typ_raw = obj
		.get("type")
		.and_then(Value::as_str)
		.ok_or_else(|| Error::InvalidRequest("type is required".into()))?;
	let typ = AppendType::parse(typ_raw)
		.ok_or_else(|| Error::InvalidRequest(format!("unknown append type '{}'", typ_raw)))?;

	let author = match obj.get("author").and_then(Value::as_str).or(batch_author) {
		Some(author) => author,
		None => return Err(Error::InvalidRequest("author is required".into())),
	};
	key_engine::validate_author(author)?;
	key_engine::check_author(key, author)?;

	let parent_ref = match obj.get("ref") {
		None | Some(Value::Null) => None,
		Some(Value::String(raw)) => Some(parse_append_id(raw)?),
		Some(_) => return Err(Error::InvalidRequest("ref must be a string".into())),
	};

	let content: Option<Box<str>> = match obj.get("content") {
		None | Some(Value::Null) => None,
		Some(Value::String(s)) => {
			if s.len() > MAX_APPEND_BYTES {
				return Err(Error::PayloadTooLarge { limit: MAX_APPEND_BYTES as u64 });
			}
			Some(s.as_str().into())
		}
		Some(_) => return Err(Error::InvalidRequest("content must be a string".into())),
	};

	let priority = match obj.get("priority") {
		None | Some(Value::Null) => None,
		Some(value) => Some(parse_priority(value)?),
	};

	let labels: Option<Box<[Box<str>]>> = match obj.get("labels") {
		None | Some(Value::Null) => None,
		Some(Value::Array(items)) => {
			let mut labels = Vec::with_capacity(items.len());
			for label in items {
				match label.as_str() {
					Some(label) => labels.push(label.into()),
					None => {
						return Err(Error::InvalidRequest("labels must be strings".into()));
					}
				}
			}
			Some(labels.into_boxed_slice())
		}
		Some(_) => return Err(Error::InvalidRequest("labels must be an array".into())),
	};

	Ok(AppendInput { typ, parent_ref, author: author.into(), content, priority, labels })
}

/// Parse the request body: a bare append object, or `{ author, appends }`
fn parse_body(body: &Bytes, key: &KeyRecord) -> ApiResult<(Vec<AppendInput>, bool)> {
	let value: Value = serde_json::from_slice(body)
		.map_err(|err| Error::InvalidRequest(err.to_string()))?;

	if let Some(appends) = value.get("appends") {
		let batch_author = value.get("author").and_then(Value::as_str);
		let items = appends
			.as_array()
			.ok_or_else(|| Error::InvalidRequest("appends must be an array".into()))?;
		if items.is_empty() {
			return Err(Error::InvalidRequest("appends must not be empty".into()));
		}
		if items.len() > MAX_BATCH_ITEMS {
			return Err(Error::InvalidRequest(format!(
				"a batch may contain at most {} appends",
				MAX_BATCH_ITEMS
			)));
		}
		let inputs = items
			.iter()
			.map(|item| parse_item(item, batch_author, key))
			.collect::<ApiResult<Vec<_>>>()?;
		Ok((inputs, true))
	} else {
		Ok((vec![parse_item(&value, None, key)?], false))
	}
}

/// Merge file and workspace settings into the planner context
pub async fn build_context(app: &App, key: &KeyRecord, file: &FileRow) -> ApiResult<AppendContext> {
	let ws_settings = app.store.read_workspace_settings(key.ws).await?;
	let effective = file.settings.merged_over(&ws_settings);

	Ok(AppendContext {
		key_allowed_types: key.allowed_types.clone(),
		file_allowed_types: effective
			.allowed_append_types
			.map(|types| types.into_boxed_slice()),
		wip_limit: key.wip_limit,
		wip_scope: key.scope_path.clone(),
		claim_duration_secs: effective
			.claim_duration_seconds
			.unwrap_or(app.opts.claim_duration_secs),
		now: Timestamp::now(),
	})
}

/// Execute an append batch against a normalized target path
pub async fn run_append(
	app: &App,
	key: &KeyRecord,
	path: &str,
	body: &Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<AppendResult>>)> {
	key_engine::check_scope(key, path)?;
	let (inputs, is_batch) = parse_body(body, key)?;

	let file = app.store.read_file(key.ws, path).await?;
	let ctx = build_context(app, key, &file).await?;

	let outcome = app.store.append_batch(key.ws, path, &inputs, &ctx).await?;
	debug!("appended {} item(s) to {}", outcome.rows.len(), path);

	webhook::emit_append_events(app, key, &outcome.file, &outcome.rows, &outcome.events).await;

	let views: Vec<AppendView> = outcome.rows.into_iter().map(Into::into).collect();
	let result = if is_batch {
		AppendResult::Batch { results: views }
	} else {
		match views.into_iter().next() {
			Some(view) => AppendResult::Single(view),
			None => return Err(Error::Internal("append produced no rows".into())),
		}
	};

	Ok((StatusCode::CREATED, Json(ApiResponse::with_server_time(result))))
}

/// GET /r/:key/ops/file/append/:appendId - read one append
pub async fn get_append(
	app: &App,
	key: &KeyRecord,
	path: &str,
	append_id: &str,
) -> ApiResult<(StatusCode, Json<ApiResponse<AppendView>>)> {
	key_engine::check_scope(key, path)?;
	let seq = parse_append_id(append_id).map_err(|_| Error::AppendNotFound)?;
	let row = app.store.read_append(key.ws, path, seq).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(row.into()))))
}

/// POST /a/:key - append to the file a file-scoped key points at
pub async fn post_append_root(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<AppendResult>>)> {
	let path = match key.scope_type {
		crate::store_adapter::ScopeType::File => key.scope_path.to_string(),
		_ => return Err(Error::FileNotFound),
	};
	run_append(&app, &key, &path, &body).await
}

// vim: ts=4
