//! File read surface and PUT.

use axum::{
	body::Bytes,
	http::{header, HeaderMap, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::append::handler::AppendView;
use crate::file::markdown;
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::{DocSettings, FileRow, KeyRecord, ScopeType};
use crate::types::ApiResponse;
use crate::webhook;

/// File content cap (10 MiB)
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Tail bounds
pub const MAX_TAIL_LINES: usize = 1000;
pub const MAX_TAIL_BYTES: usize = 100_000;
pub const DEFAULT_TAIL_BYTES: usize = 10_000;

pub fn etag_headers(etag: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();
	if let Ok(value) = HeaderValue::from_str(etag) {
		headers.insert(header::ETAG, value);
	}
	headers
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct FileView {
	pub path: Box<str>,
	pub filename: Box<str>,
	pub folder: Box<str>,
	pub content: Option<Box<str>>,
	pub etag: Box<str>,
	pub size: i64,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	#[serde(rename = "updatedAt")]
	pub updated_at: Timestamp,
	pub settings: DocSettings,
	#[serde(rename = "appendCount")]
	pub append_count: i64,
	#[serde(rename = "taskStats")]
	pub task_stats: Option<crate::append::claim::TaskStats>,
	pub frontmatter: Option<serde_json::Value>,
	pub appends: Option<Vec<AppendView>>,
}

impl FileView {
	pub fn from_row(file: &FileRow, with_content: bool) -> Self {
		Self {
			path: file.path.clone(),
			filename: file.filename.clone(),
			folder: file.folder.clone(),
			content: with_content.then(|| file.content.clone()),
			etag: file.etag.clone(),
			size: file.size,
			created_at: file.created_at,
			updated_at: file.updated_at,
			settings: file.settings.clone(),
			append_count: file.append_count,
			task_stats: None,
			frontmatter: None,
			appends: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
	Default,
	Parsed,
}

impl ReadFormat {
	/// The format enum is closed; unknown values are an input error
	pub fn parse(raw: Option<&str>) -> ApiResult<Self> {
		match raw {
			None | Some("default") => Ok(Self::Default),
			Some("parsed") => Ok(Self::Parsed),
			Some(other) => {
				Err(Error::InvalidRequest(format!("unknown format '{}'", other)))
			}
		}
	}
}

/// GET /r/:key/:path (and GET /r/:fileKey) - full read
pub async fn read_file(
	app: &App,
	key: &KeyRecord,
	path: &str,
	format: ReadFormat,
) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	let file = app.store.read_file(key.ws, path).await?;

	let mut view = FileView::from_row(&file, true);
	if format == ReadFormat::Parsed {
		let (_, appends) = app.store.list_appends(key.ws, path).await?;
		let board = app.claim_cache.get_or_reduce(file.file_rid, file.append_count, &appends);
		view.task_stats = Some(board.stats(Timestamp::now()));
		view.frontmatter = markdown::frontmatter(&file.content);
		view.appends = Some(appends.into_iter().map(Into::into).collect());
	}

	let headers = etag_headers(&file.etag);
	Ok((StatusCode::OK, headers, Json(ApiResponse::new(view))).into_response())
}

/// GET /r/:fileKey/raw - body as text/markdown
pub async fn read_raw(app: &App, key: &KeyRecord, path: &str) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	let file = app.store.read_file(key.ws, path).await?;

	let mut headers = etag_headers(&file.etag);
	headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/markdown; charset=utf-8"));
	Ok((StatusCode::OK, headers, file.content.into_string()).into_response())
}

/// GET /r/:fileKey/meta - metadata without content
pub async fn read_meta(app: &App, key: &KeyRecord, path: &str) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	let file = app.store.read_file(key.ws, path).await?;
	let (_, appends) = app.store.list_appends(key.ws, path).await?;
	let board = app.claim_cache.get_or_reduce(file.file_rid, file.append_count, &appends);

	let mut view = FileView::from_row(&file, false);
	view.task_stats = Some(board.stats(Timestamp::now()));

	let headers = etag_headers(&file.etag);
	Ok((StatusCode::OK, headers, Json(ApiResponse::new(view))).into_response())
}

/// GET /r/:fileKey/structure - document headings
pub async fn read_structure(app: &App, key: &KeyRecord, path: &str) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	let file = app.store.read_file(key.ws, path).await?;
	let headings = markdown::structure(&file.content);
	Ok((StatusCode::OK, Json(ApiResponse::new(headings))).into_response())
}

/// GET /r/:fileKey/section/:heading - one section, URL-decoded exact match
pub async fn read_section(
	app: &App,
	key: &KeyRecord,
	path: &str,
	heading: &str,
) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	let file = app.store.read_file(key.ws, path).await?;
	let section = markdown::section(&file.content, heading)?;
	Ok((StatusCode::OK, Json(ApiResponse::new(section))).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct TailQuery {
	pub lines: Option<usize>,
	pub bytes: Option<usize>,
}

/// GET /r/:fileKey/tail?lines=N|bytes=M
pub async fn read_tail(
	app: &App,
	key: &KeyRecord,
	path: &str,
	query: &TailQuery,
) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;

	let tail = match (query.lines, query.bytes) {
		(Some(_), Some(_)) => {
			return Err(Error::InvalidRequest("pass either lines or bytes, not both".into()));
		}
		(Some(lines), None) => {
			if lines == 0 || lines > MAX_TAIL_LINES {
				return Err(Error::InvalidRequest(format!(
					"lines must be between 1 and {}",
					MAX_TAIL_LINES
				)));
			}
			let file = app.store.read_file(key.ws, path).await?;
			markdown::tail_lines(&file.content, lines)
		}
		(None, bytes) => {
			let bytes = bytes.unwrap_or(DEFAULT_TAIL_BYTES);
			if bytes == 0 || bytes > MAX_TAIL_BYTES {
				return Err(Error::InvalidRequest(format!(
					"bytes must be between 1 and {}",
					MAX_TAIL_BYTES
				)));
			}
			let file = app.store.read_file(key.ws, path).await?;
			markdown::tail_bytes(&file.content, bytes)
		}
	};

	Ok((StatusCode::OK, Json(ApiResponse::new(tail))).into_response())
}

#[derive(Debug, Deserialize)]
struct PutFileReq {
	content: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct PutFileView {
	pub path: Box<str>,
	pub filename: Box<str>,
	pub etag: Box<str>,
	pub size: i64,
	pub created: bool,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	#[serde(rename = "updatedAt")]
	pub updated_at: Timestamp,
	/// File-scoped capability URLs, reported on create
	pub urls: Option<key_engine::KeyUrls>,
}

/// PUT /w/:key/:path - create (201) or update (200), `If-Match` honored
pub async fn put_file(
	app: &App,
	key: &KeyRecord,
	path: &str,
	if_match: Option<&str>,
	body: &Bytes,
) -> ApiResult<Response> {
	key_engine::check_scope(key, path)?;
	if body.len() > MAX_FILE_BYTES + 4096 {
		// fast-path reject before JSON parse; the precise check is on content
		return Err(Error::PayloadTooLarge { limit: MAX_FILE_BYTES as u64 });
	}
	let req: PutFileReq = crate::core::extract::parse_json(body)?;
	if req.content.len() > MAX_FILE_BYTES {
		return Err(Error::PayloadTooLarge { limit: MAX_FILE_BYTES as u64 });
	}

	let etag = crate::core::etag::content_etag(req.content.as_bytes());
	let outcome = app
		.store
		.put_file(key.ws, path, &req.content, &etag, if_match, Timestamp::now())
		.await?;

	let mut view = PutFileView {
		path: outcome.file.path.clone(),
		filename: outcome.file.filename.clone(),
		etag: outcome.file.etag.clone(),
		size: outcome.file.size,
		created: outcome.created,
		created_at: outcome.file.created_at,
		updated_at: outcome.file.updated_at,
		urls: None,
	};

	if outcome.created {
		// every file gets its own capability triple
		let triple = key_engine::mint_triple(app, key.ws, ScopeType::File, path).await?;
		view.urls = Some(key_engine::KeyUrls::from_triple(&app.opts.base_url, &triple));
		info!("created file {}", path);
	}

	let event = if outcome.created { "file.created" } else { "file.updated" };
	webhook::emit_file_event(app, key, event, &outcome.file).await;

	let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
	let headers = etag_headers(&outcome.file.etag);
	Ok((status, headers, Json(ApiResponse::with_server_time(view))).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_format_is_a_closed_enum() {
		assert!(ReadFormat::parse(None).is_ok());
		assert!(ReadFormat::parse(Some("parsed")).is_ok());
		assert!(matches!(
			ReadFormat::parse(Some("yaml")),
			Err(Error::InvalidRequest(_))
		));
	}
}

// vim: ts=4
