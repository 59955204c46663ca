//! Folder virtualization: listing, create, stats, search, bulk create,
//! export, cascade delete, rename.
//!
//! Folders are not first-class rows; a folder exists iff a file lives under
//! its prefix (or an explicit marker row was created). Everything here is a
//! prefix query over the file table.

use axum::{
	http::{header, HeaderMap, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::skip_serializing_none;

use crate::core::etag::sha256_hex;
use crate::core::path;
use crate::core::worker::Priority;
use crate::file::handler::MAX_FILE_BYTES;
use crate::folder::export::{build_zip, ExportEntry};
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::{KeyRecord, ScopeType};
use crate::types::ApiResponse;
use crate::webhook;

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FolderChild {
	File {
		name: Box<str>,
		#[serde(rename = "type")]
		typ: &'static str,
		size: i64,
		#[serde(rename = "updatedAt")]
		updated_at: Timestamp,
		urls: ChildUrls,
	},
	Folder {
		name: Box<str>,
		#[serde(rename = "type")]
		typ: &'static str,
	},
}

/// Capability links rendered relative to the caller's own key: the key in
/// the request URL is reused on each surface it can unlock.
#[derive(Debug, Serialize)]
pub struct ChildUrls {
	pub read: String,
	pub append: String,
	pub write: String,
}

impl ChildUrls {
	fn new(base_url: &str, plaintext_key: &str, file_path: &str) -> Self {
		let render = |class: &str| format!("{}/{}/{}{}", base_url, class, plaintext_key, file_path);
		Self { read: render("r"), append: render("a"), write: render("w") }
	}
}

/// GET /r|w/:key/folders/:path?limit=N
pub async fn list_folder(
	app: &App,
	key: &KeyRecord,
	plaintext_key: &str,
	folder: &str,
	limit: Option<u32>,
) -> ApiResult<Response> {
	key_engine::check_scope(key, folder)?;
	let limit = match limit {
		None => DEFAULT_LIST_LIMIT,
		Some(limit) if (1..=MAX_LIST_LIMIT).contains(&limit) => limit,
		Some(_) => {
			return Err(Error::InvalidRequest(format!(
				"limit must be between 1 and {}",
				MAX_LIST_LIMIT
			)));
		}
	};

	let listing = app.store.list_folder(key.ws, folder, limit).await?;

	let mut children: Vec<FolderChild> = Vec::with_capacity(listing.files.len());
	for name in &listing.folders {
		children.push(FolderChild::Folder { name: name.clone(), typ: "folder" });
	}
	for file in &listing.files {
		children.push(FolderChild::File {
			name: file.name.clone(),
			typ: "file",
			size: file.size,
			updated_at: file.updated_at,
			urls: ChildUrls::new(&app.opts.base_url, plaintext_key, &file.path),
		});
	}

	let view = json!({
		"path": folder,
		"children": children,
		"truncated": listing.truncated,
	});
	Ok((StatusCode::OK, Json(ApiResponse::new(view))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
	pub name: String,
	pub path: Option<String>,
}

/// POST /w/:key/folders
pub async fn create_folder(app: &App, key: &KeyRecord, req: &CreateFolderReq) -> ApiResult<Response> {
	path::validate_filename(&req.name)?;
	let parent = match &req.path {
		Some(raw) => path::normalize(raw)?,
		None => "/".to_string(),
	};
	let target = path::join(&parent, &req.name);
	key_engine::check_scope(key, &target)?;

	app.store.create_folder(key.ws, &target, Timestamp::now()).await?;
	info!("created folder {}", target);

	let view = json!({ "path": target, "name": req.name, "created": true });
	Ok((StatusCode::CREATED, Json(ApiResponse::with_server_time(view))).into_response())
}

/// GET /r/:key/ops/folders/stats?path=P
pub async fn folder_stats(app: &App, key: &KeyRecord, raw_path: Option<&str>) -> ApiResult<Response> {
	let folder = path::normalize(raw_path.unwrap_or("/"))?;
	key_engine::check_scope(key, &folder)?;
	let stats = app.store.folder_stats(key.ws, &folder).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(stats))).into_response())
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct SearchHitView {
	pub path: Box<str>,
	pub name: Box<str>,
	pub size: i64,
	#[serde(rename = "updatedAt")]
	pub updated_at: Timestamp,
	pub etag: Box<str>,
	#[serde(rename = "matchedIn")]
	pub matched_in: Box<str>,
	pub snippet: Option<Box<str>>,
}

/// GET /r/:key/ops/folders/search?path=P&q=Q
pub async fn search(
	app: &App,
	key: &KeyRecord,
	raw_path: Option<&str>,
	q: Option<&str>,
) -> ApiResult<Response> {
	let q = q.filter(|q| !q.is_empty()).ok_or_else(|| {
		Error::InvalidRequest("q is required".into())
	})?;
	let folder = path::normalize(raw_path.unwrap_or("/"))?;
	key_engine::check_scope(key, &folder)?;

	let hits = app.store.search_files(key.ws, &folder, q, 100).await?;
	let views: Vec<SearchHitView> = hits
		.into_iter()
		.map(|hit| SearchHitView {
			path: hit.path,
			name: hit.name,
			size: hit.size,
			updated_at: hit.updated_at,
			etag: hit.etag,
			matched_in: hit.matched_in,
			snippet: hit.snippet,
		})
		.collect();
	Ok((StatusCode::OK, Json(ApiResponse::new(json!({ "query": q, "results": views }))))
		.into_response())
}

#[derive(Debug, Deserialize)]
pub struct BulkFileReq {
	pub filename: String,
	pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateReq {
	pub files: Vec<BulkFileReq>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct BulkResult {
	pub filename: String,
	pub ok: bool,
	pub path: Option<String>,
	pub etag: Option<Box<str>>,
	pub urls: Option<key_engine::KeyUrls>,
	pub error: Option<String>,
}

/// POST /a/:key/folders/:path/bulk - create many files; per-item outcome
pub async fn bulk_create(
	app: &App,
	key: &KeyRecord,
	folder: &str,
	req: &BulkCreateReq,
) -> ApiResult<Response> {
	key_engine::check_scope(key, folder)?;
	if req.files.is_empty() {
		return Err(Error::InvalidRequest("files must not be empty".into()));
	}
	if req.files.len() > 100 {
		return Err(Error::InvalidRequest("at most 100 files per bulk request".into()));
	}

	let mut results = Vec::with_capacity(req.files.len());
	for item in &req.files {
		let outcome = bulk_create_one(app, key, folder, item).await;
		results.push(match outcome {
			Ok(result) => result,
			Err(err) => BulkResult {
				filename: item.filename.clone(),
				ok: false,
				path: None,
				etag: None,
				urls: None,
				error: Some(err.code().to_string()),
			},
		});
	}

	let view = json!({ "folder": folder, "results": results });
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

async fn bulk_create_one(
	app: &App,
	key: &KeyRecord,
	folder: &str,
	item: &BulkFileReq,
) -> ApiResult<BulkResult> {
	path::validate_filename(&item.filename)?;
	if item.content.len() > MAX_FILE_BYTES {
		return Err(Error::PayloadTooLarge { limit: MAX_FILE_BYTES as u64 });
	}
	let target = path::join(folder, &item.filename);

	// create-only: an occupied path is a per-item conflict
	match app.store.read_file(key.ws, &target).await {
		Ok(_) => return Err(Error::Conflict("path already exists".into())),
		Err(Error::FileDeleted { expires_at }) => {
			return Err(Error::FileDeleted { expires_at });
		}
		Err(Error::FileNotFound) => {}
		Err(err) => return Err(err),
	}

	let etag = crate::core::etag::content_etag(item.content.as_bytes());
	let outcome = app
		.store
		.put_file(key.ws, &target, &item.content, &etag, None, Timestamp::now())
		.await?;

	let triple = key_engine::mint_triple(app, key.ws, ScopeType::File, &target).await?;
	webhook::emit_file_event(app, key, "file.created", &outcome.file).await;

	Ok(BulkResult {
		filename: item.filename.clone(),
		ok: true,
		path: Some(target),
		etag: Some(outcome.file.etag),
		urls: Some(key_engine::KeyUrls::from_triple(&app.opts.base_url, &triple)),
		error: None,
	})
}

/// GET /r/:key/folders/:path?action=export&format=zip[&recursive=true]
pub async fn export_folder(
	app: &App,
	key: &KeyRecord,
	folder: &str,
	format: Option<&str>,
	recursive: bool,
) -> ApiResult<Response> {
	key_engine::check_scope(key, folder)?;
	match format {
		None | Some("zip") => {}
		Some(other) => {
			return Err(Error::InvalidRequest(format!("unknown export format '{}'", other)));
		}
	}

	let mut files = app.store.list_files_recursive(key.ws, folder).await?;
	if !recursive {
		files.retain(|file| file.folder.as_ref() == folder);
	}

	let prefix = if folder == "/" { "/".to_string() } else { format!("{}/", folder) };
	let entries: Vec<ExportEntry> = files
		.iter()
		.map(|file| ExportEntry {
			name: file.path.strip_prefix(&prefix).unwrap_or(&file.path).to_string(),
			content: file.content.to_string(),
		})
		.collect();
	let manifest = json!({
		"folder": folder,
		"recursive": recursive,
		"fileCount": files.len(),
		"exportedAt": Timestamp::now(),
		"entries": files
			.iter()
			.map(|f| json!({ "path": f.path, "size": f.size, "etag": f.etag }))
			.collect::<Vec<_>>(),
	});

	let archive = app.worker.spawn(Priority::Low, move || build_zip(entries, manifest)).await??;
	let checksum = sha256_hex(&archive);
	let filename = if folder == "/" { "workspace" } else { path::basename(folder) };

	let mut headers = HeaderMap::new();
	headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
	if let Ok(value) =
		HeaderValue::from_str(&format!("attachment; filename=\"{}.zip\"", filename))
	{
		headers.insert(header::CONTENT_DISPOSITION, value);
	}
	if let Ok(value) = HeaderValue::from_str(&format!("sha256:{}", checksum)) {
		headers.insert("X-Export-Checksum", value);
	}

	Ok((StatusCode::OK, headers, archive).into_response())
}

/// DELETE /w/:key/folders/:path[?cascade=true&confirmPath=name]
pub async fn delete_folder(
	app: &App,
	key: &KeyRecord,
	folder: &str,
	cascade: bool,
	confirm_path: Option<&str>,
) -> ApiResult<Response> {
	key_engine::check_scope(key, folder)?;

	if !cascade {
		app.store.delete_empty_folder(key.ws, folder).await?;
		let view = json!({ "path": folder, "deleted": true });
		return Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response());
	}

	// destructive cascade needs the basename echoed back
	if confirm_path != Some(path::basename(folder)) {
		return Err(Error::ConfirmPathMismatch);
	}
	let expires_at = Timestamp::now().add_seconds(app.opts.retention_secs);
	let deleted = app.store.cascade_delete_folder(key.ws, folder, expires_at).await?;
	info!("cascade deleted {} ({} files)", folder, deleted);

	let view = json!({
		"path": folder,
		"deleted": true,
		"cascaded": deleted,
		"expiresAt": expires_at,
	});
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RenameFolderReq {
	pub name: String,
}

/// PATCH /w/:key/folders/:path - rename the prefix
pub async fn rename_folder(
	app: &App,
	key: &KeyRecord,
	folder: &str,
	req: &RenameFolderReq,
) -> ApiResult<Response> {
	key_engine::check_scope(key, folder)?;
	path::validate_filename(&req.name)?;
	if folder == "/" {
		return Err(Error::InvalidRequest("the root folder cannot be renamed".into()));
	}

	let (parent, _) = path::split(folder);
	let new_folder = path::join(parent, &req.name);
	key_engine::check_scope(key, &new_folder)?;

	let moved = app.store.rename_folder(key.ws, folder, &new_folder, Timestamp::now()).await?;
	info!("renamed folder {} -> {} ({} files)", folder, new_folder, moved);

	let view = json!({ "path": new_folder, "renamed": true, "files": moved });
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

// vim: ts=4
