//! API routes.
//!
//! The URL space is capability-shaped: `/{r,a,w}/:key[/...]`. Each class
//! router runs behind the key gate for its permission, and the wildcard
//! remainder is dispatched here: reserved segments (`folders`, `ops`,
//! `settings`, `webhooks`, `keys`, `move`, `claim`, `recover`, `rotate`) are
//! virtual endpoints, everything else is a file path.

use axum::{
	body::Bytes,
	extract::{Path, Query, State},
	http::{header, HeaderMap},
	middleware,
	response::{IntoResponse, Response},
	routing::{get, post},
	Router,
};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::append;
use crate::core::extract::{parse_json, KeyAuth, RequestKey};
use crate::core::path as vpath;
use crate::file;
use crate::folder;
use crate::idempotency;
use crate::key::gate::key_gate;
use crate::key::handler as key_handler;
use crate::prelude::*;
use crate::store_adapter::{KeyRecord, Permission, ScopeType};
use crate::webhook;
use crate::workspace;

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
	format: Option<String>,
	lines: Option<usize>,
	bytes: Option<usize>,
	limit: Option<u32>,
	action: Option<String>,
	recursive: Option<bool>,
	path: Option<String>,
	q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
	permanent: Option<bool>,
	cascade: Option<bool>,
	#[serde(rename = "confirmPath")]
	confirm_path: Option<String>,
	#[serde(rename = "rotateUrls")]
	rotate_urls: Option<bool>,
	#[serde(rename = "includeRevoked")]
	include_revoked: Option<bool>,
	limit: Option<u32>,
}

fn idem_header(headers: &HeaderMap) -> Option<&str> {
	headers.get(idempotency::HEADER).and_then(|v| v.to_str().ok())
}

fn if_match_header(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(header::IF_MATCH)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.trim().trim_matches('"'))
}

/// The file a bare `/r|a|w/:key` URL addresses (file-scoped keys only)
fn scope_file(key: &KeyRecord) -> ApiResult<String> {
	match key.scope_type {
		ScopeType::File => Ok(key.scope_path.to_string()),
		_ => Err(Error::FileNotFound),
	}
}

// Read surface //
//**************//

async fn get_read_root(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	RequestKey(plaintext): RequestKey,
	Query(query): Query<ReadQuery>,
) -> ApiResult<Response> {
	match key.scope_type {
		ScopeType::File => {
			let format = file::handler::ReadFormat::parse(query.format.as_deref())?;
			file::handler::read_file(&app, &key, &key.scope_path.to_string(), format).await
		}
		// workspace/folder keys: the bare URL lists the scope
		_ => {
			folder::handler::list_folder(
				&app,
				&key,
				&plaintext,
				&key.scope_path.to_string(),
				query.limit,
			)
			.await
		}
	}
}

async fn get_read_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	RequestKey(plaintext): RequestKey,
	Path((_key, rest)): Path<(String, String)>,
	Query(query): Query<ReadQuery>,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	match segments.as_slice() {
		["folders", tail @ ..] => {
			let folder = vpath::normalize(&tail.join("/"))?;
			if query.action.as_deref() == Some("export") {
				folder::handler::export_folder(
					&app,
					&key,
					&folder,
					query.format.as_deref(),
					query.recursive.unwrap_or(false),
				)
				.await
			} else if let Some(action) = &query.action {
				Err(Error::InvalidRequest(format!("unknown action '{}'", action)))
			} else {
				folder::handler::list_folder(&app, &key, &plaintext, &folder, query.limit).await
			}
		}
		["ops", "folders", "stats"] => {
			folder::handler::folder_stats(&app, &key, query.path.as_deref()).await
		}
		["ops", "folders", "search"] => {
			folder::handler::search(&app, &key, query.path.as_deref(), query.q.as_deref()).await
		}
		["ops", "file", "append", append_id] => {
			let target = match key.scope_type {
				ScopeType::File => key.scope_path.to_string(),
				_ => match &query.path {
					Some(raw) => vpath::normalize(raw)?,
					None => return Err(Error::InvalidRequest("path is required".into())),
				},
			};
			append::handler::get_append(&app, &key, &target, append_id)
				.await
				.map(IntoResponse::into_response)
		}
		// reserved single-file operations, addressed by a file-scoped key
		["raw"] => file::handler::read_raw(&app, &key, &scope_file(&key)?).await,
		["meta"] => file::handler::read_meta(&app, &key, &scope_file(&key)?).await,
		["structure"] => file::handler::read_structure(&app, &key, &scope_file(&key)?).await,
		["tail"] => {
			let tail_query =
				file::handler::TailQuery { lines: query.lines, bytes: query.bytes };
			file::handler::read_tail(&app, &key, &scope_file(&key)?, &tail_query).await
		}
		["section", ..] => {
			// the heading may itself contain '/', so take the raw remainder
			let heading = rest.splitn(2, '/').nth(1).unwrap_or_default();
			if heading.is_empty() {
				return Err(Error::SectionNotFound);
			}
			file::handler::read_section(&app, &key, &scope_file(&key)?, heading).await
		}
		_ => {
			let target = vpath::normalize(&rest)?;
			let format = file::handler::ReadFormat::parse(query.format.as_deref())?;
			file::handler::read_file(&app, &key, &target, format).await
		}
	}
}

// Append surface //
//****************//

async fn post_append_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Path((_key, rest)): Path<(String, String)>,
	body: Bytes,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	if let ["folders", middle @ .., "bulk"] = segments.as_slice() {
		let folder = vpath::normalize(&middle.join("/"))?;
		let req: folder::handler::BulkCreateReq = parse_json(&body)?;
		return folder::handler::bulk_create(&app, &key, &folder, &req).await;
	}

	let target = vpath::normalize(&rest)?;
	append::handler::run_append(&app, &key, &target, &body)
		.await
		.map(IntoResponse::into_response)
}

// Write surface //
//***************//

async fn put_write_root(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	headers: HeaderMap,
	body: Bytes,
) -> ApiResult<Response> {
	let target = scope_file(&key)?;
	file::handler::put_file(&app, &key, &target, if_match_header(&headers), &body).await
}

async fn patch_write_root(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	body: Bytes,
) -> ApiResult<Response> {
	let target = scope_file(&key)?;
	let req: file::management::RenameReq = parse_json(&body)?;
	file::management::rename_file(&app, &key, &target, &req).await
}

async fn delete_write_root(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Query(query): Query<WriteQuery>,
	headers: HeaderMap,
) -> ApiResult<Response> {
	let target = scope_file(&key)?;
	file::management::delete_file(
		&app,
		&key,
		&target,
		query.permanent.unwrap_or(false),
		idem_header(&headers),
	)
	.await
}

async fn get_write_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	RequestKey(plaintext): RequestKey,
	Path((_key, rest)): Path<(String, String)>,
	Query(query): Query<WriteQuery>,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	match segments.as_slice() {
		["settings"] => file::settings::get_settings(&app, &key).await,
		["webhooks"] => webhook::handler::get_webhooks(State(app), KeyAuth(key))
			.await
			.map(IntoResponse::into_response),
		["keys"] => key_handler::get_keys(
			State(app),
			KeyAuth(key),
			Query(key_handler::ListKeysQuery::from_flag(query.include_revoked)),
		)
		.await
		.map(IntoResponse::into_response),
		["folders", tail @ ..] => {
			let folder = vpath::normalize(&tail.join("/"))?;
			folder::handler::list_folder(&app, &key, &plaintext, &folder, query.limit).await
		}
		_ => Err(Error::NotFound),
	}
}

async fn put_write_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Path((_key, rest)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> ApiResult<Response> {
	let target = vpath::normalize(&rest)?;
	file::handler::put_file(&app, &key, &target, if_match_header(&headers), &body).await
}

async fn post_write_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Path((_key, rest)): Path<(String, String)>,
	Query(query): Query<WriteQuery>,
	headers: HeaderMap,
	body: Bytes,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	match segments.as_slice() {
		["claim"] => workspace::handler::post_claim(State(app), KeyAuth(key), headers)
			.await
			.map(IntoResponse::into_response),
		["move"] => {
			let req: file::management::MoveReq = parse_json(&body)?;
			file::management::move_file(&app, &key, &req, idem_header(&headers)).await
		}
		["webhooks"] => webhook::handler::post_webhook(State(app), KeyAuth(key), body)
			.await
			.map(IntoResponse::into_response),
		["keys"] => key_handler::post_keys(State(app), KeyAuth(key), body)
			.await
			.map(IntoResponse::into_response),
		["folders"] => {
			let req: folder::handler::CreateFolderReq = parse_json(&body)?;
			folder::handler::create_folder(&app, &key, &req).await
		}
		["recover"] => {
			let target = scope_file(&key)?;
			file::management::recover_file(
				&app,
				&key,
				&target,
				query.rotate_urls.unwrap_or(false),
			)
			.await
		}
		["rotate"] => {
			let target = scope_file(&key)?;
			file::management::rotate_file_keys(&app, &key, &target).await
		}
		_ => Err(Error::NotFound),
	}
}

async fn delete_write_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Path((_key, rest)): Path<(String, String)>,
	Query(query): Query<WriteQuery>,
	headers: HeaderMap,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	match segments.as_slice() {
		["webhooks", webhook_id] => {
			webhook::handler::delete_webhook(&app, &key, webhook_id)
				.await
				.map(IntoResponse::into_response)
		}
		["folders", tail @ ..] => {
			let folder = vpath::normalize(&tail.join("/"))?;
			folder::handler::delete_folder(
				&app,
				&key,
				&folder,
				query.cascade.unwrap_or(false),
				query.confirm_path.as_deref(),
			)
			.await
		}
		_ => {
			let target = vpath::normalize(&rest)?;
			file::management::delete_file(
				&app,
				&key,
				&target,
				query.permanent.unwrap_or(false),
				idem_header(&headers),
			)
			.await
		}
	}
}

async fn patch_write_dispatch(
	State(app): State<App>,
	KeyAuth(key): KeyAuth,
	Path((_key, rest)): Path<(String, String)>,
	body: Bytes,
) -> ApiResult<Response> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	match segments.as_slice() {
		["settings"] => {
			let patch: crate::store_adapter::DocSettingsPatch = parse_json(&body)?;
			file::settings::patch_settings(&app, &key, &patch).await
		}
		["folders", tail @ ..] => {
			let folder = vpath::normalize(&tail.join("/"))?;
			let req: folder::handler::RenameFolderReq = parse_json(&body)?;
			folder::handler::rename_folder(&app, &key, &folder, &req).await
		}
		_ => {
			let target = vpath::normalize(&rest)?;
			let req: file::management::RenameReq = parse_json(&body)?;
			file::management::rename_file(&app, &key, &target, &req).await
		}
	}
}

// Router assembly //
//*****************//

pub fn init_routes(app: App) -> Router {
	let read_router = Router::new()
		.route("/r/{key}", get(get_read_root))
		.route("/r/{key}/{*rest}", get(get_read_dispatch))
		.route_layer(middleware::from_fn_with_state(app.clone(), key_gate(Permission::Read)));

	let append_router = Router::new()
		.route("/a/{key}", post(append::handler::post_append_root))
		.route("/a/{key}/{*rest}", post(post_append_dispatch))
		.route_layer(middleware::from_fn_with_state(app.clone(), key_gate(Permission::Append)));

	let write_router = Router::new()
		.route(
			"/w/{key}",
			axum::routing::put(put_write_root)
				.patch(patch_write_root)
				.delete(delete_write_root),
		)
		.route(
			"/w/{key}/{*rest}",
			get(get_write_dispatch)
				.put(put_write_dispatch)
				.post(post_write_dispatch)
				.delete(delete_write_dispatch)
				.patch(patch_write_dispatch),
		)
		.route_layer(middleware::from_fn_with_state(app.clone(), key_gate(Permission::Write)));

	Router::new()
		.route("/bootstrap", post(workspace::handler::post_bootstrap))
		.merge(read_router)
		.merge(append_router)
		.merge(write_router)
		.layer(axum::extract::DefaultBodyLimit::max(
			file::handler::MAX_FILE_BYTES + 64 * 1024,
		))
		.layer(SetResponseHeaderLayer::if_not_present(
			header::CACHE_CONTROL,
			header::HeaderValue::from_static("no-store, no-cache"),
		))
		.layer(TraceLayer::new_for_http())
		.with_state(app)
}

// vim: ts=4
