//! File management: delete, recover, rotate, move, rename.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::core::path;
use crate::idempotency;
use crate::key::engine as key_engine;
use crate::prelude::*;
use crate::store_adapter::{KeyRecord, ScopeType};
use crate::types::ApiResponse;
use crate::webhook;

/// DELETE /w/:key/:path[?permanent=true]
pub async fn delete_file(
	app: &App,
	key: &KeyRecord,
	target: &str,
	permanent: bool,
	idem_key: Option<&str>,
) -> ApiResult<Response> {
	key_engine::check_scope(key, target)?;

	if permanent {
		let ws = key.ws;
		let digest_payload = format!("permanent-delete {}", target);
		return idempotency::run(app, ws, "file.delete", idem_key, &digest_payload, || async {
			let file = match app.store.read_file(ws, target).await {
				Ok(file) => Some(file),
				Err(Error::FileDeleted { .. }) => None, // purging a soft-deleted row is fine
				Err(err) => return Err(err),
			};
			app.store.purge_file(ws, target).await?;
			let revoked = app.store.revoke_file_keys(ws, target).await?;
			info!("permanently deleted {} ({} keys revoked)", target, revoked);
			if let Some(file) = &file {
				webhook::emit_file_event(app, key, "file.deleted", file).await;
			}
			let body = serde_json::to_value(ApiResponse::with_server_time(json!({
				"path": target,
				"deleted": true,
				"recoverable": false,
			})))?;
			Ok((StatusCode::OK, body))
		})
		.await;
	}

	let expires_at = Timestamp::now().add_seconds(app.opts.retention_secs);
	let file = app.store.soft_delete_file(key.ws, target, expires_at).await?;
	webhook::emit_file_event(app, key, "file.deleted", &file).await;

	let view = json!({
		"path": file.path,
		"deleted": true,
		"recoverable": true,
		"expiresAt": expires_at,
	});
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct RecoverQuery {
	#[serde(rename = "rotateUrls", default)]
	pub rotate_urls: Option<bool>,
}

/// POST /w/:fileKey/recover[?rotateUrls=true]
pub async fn recover_file(
	app: &App,
	key: &KeyRecord,
	target: &str,
	rotate_urls: bool,
) -> ApiResult<Response> {
	key_engine::check_scope(key, target)?;
	let file = app.store.recover_file(key.ws, target).await?;
	info!("recovered {}", target);

	let mut view = json!({
		"path": file.path,
		"recovered": true,
		"etag": file.etag,
	});
	if rotate_urls {
		let revoked = app.store.revoke_file_keys(key.ws, target).await?;
		let triple = key_engine::mint_triple(app, key.ws, ScopeType::File, target).await?;
		debug!("rotated {} keys on recover of {}", revoked, target);
		view["urls"] =
			serde_json::to_value(key_engine::KeyUrls::from_triple(&app.opts.base_url, &triple))?;
	}

	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

/// POST /w/:fileKey/rotate - revoke the file triple, mint a fresh one
pub async fn rotate_file_keys(app: &App, key: &KeyRecord, target: &str) -> ApiResult<Response> {
	key_engine::check_scope(key, target)?;
	// 410 on a soft-deleted file
	let _file = app.store.read_file(key.ws, target).await?;

	let revoked = app.store.revoke_file_keys(key.ws, target).await?;
	let triple = key_engine::mint_triple(app, key.ws, ScopeType::File, target).await?;
	info!("rotated keys for {} ({} revoked)", target, revoked);

	let view = json!({
		"path": target,
		"rotated": true,
		"revokedKeys": revoked,
		"urls": key_engine::KeyUrls::from_triple(&app.opts.base_url, &triple),
	});
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MoveReq {
	pub source: String,
	pub destination: String,
}

/// POST /w/:key/move - destination is a folder; the file keeps its basename
pub async fn move_file(
	app: &App,
	key: &KeyRecord,
	req: &MoveReq,
	idem_key: Option<&str>,
) -> ApiResult<Response> {
	let source = path::normalize(&req.source)?;
	let destination = path::normalize(&req.destination)?;
	let dest_path = path::join(&destination, path::basename(&source));

	key_engine::check_scope(key, &source)?;
	key_engine::check_scope(key, &dest_path)?;

	let ws = key.ws;
	let digest_payload = format!("move {} {}", source, dest_path);
	idempotency::run(app, ws, "file.move", idem_key, &digest_payload, || async {
		let file = app.store.move_file(ws, &source, &dest_path, Timestamp::now()).await?;
		info!("moved {} -> {}", source, dest_path);
		webhook::emit_file_event(app, key, "file.updated", &file).await;
		let body = serde_json::to_value(ApiResponse::with_server_time(json!({
			"source": source,
			"destination": file.path,
			"moved": true,
			"etag": file.etag,
		})))?;
		Ok((StatusCode::OK, body))
	})
	.await
}

#[derive(Debug, Deserialize)]
pub struct RenameReq {
	pub filename: String,
}

/// PATCH /w/:fileKey (or /w/:key/:path) - rename in place
pub async fn rename_file(
	app: &App,
	key: &KeyRecord,
	target: &str,
	req: &RenameReq,
) -> ApiResult<Response> {
	key_engine::check_scope(key, target)?;
	path::validate_filename(&req.filename)?;

	let file = app.store.rename_file(key.ws, target, &req.filename, Timestamp::now()).await?;
	info!("renamed {} -> {}", target, file.path);
	webhook::emit_file_event(app, key, "file.updated", &file).await;

	let view = json!({
		"path": file.path,
		"filename": file.filename,
		"etag": file.etag,
	});
	Ok((StatusCode::OK, Json(ApiResponse::with_server_time(view))).into_response())
}

// vim: ts=4
