//! SQLite-backed store adapter for mdvault.
//!
//! One writer pool (a single connection, so every write transaction
//! serializes) plus a small read-only pool. WAL keeps readers off the write
//! lock. This is what makes claim acquisition and append-id allocation
//! linearizable without any in-process locking.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;

use mdvault::prelude::*;
use mdvault::store_adapter::{
	AppendContext, AppendInput, AppendOutcome, AppendRow, CreateKeyOptions, DocSettings,
	DocSettingsPatch, FileRow, FolderListing, FolderStats, IdempotencyRow, KeyRecord,
	NewWebhook, PutFileOutcome, SearchHit, StoreAdapter, WebhookRow, WorkspaceRow,
};

mod append;
mod file;
mod idempotency;
mod key;
mod schema;
mod utils;
mod webhook;
mod workspace;

use utils::db_err;

#[derive(Debug)]
pub struct StoreAdapterSqlite {
	db: SqlitePool,
	dbr: SqlitePool,
}

impl StoreAdapterSqlite {
	pub async fn new(path: impl AsRef<Path>) -> ApiResult<Self> {
		let db_path = path.as_ref().join("store.db");
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(&db_path)
			.create_if_missing(true)
			.busy_timeout(std::time::Duration::from_secs(5))
			.journal_mode(sqlite::SqliteJournalMode::Wal);

		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(opts.clone())
			.await
			.map_err(db_err)?;
		let dbr = sqlite::SqlitePoolOptions::new()
			.max_connections(4)
			.connect_with(opts.read_only(true))
			.await
			.map_err(db_err)?;

		schema::init_db(&db).await.map_err(db_err)?;

		Ok(Self { db, dbr })
	}
}

#[async_trait]
impl StoreAdapter for StoreAdapterSqlite {
	// Workspaces
	//************
	async fn create_workspace(&self, workspace_id: &str, name: Option<&str>) -> ApiResult<WsRid> {
		workspace::create(&self.db, workspace_id, name).await
	}

	async fn read_workspace(&self, ws: WsRid) -> ApiResult<WorkspaceRow> {
		workspace::read(&self.dbr, ws).await
	}

	async fn claim_workspace(&self, ws: WsRid, email: &str) -> ApiResult<WorkspaceRow> {
		workspace::claim(&self.db, ws, email).await
	}

	async fn read_workspace_settings(&self, ws: WsRid) -> ApiResult<DocSettings> {
		workspace::read_settings(&self.dbr, ws).await
	}

	async fn update_workspace_settings(
		&self,
		ws: WsRid,
		patch: &DocSettingsPatch,
	) -> ApiResult<DocSettings> {
		workspace::update_settings(&self.db, ws, patch).await
	}

	// Capability keys
	//*****************
	async fn create_key(&self, ws: WsRid, opts: &CreateKeyOptions<'_>) -> ApiResult<KeyRecord> {
		key::create(&self.db, ws, opts).await
	}

	async fn resolve_key(&self, key_hash: &str) -> ApiResult<Option<KeyRecord>> {
		key::resolve(&self.dbr, key_hash).await
	}

	async fn list_keys(&self, ws: WsRid, include_revoked: bool) -> ApiResult<Vec<KeyRecord>> {
		key::list(&self.dbr, ws, include_revoked).await
	}

	async fn revoke_key(&self, ws: WsRid, key_id: i64) -> ApiResult<()> {
		key::revoke(&self.db, ws, key_id).await
	}

	async fn revoke_file_keys(&self, ws: WsRid, path: &str) -> ApiResult<u32> {
		key::revoke_file_keys(&self.db, ws, path).await
	}

	// Files
	//*******
	async fn put_file(
		&self,
		ws: WsRid,
		path: &str,
		content: &str,
		etag: &str,
		if_match: Option<&str>,
		now: Timestamp,
	) -> ApiResult<PutFileOutcome> {
		file::put(&self.db, ws, path, content, etag, if_match, now).await
	}

	async fn read_file(&self, ws: WsRid, path: &str) -> ApiResult<FileRow> {
		file::read(&self.dbr, ws, path).await
	}

	async fn soft_delete_file(
		&self,
		ws: WsRid,
		path: &str,
		delete_expires_at: Timestamp,
	) -> ApiResult<FileRow> {
		file::soft_delete(&self.db, ws, path, delete_expires_at).await
	}

	async fn purge_file(&self, ws: WsRid, path: &str) -> ApiResult<()> {
		file::purge(&self.db, ws, path).await
	}

	async fn recover_file(&self, ws: WsRid, path: &str) -> ApiResult<FileRow> {
		file::recover(&self.db, ws, path).await
	}

	async fn rename_file(
		&self,
		ws: WsRid,
		path: &str,
		new_filename: &str,
		now: Timestamp,
	) -> ApiResult<FileRow> {
		let (folder, _) = mdvault::core::path::split(path);
		let dest = mdvault::core::path::join(folder, new_filename);
		if dest == path {
			return file::read(&self.db, ws, path).await;
		}
		file::relocate(&self.db, ws, path, &dest, now).await
	}

	async fn move_file(
		&self,
		ws: WsRid,
		source: &str,
		dest_path: &str,
		now: Timestamp,
	) -> ApiResult<FileRow> {
		file::relocate(&self.db, ws, source, dest_path, now).await
	}

	async fn update_file_settings(
		&self,
		ws: WsRid,
		path: &str,
		patch: &DocSettingsPatch,
	) -> ApiResult<DocSettings> {
		file::update_settings(&self.db, ws, path, patch).await
	}

	// Appends
	//*********
	async fn list_appends(&self, ws: WsRid, path: &str) -> ApiResult<(FileRow, Vec<AppendRow>)> {
		append::list(&self.dbr, ws, path).await
	}

	async fn read_append(&self, ws: WsRid, path: &str, seq: i64) -> ApiResult<AppendRow> {
		append::read_one(&self.dbr, ws, path, seq).await
	}

	async fn append_batch(
		&self,
		ws: WsRid,
		path: &str,
		inputs: &[AppendInput],
		ctx: &AppendContext,
	) -> ApiResult<AppendOutcome> {
		append::batch(&self.db, ws, path, inputs, ctx).await
	}

	// Folders
	//*********
	async fn list_folder(&self, ws: WsRid, folder: &str, limit: u32) -> ApiResult<FolderListing> {
		file::list_folder(&self.dbr, ws, folder, limit).await
	}

	async fn create_folder(&self, ws: WsRid, path: &str, now: Timestamp) -> ApiResult<()> {
		file::create_folder(&self.db, ws, path, now).await
	}

	async fn folder_stats(&self, ws: WsRid, folder: &str) -> ApiResult<FolderStats> {
		file::stats(&self.dbr, ws, folder).await
	}

	async fn search_files(
		&self,
		ws: WsRid,
		folder: &str,
		q: &str,
		limit: u32,
	) -> ApiResult<Vec<SearchHit>> {
		file::search(&self.dbr, ws, folder, q, limit).await
	}

	async fn list_files_recursive(&self, ws: WsRid, folder: &str) -> ApiResult<Vec<FileRow>> {
		file::list_recursive(&self.dbr, ws, folder).await
	}

	async fn cascade_delete_folder(
		&self,
		ws: WsRid,
		folder: &str,
		delete_expires_at: Timestamp,
	) -> ApiResult<u32> {
		file::cascade_delete(&self.db, ws, folder, delete_expires_at).await
	}

	async fn delete_empty_folder(&self, ws: WsRid, folder: &str) -> ApiResult<()> {
		file::delete_empty(&self.db, ws, folder).await
	}

	async fn rename_folder(
		&self,
		ws: WsRid,
		folder: &str,
		new_folder: &str,
		now: Timestamp,
	) -> ApiResult<u32> {
		file::rename_folder(&self.db, ws, folder, new_folder, now).await
	}

	// Webhooks
	//**********
	async fn create_webhook(&self, ws: WsRid, opts: &NewWebhook<'_>) -> ApiResult<WebhookRow> {
		webhook::create(&self.db, ws, opts).await
	}

	async fn list_webhooks(&self, ws: WsRid) -> ApiResult<Vec<WebhookRow>> {
		webhook::list(&self.dbr, ws).await
	}

	async fn delete_webhook(&self, ws: WsRid, webhook_id: &str) -> ApiResult<()> {
		webhook::delete(&self.db, ws, webhook_id).await
	}

	// Idempotency
	//*************
	async fn read_idempotency(
		&self,
		ws: WsRid,
		route: &str,
		key: &str,
	) -> ApiResult<Option<IdempotencyRow>> {
		idempotency::read(&self.dbr, ws, route, key).await
	}

	async fn store_idempotency(
		&self,
		ws: WsRid,
		route: &str,
		key: &str,
		digest: &str,
		status: u16,
		body: &str,
		now: Timestamp,
	) -> ApiResult<()> {
		idempotency::store(&self.db, ws, route, key, digest, status, body, now).await
	}

	// Maintenance
	//*************
	async fn purge_expired_files(&self, now: Timestamp) -> ApiResult<u64> {
		idempotency::purge_expired_files(&self.db, now).await
	}

	async fn purge_idempotency_records(&self, older_than: Timestamp) -> ApiResult<u64> {
		idempotency::purge_older_than(&self.db, older_than).await
	}
}

// vim: ts=4
