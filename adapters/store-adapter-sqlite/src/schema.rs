//! Database schema initialization.
//!
//! Creates tables and indexes idempotently inside one transaction at adapter
//! startup.

use sqlx::SqlitePool;

pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Workspaces
	//************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS workspaces (
		ws_rid integer PRIMARY KEY AUTOINCREMENT,
		workspace_id text NOT NULL UNIQUE,
		name text,
		created_at integer NOT NULL,
		claimed_at integer,
		claimed_by_email text
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS workspace_settings (
		ws_rid integer NOT NULL,
		settings text NOT NULL DEFAULT '{}',
		PRIMARY KEY(ws_rid)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Capability keys
	//*****************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS keys (
		key_id integer PRIMARY KEY AUTOINCREMENT,
		ws_rid integer NOT NULL,
		prefix text NOT NULL,
		key_hash text NOT NULL,
		permission text NOT NULL,
		scope_type text NOT NULL,
		scope_path text NOT NULL,
		bound_author text,
		wip_limit integer,
		allowed_types text,
		display_name text,
		created_at integer NOT NULL,
		expires_at integer,
		revoked_at integer
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_keys_hash ON keys(key_hash)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_keys_ws ON keys(ws_rid)")
		.execute(&mut *tx)
		.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_keys_scope ON keys(ws_rid, scope_type, scope_path)",
	)
	.execute(&mut *tx)
	.await?;

	// Files
	//*******
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS files (
		file_rid integer PRIMARY KEY AUTOINCREMENT,
		ws_rid integer NOT NULL,
		path text NOT NULL,
		filename text NOT NULL,
		folder text NOT NULL,
		content text NOT NULL DEFAULT '',
		etag text NOT NULL,
		size integer NOT NULL DEFAULT 0,
		created_at integer NOT NULL,
		updated_at integer NOT NULL,
		deleted_at integer,
		delete_expires_at integer,
		settings text NOT NULL DEFAULT '{}',
		append_counter integer NOT NULL DEFAULT 0,
		marker integer NOT NULL DEFAULT 0
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_files_ws_path ON files(ws_rid, path)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_ws_folder ON files(ws_rid, folder)")
		.execute(&mut *tx)
		.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_files_reaper ON files(deleted_at, delete_expires_at)",
	)
	.execute(&mut *tx)
	.await?;

	// Appends
	//*********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS appends (
		append_rid integer PRIMARY KEY AUTOINCREMENT,
		file_rid integer NOT NULL,
		seq integer NOT NULL,
		parent_ref integer,
		author text NOT NULL,
		type text NOT NULL,
		status text,
		priority text,
		labels text,
		content text,
		expires_at integer,
		created_at integer NOT NULL
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_appends_file_seq ON appends(file_rid, seq)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_appends_claims
			ON appends(type, status, author, expires_at)",
	)
	.execute(&mut *tx)
	.await?;

	// Webhooks
	//**********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS webhooks (
		webhook_rid integer PRIMARY KEY AUTOINCREMENT,
		webhook_id text NOT NULL UNIQUE,
		ws_rid integer NOT NULL,
		scope_type text NOT NULL,
		scope_path text NOT NULL,
		url text NOT NULL,
		events text NOT NULL,
		filter_authors text,
		filter_append_types text,
		recursive integer NOT NULL DEFAULT 1,
		include_urls integer NOT NULL DEFAULT 0,
		secret text NOT NULL,
		status text NOT NULL DEFAULT 'active',
		created_at integer NOT NULL
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_webhooks_ws ON webhooks(ws_rid)")
		.execute(&mut *tx)
		.await?;

	// Idempotency records
	//*********************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS idempotency (
		ws_rid integer NOT NULL,
		route text NOT NULL,
		idem_key text NOT NULL,
		request_digest text NOT NULL,
		response_status integer NOT NULL,
		response_body text NOT NULL,
		created_at integer NOT NULL,
		PRIMARY KEY(ws_rid, route, idem_key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await
}

// vim: ts=4
