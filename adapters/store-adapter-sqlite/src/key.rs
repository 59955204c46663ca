//! Capability key persistence

use sqlx::SqlitePool;

use mdvault::prelude::*;
use mdvault::store_adapter::{CreateKeyOptions, KeyRecord};

use crate::utils::*;

const KEY_COLUMNS: &str = "k.key_id, k.ws_rid, w.workspace_id, k.prefix, k.permission,
	k.scope_type, k.scope_path, k.bound_author, k.wip_limit, k.allowed_types,
	k.display_name, k.created_at, k.expires_at, k.revoked_at";

pub(crate) async fn create(
	db: &SqlitePool,
	ws: WsRid,
	opts: &CreateKeyOptions<'_>,
) -> ApiResult<KeyRecord> {
	let allowed = match opts.allowed_types {
		Some(types) => Some(serde_json::to_string(types).map_err(|_| Error::DbError)?),
		None => None,
	};

	let key_id: i64 = sqlx::query_scalar(
		"INSERT INTO keys (ws_rid, prefix, key_hash, permission, scope_type, scope_path,
			bound_author, wip_limit, allowed_types, display_name, created_at, expires_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
		RETURNING key_id",
	)
	.bind(ws.0)
	.bind(opts.prefix)
	.bind(opts.key_hash)
	.bind(opts.permission.as_str())
	.bind(opts.scope_type.as_str())
	.bind(opts.scope_path)
	.bind(opts.bound_author)
	.bind(opts.wip_limit.map(i64::from))
	.bind(allowed)
	.bind(opts.display_name)
	.bind(Timestamp::now().0)
	.bind(opts.expires_at.map(|t| t.0))
	.fetch_one(db)
	.await
	.map_err(db_err)?;

	read(db, ws, key_id).await
}

async fn read(db: &SqlitePool, ws: WsRid, key_id: i64) -> ApiResult<KeyRecord> {
	let row = sqlx::query(&format!(
		"SELECT {KEY_COLUMNS} FROM keys k
		JOIN workspaces w ON w.ws_rid = k.ws_rid
		WHERE k.ws_rid = ? AND k.key_id = ?"
	))
	.bind(ws.0)
	.bind(key_id)
	.fetch_optional(db)
	.await
	.map_err(db_err)?
	.ok_or(Error::NotFound)?;
	key_from_row(&row).map_err(db_err)
}

pub(crate) async fn resolve(db: &SqlitePool, key_hash: &str) -> ApiResult<Option<KeyRecord>> {
	let row = sqlx::query(&format!(
		"SELECT {KEY_COLUMNS} FROM keys k
		JOIN workspaces w ON w.ws_rid = k.ws_rid
		WHERE k.key_hash = ?"
	))
	.bind(key_hash)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => Ok(Some(key_from_row(&row).map_err(db_err)?)),
		None => Ok(None),
	}
}

pub(crate) async fn list(
	db: &SqlitePool,
	ws: WsRid,
	include_revoked: bool,
) -> ApiResult<Vec<KeyRecord>> {
	let mut sql = format!(
		"SELECT {KEY_COLUMNS} FROM keys k
		JOIN workspaces w ON w.ws_rid = k.ws_rid
		WHERE k.ws_rid = ?"
	);
	if !include_revoked {
		sql.push_str(" AND k.revoked_at IS NULL");
	}
	sql.push_str(" ORDER BY k.created_at DESC, k.key_id DESC");

	let rows = sqlx::query(&sql).bind(ws.0).fetch_all(db).await.map_err(db_err)?;
	rows.iter().map(|row| key_from_row(row).map_err(db_err)).collect()
}

pub(crate) async fn revoke(db: &SqlitePool, ws: WsRid, key_id: i64) -> ApiResult<()> {
	let result = sqlx::query(
		"UPDATE keys SET revoked_at = ? WHERE ws_rid = ? AND key_id = ? AND revoked_at IS NULL",
	)
	.bind(Timestamp::now().0)
	.bind(ws.0)
	.bind(key_id)
	.execute(db)
	.await
	.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Revoke every live key scoped to exactly this file path
pub(crate) async fn revoke_file_keys(db: &SqlitePool, ws: WsRid, path: &str) -> ApiResult<u32> {
	let result = sqlx::query(
		"UPDATE keys SET revoked_at = ?
		WHERE ws_rid = ? AND scope_type = 'file' AND scope_path = ? AND revoked_at IS NULL",
	)
	.bind(Timestamp::now().0)
	.bind(ws.0)
	.bind(path)
	.execute(db)
	.await
	.map_err(db_err)?;

	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

// vim: ts=4
