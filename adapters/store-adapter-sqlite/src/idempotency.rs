//! Idempotency records and maintenance sweeps

use sqlx::{Row, SqlitePool};

use mdvault::prelude::*;
use mdvault::store_adapter::IdempotencyRow;

use crate::utils::*;

pub(crate) async fn read(
	db: &SqlitePool,
	ws: WsRid,
	route: &str,
	key: &str,
) -> ApiResult<Option<IdempotencyRow>> {
	let row = sqlx::query(
		"SELECT request_digest, response_status, response_body FROM idempotency
		WHERE ws_rid = ? AND route = ? AND idem_key = ?",
	)
	.bind(ws.0)
	.bind(route)
	.bind(key)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => Ok(Some(IdempotencyRow {
			request_digest: row.try_get::<String, _>("request_digest").map_err(db_err)?.into(),
			response_status: row
				.try_get::<i64, _>("response_status")
				.map_err(db_err)?
				.clamp(100, 599) as u16,
			response_body: row.try_get::<String, _>("response_body").map_err(db_err)?.into(),
		})),
		None => Ok(None),
	}
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn store(
	db: &SqlitePool,
	ws: WsRid,
	route: &str,
	key: &str,
	digest: &str,
	status: u16,
	body: &str,
	now: Timestamp,
) -> ApiResult<()> {
	// write-once: a concurrent duplicate keeps the first snapshot
	sqlx::query(
		"INSERT INTO idempotency (ws_rid, route, idem_key, request_digest, response_status,
			response_body, created_at)
		VALUES (?, ?, ?, ?, ?, ?, ?)
		ON CONFLICT(ws_rid, route, idem_key) DO NOTHING",
	)
	.bind(ws.0)
	.bind(route)
	.bind(key)
	.bind(digest)
	.bind(i64::from(status))
	.bind(body)
	.bind(now.0)
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn purge_older_than(db: &SqlitePool, cutoff: Timestamp) -> ApiResult<u64> {
	let result = sqlx::query("DELETE FROM idempotency WHERE created_at < ?")
		.bind(cutoff.0)
		.execute(db)
		.await
		.map_err(db_err)?;
	Ok(result.rows_affected())
}

/// Soft-deleted files whose retention has lapsed are removed for good
pub(crate) async fn purge_expired_files(db: &SqlitePool, now: Timestamp) -> ApiResult<u64> {
	let mut tx = db.begin().await.map_err(db_err)?;

	sqlx::query(
		"DELETE FROM appends WHERE file_rid IN (
			SELECT file_rid FROM files
			WHERE deleted_at IS NOT NULL AND delete_expires_at IS NOT NULL
				AND delete_expires_at < ?
		)",
	)
	.bind(now.0)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	let result = sqlx::query(
		"DELETE FROM files
		WHERE deleted_at IS NOT NULL AND delete_expires_at IS NOT NULL
			AND delete_expires_at < ?",
	)
	.bind(now.0)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	Ok(result.rows_affected())
}

// vim: ts=4
