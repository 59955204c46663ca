//! Workspace rows and workspace-level settings

use sqlx::{Row, SqlitePool};

use mdvault::prelude::*;
use mdvault::store_adapter::{DocSettings, DocSettingsPatch, WorkspaceRow};

use crate::utils::*;

fn workspace_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceRow, sqlx::Error> {
	Ok(WorkspaceRow {
		ws: WsRid(row.try_get("ws_rid")?),
		workspace_id: row.try_get::<String, _>("workspace_id")?.into(),
		name: row.try_get::<Option<String>, _>("name")?.map(Into::into),
		created_at: Timestamp(row.try_get("created_at")?),
		claimed_at: row.try_get::<Option<i64>, _>("claimed_at")?.map(Timestamp),
		claimed_by_email: row.try_get::<Option<String>, _>("claimed_by_email")?.map(Into::into),
	})
}

pub(crate) async fn create(
	db: &SqlitePool,
	workspace_id: &str,
	name: Option<&str>,
) -> ApiResult<WsRid> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let ws_rid: i64 = sqlx::query_scalar(
		"INSERT INTO workspaces (workspace_id, name, created_at)
		VALUES (?, ?, ?) RETURNING ws_rid",
	)
	.bind(workspace_id)
	.bind(name)
	.bind(Timestamp::now().0)
	.fetch_one(&mut *tx)
	.await
	.map_err(db_err)?;

	sqlx::query("INSERT INTO workspace_settings (ws_rid, settings) VALUES (?, '{}')")
		.bind(ws_rid)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	Ok(WsRid(ws_rid))
}

pub(crate) async fn read(db: &SqlitePool, ws: WsRid) -> ApiResult<WorkspaceRow> {
	let row = sqlx::query("SELECT * FROM workspaces WHERE ws_rid = ?")
		.bind(ws.0)
		.fetch_optional(db)
		.await
		.map_err(db_err)?
		.ok_or(Error::NotFound)?;
	workspace_from_row(&row).map_err(db_err)
}

/// One-way transition; losers of a race observe the existing claim
pub(crate) async fn claim(db: &SqlitePool, ws: WsRid, email: &str) -> ApiResult<WorkspaceRow> {
	let row = sqlx::query(
		"UPDATE workspaces SET claimed_at = ?, claimed_by_email = ?
		WHERE ws_rid = ? AND claimed_at IS NULL
		RETURNING *",
	)
	.bind(Timestamp::now().0)
	.bind(email)
	.bind(ws.0)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => workspace_from_row(&row).map_err(db_err),
		None => {
			// no unclaimed row: either already claimed or missing entirely
			let existing = read(db, ws).await?;
			if existing.claimed_at.is_some() {
				Err(Error::WorkspaceAlreadyClaimed)
			} else {
				Err(Error::NotFound)
			}
		}
	}
}

pub(crate) async fn read_settings(db: &SqlitePool, ws: WsRid) -> ApiResult<DocSettings> {
	let raw: Option<String> =
		sqlx::query_scalar("SELECT settings FROM workspace_settings WHERE ws_rid = ?")
			.bind(ws.0)
			.fetch_optional(db)
			.await
			.map_err(db_err)?;
	Ok(raw.as_deref().map(parse_settings).unwrap_or_default())
}

pub(crate) async fn update_settings(
	db: &SqlitePool,
	ws: WsRid,
	patch: &DocSettingsPatch,
) -> ApiResult<DocSettings> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let raw: Option<String> =
		sqlx::query_scalar("SELECT settings FROM workspace_settings WHERE ws_rid = ?")
			.bind(ws.0)
			.fetch_optional(&mut *tx)
			.await
			.map_err(db_err)?;
	let current = raw.as_deref().map(parse_settings).unwrap_or_default();
	let updated = patch.apply(&current);
	let serialized = serde_json::to_string(&updated).map_err(|_| Error::DbError)?;

	sqlx::query(
		"INSERT INTO workspace_settings (ws_rid, settings) VALUES (?, ?)
		ON CONFLICT(ws_rid) DO UPDATE SET settings = excluded.settings",
	)
	.bind(ws.0)
	.bind(&serialized)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	Ok(updated)
}

// vim: ts=4
