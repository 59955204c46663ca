//! Append log persistence.
//!
//! The interesting part is `batch`: sequence allocation bumps the file's
//! counter with `UPDATE … RETURNING`, which takes SQLite's write lock before
//! any state is read. Everything after that - loading the log, running the
//! pure planner, applying the plan - happens against a stable view, and a
//! planner rejection rolls the whole batch back, counter included. That is
//! what keeps sequence numbers gap-free and claims linearizable.

use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use mdvault::append::engine::plan;
use mdvault::prelude::*;
use mdvault::store_adapter::{
	AppendContext, AppendInput, AppendOutcome, AppendRow, AppendType, FileRow,
};

use crate::utils::*;

pub(crate) async fn list(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
) -> ApiResult<(FileRow, Vec<AppendRow>)> {
	let file = crate::file::read(db, ws, path).await?;
	let rows = sqlx::query("SELECT * FROM appends WHERE file_rid = ? ORDER BY seq")
		.bind(file.file_rid)
		.fetch_all(db)
		.await
		.map_err(db_err)?;
	let appends =
		rows.iter().map(|row| append_from_row(row).map_err(db_err)).collect::<ApiResult<_>>()?;
	Ok((file, appends))
}

pub(crate) async fn read_one(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	seq: i64,
) -> ApiResult<AppendRow> {
	let file = crate::file::read(db, ws, path).await?;
	let row = sqlx::query("SELECT * FROM appends WHERE file_rid = ? AND seq = ?")
		.bind(file.file_rid)
		.bind(seq)
		.fetch_optional(db)
		.await
		.map_err(db_err)?
		.ok_or(Error::AppendNotFound)?;
	append_from_row(&row).map_err(db_err)
}

/// Active claims held by `author` on live files within the key's scope.
/// Runs inside the batch transaction, once per distinct claiming author in
/// the batch, so the WIP check and the insert are one atomic step.
async fn count_active_claims(
	tx: &mut sqlx::SqliteConnection,
	ws: WsRid,
	author: &str,
	scope: &str,
	now: Timestamp,
) -> ApiResult<u32> {
	let (exact, prefix) = prefix_bounds(scope);
	let count: i64 = sqlx::query_scalar(
		"SELECT COUNT(*) FROM appends a
		JOIN files f ON f.file_rid = a.file_rid
		WHERE f.ws_rid = ? AND f.deleted_at IS NULL
			AND a.type = 'claim' AND a.status = 'active'
			AND a.author = ? AND a.expires_at > ?
			AND (? = '/' OR f.path = ? OR substr(f.path, 1, length(?)) = ?)",
	)
	.bind(ws.0)
	.bind(author)
	.bind(now.0)
	.bind(scope)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_one(&mut *tx)
	.await
	.map_err(db_err)?;
	Ok(count.max(0) as u32)
}

pub(crate) async fn batch(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	inputs: &[AppendInput],
	ctx: &AppendContext,
) -> ApiResult<AppendOutcome> {
	if inputs.is_empty() {
		return Err(Error::InvalidRequest("no appends given".into()));
	}
	let mut tx = db.begin().await.map_err(db_err)?;

	// counter bump first: takes the write lock and allocates the sequence
	// range in one statement
	let bumped = sqlx::query(
		"UPDATE files SET append_counter = append_counter + ?
		WHERE ws_rid = ? AND path = ? AND deleted_at IS NULL AND marker = 0
		RETURNING file_rid, append_counter",
	)
	.bind(inputs.len() as i64)
	.bind(ws.0)
	.bind(path)
	.fetch_optional(&mut *tx)
	.await
	.map_err(db_err)?;

	let Some(bumped) = bumped else {
		drop(tx);
		// distinguish deleted from missing for the error surface
		return match crate::file::read(db, ws, path).await {
			Ok(_) => Err(Error::DbError),
			Err(err) => Err(err),
		};
	};
	let file_rid: i64 = bumped.try_get("file_rid").map_err(db_err)?;
	let counter: i64 = bumped.try_get("append_counter").map_err(db_err)?;
	let next_seq = counter - inputs.len() as i64 + 1;

	let rows = sqlx::query("SELECT * FROM appends WHERE file_rid = ? ORDER BY seq")
		.bind(file_rid)
		.fetch_all(&mut *tx)
		.await
		.map_err(db_err)?;
	let existing: Vec<AppendRow> =
		rows.iter().map(|row| append_from_row(row).map_err(db_err)).collect::<ApiResult<_>>()?;

	// WIP is enforced per claiming author; a batch may carry several
	let mut active_claims: BTreeMap<Box<str>, u32> = BTreeMap::new();
	if ctx.wip_limit.is_some() {
		for claim in inputs.iter().filter(|i| i.typ == AppendType::Claim) {
			if active_claims.contains_key(&claim.author) {
				continue;
			}
			let count =
				count_active_claims(&mut *tx, ws, &claim.author, &ctx.wip_scope, ctx.now)
					.await?;
			active_claims.insert(claim.author.clone(), count);
		}
	}

	// any planner rejection rolls back the counter bump with the transaction
	let planned = plan(&existing, inputs, ctx, next_seq, &active_claims)?;

	for item in &planned.items {
		let labels = match &item.labels {
			Some(labels) => {
				Some(serde_json::to_string(labels.as_ref()).map_err(|_| Error::DbError)?)
			}
			None => None,
		};
		sqlx::query(
			"INSERT INTO appends (file_rid, seq, parent_ref, author, type, status,
				priority, labels, content, expires_at, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(file_rid)
		.bind(item.seq)
		.bind(item.parent_ref)
		.bind(item.author.as_ref())
		.bind(item.typ.as_str())
		.bind(item.status)
		.bind(item.priority.as_deref())
		.bind(labels)
		.bind(item.content.as_deref())
		.bind(item.expires_at.map(|t| t.0))
		.bind(ctx.now.0)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}

	for update in &planned.updates {
		sqlx::query(
			"UPDATE appends SET
				status = COALESCE(?, status),
				expires_at = COALESCE(?, expires_at)
			WHERE file_rid = ? AND seq = ?",
		)
		.bind(update.set_status)
		.bind(update.set_expires_at.map(|t| t.0))
		.bind(file_rid)
		.bind(update.seq)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}

	tx.commit().await.map_err(db_err)?;

	let file = crate::file::read(db, ws, path).await?;
	let inserted = sqlx::query("SELECT * FROM appends WHERE file_rid = ? AND seq >= ? ORDER BY seq")
		.bind(file_rid)
		.bind(next_seq)
		.fetch_all(db)
		.await
		.map_err(db_err)?;
	let rows: Vec<AppendRow> = inserted
		.iter()
		.map(|row| append_from_row(row).map_err(db_err))
		.collect::<ApiResult<_>>()?;

	Ok(AppendOutcome { file, rows, events: planned.events })
}

// vim: ts=4
