//! Webhook registration persistence

use sqlx::SqlitePool;

use mdvault::prelude::*;
use mdvault::store_adapter::{NewWebhook, WebhookRow};

use crate::utils::*;

pub(crate) async fn create(
	db: &SqlitePool,
	ws: WsRid,
	opts: &NewWebhook<'_>,
) -> ApiResult<WebhookRow> {
	let events = serde_json::to_string(opts.events).map_err(|_| Error::DbError)?;
	let filter_authors = match opts.filter_authors {
		Some(authors) => Some(serde_json::to_string(authors).map_err(|_| Error::DbError)?),
		None => None,
	};
	let filter_types = match opts.filter_append_types {
		Some(types) => Some(serde_json::to_string(types).map_err(|_| Error::DbError)?),
		None => None,
	};

	sqlx::query(
		"INSERT INTO webhooks (webhook_id, ws_rid, scope_type, scope_path, url, events,
			filter_authors, filter_append_types, recursive, include_urls, secret, status,
			created_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)",
	)
	.bind(opts.webhook_id)
	.bind(ws.0)
	.bind(opts.scope_type.as_str())
	.bind(opts.scope_path)
	.bind(opts.url)
	.bind(&events)
	.bind(filter_authors)
	.bind(filter_types)
	.bind(opts.recursive as i64)
	.bind(opts.include_urls as i64)
	.bind(opts.secret)
	.bind(Timestamp::now().0)
	.execute(db)
	.await
	.map_err(db_err)?;

	read(db, ws, opts.webhook_id).await
}

async fn read(db: &SqlitePool, ws: WsRid, webhook_id: &str) -> ApiResult<WebhookRow> {
	let row = sqlx::query("SELECT * FROM webhooks WHERE ws_rid = ? AND webhook_id = ?")
		.bind(ws.0)
		.bind(webhook_id)
		.fetch_optional(db)
		.await
		.map_err(db_err)?
		.ok_or(Error::WebhookNotFound)?;
	webhook_from_row(&row).map_err(db_err)
}

pub(crate) async fn list(db: &SqlitePool, ws: WsRid) -> ApiResult<Vec<WebhookRow>> {
	let rows = sqlx::query("SELECT * FROM webhooks WHERE ws_rid = ? ORDER BY created_at")
		.bind(ws.0)
		.fetch_all(db)
		.await
		.map_err(db_err)?;
	rows.iter().map(|row| webhook_from_row(row).map_err(db_err)).collect()
}

pub(crate) async fn delete(db: &SqlitePool, ws: WsRid, webhook_id: &str) -> ApiResult<()> {
	let result = sqlx::query("DELETE FROM webhooks WHERE ws_rid = ? AND webhook_id = ?")
		.bind(ws.0)
		.bind(webhook_id)
		.execute(db)
		.await
		.map_err(db_err)?;

	if result.rows_affected() == 0 {
		return Err(Error::WebhookNotFound);
	}
	Ok(())
}

// vim: ts=4
