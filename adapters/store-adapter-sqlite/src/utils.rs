//! Row mapping helpers shared across the adapter modules.

use sqlx::{sqlite::SqliteRow, Row};

use mdvault::prelude::*;
use mdvault::store_adapter::{
	AppendRow, AppendType, DocSettings, FileRow, KeyRecord, Permission, ScopeType, WebhookRow,
	WebhookStatus,
};

pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

pub(crate) fn db_err(err: sqlx::Error) -> Error {
	inspect(&err);
	Error::DbError
}

pub(crate) fn parse_settings(raw: &str) -> DocSettings {
	serde_json::from_str(raw).unwrap_or_else(|err| {
		warn!("unparseable settings row ({}), using defaults", err);
		DocSettings::default()
	})
}

pub(crate) fn parse_json_list(raw: Option<&str>) -> Option<Box<[Box<str>]>> {
	let raw = raw?;
	serde_json::from_str::<Vec<Box<str>>>(raw).ok().map(Vec::into_boxed_slice)
}

pub(crate) fn parse_type_list(raw: Option<&str>) -> Option<Box<[AppendType]>> {
	let raw = raw?;
	serde_json::from_str::<Vec<AppendType>>(raw).ok().map(Vec::into_boxed_slice)
}

pub(crate) fn file_from_row(row: &SqliteRow) -> Result<FileRow, sqlx::Error> {
	let settings: String = row.try_get("settings")?;
	Ok(FileRow {
		file_rid: row.try_get("file_rid")?,
		ws: WsRid(row.try_get("ws_rid")?),
		path: row.try_get::<String, _>("path")?.into(),
		filename: row.try_get::<String, _>("filename")?.into(),
		folder: row.try_get::<String, _>("folder")?.into(),
		content: row.try_get::<String, _>("content")?.into(),
		etag: row.try_get::<String, _>("etag")?.into(),
		size: row.try_get("size")?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
		deleted_at: row.try_get::<Option<i64>, _>("deleted_at")?.map(Timestamp),
		delete_expires_at: row.try_get::<Option<i64>, _>("delete_expires_at")?.map(Timestamp),
		settings: parse_settings(&settings),
		append_count: row.try_get("append_counter")?,
		marker: row.try_get::<i64, _>("marker")? != 0,
	})
}

pub(crate) fn append_from_row(row: &SqliteRow) -> Result<AppendRow, sqlx::Error> {
	let typ_raw: String = row.try_get("type")?;
	let typ = AppendType::parse(&typ_raw).unwrap_or(AppendType::Comment);
	let labels: Option<String> = row.try_get("labels")?;
	Ok(AppendRow {
		seq: row.try_get("seq")?,
		parent_ref: row.try_get("parent_ref")?,
		author: row.try_get::<String, _>("author")?.into(),
		typ,
		status: row.try_get::<Option<String>, _>("status")?.map(Into::into),
		priority: row.try_get::<Option<String>, _>("priority")?.map(Into::into),
		labels: parse_json_list(labels.as_deref()),
		content: row.try_get::<Option<String>, _>("content")?.map(Into::into),
		expires_at: row.try_get::<Option<i64>, _>("expires_at")?.map(Timestamp),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

pub(crate) fn key_from_row(row: &SqliteRow) -> Result<KeyRecord, sqlx::Error> {
	let permission_raw: String = row.try_get("permission")?;
	let scope_type_raw: String = row.try_get("scope_type")?;
	let allowed: Option<String> = row.try_get("allowed_types")?;
	Ok(KeyRecord {
		key_id: row.try_get("key_id")?,
		ws: WsRid(row.try_get("ws_rid")?),
		workspace_id: row.try_get::<String, _>("workspace_id")?.into(),
		prefix: row.try_get::<String, _>("prefix")?.into(),
		permission: Permission::parse(&permission_raw).unwrap_or(Permission::Read),
		scope_type: ScopeType::parse(&scope_type_raw).unwrap_or(ScopeType::Workspace),
		scope_path: row.try_get::<String, _>("scope_path")?.into(),
		bound_author: row.try_get::<Option<String>, _>("bound_author")?.map(Into::into),
		wip_limit: row.try_get::<Option<i64>, _>("wip_limit")?.map(|v| v.max(0) as u32),
		allowed_types: parse_type_list(allowed.as_deref()),
		display_name: row.try_get::<Option<String>, _>("display_name")?.map(Into::into),
		created_at: Timestamp(row.try_get("created_at")?),
		expires_at: row.try_get::<Option<i64>, _>("expires_at")?.map(Timestamp),
		revoked_at: row.try_get::<Option<i64>, _>("revoked_at")?.map(Timestamp),
	})
}

pub(crate) fn webhook_from_row(row: &SqliteRow) -> Result<WebhookRow, sqlx::Error> {
	let scope_type_raw: String = row.try_get("scope_type")?;
	let status_raw: String = row.try_get("status")?;
	let events: String = row.try_get("events")?;
	let filter_authors: Option<String> = row.try_get("filter_authors")?;
	let filter_types: Option<String> = row.try_get("filter_append_types")?;
	Ok(WebhookRow {
		webhook_id: row.try_get::<String, _>("webhook_id")?.into(),
		ws: WsRid(row.try_get("ws_rid")?),
		scope_type: ScopeType::parse(&scope_type_raw).unwrap_or(ScopeType::Workspace),
		scope_path: row.try_get::<String, _>("scope_path")?.into(),
		url: row.try_get::<String, _>("url")?.into(),
		events: parse_json_list(Some(&events)).unwrap_or_default(),
		filter_authors: parse_json_list(filter_authors.as_deref()),
		filter_append_types: parse_type_list(filter_types.as_deref()),
		recursive: row.try_get::<i64, _>("recursive")? != 0,
		include_urls: row.try_get::<i64, _>("include_urls")? != 0,
		secret: row.try_get::<String, _>("secret")?.into(),
		status: if status_raw == "disabled" {
			WebhookStatus::Disabled
		} else {
			WebhookStatus::Active
		},
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

/// `path == base` or `path` under `base`, as SQL condition fragments.
/// Returns `(exact, prefix)` bind values for
/// `(path = ? OR substr(path, 1, length(?)) = ?)`.
pub(crate) fn prefix_bounds(base: &str) -> (String, String) {
	let prefix = if base == "/" { "/".to_string() } else { format!("{}/", base) };
	(base.to_string(), prefix)
}

// vim: ts=4
