//! File rows and the folder virtualization queries.
//!
//! Folders are prefix predicates over the flat file table, plus optional
//! marker rows (`marker=1`) for explicitly created, possibly empty folders.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeSet;

use mdvault::core::path as vpath;
use mdvault::prelude::*;
use mdvault::store_adapter::{
	DocSettings, DocSettingsPatch, FileRow, FolderFileInfo, FolderListing, FolderStats,
	PutFileOutcome, SearchHit,
};

use crate::utils::*;

async fn read_any(
	tx: &mut sqlx::SqliteConnection,
	ws: WsRid,
	path: &str,
) -> ApiResult<Option<FileRow>> {
	let row = sqlx::query("SELECT * FROM files WHERE ws_rid = ? AND path = ?")
		.bind(ws.0)
		.bind(path)
		.fetch_optional(&mut *tx)
		.await
		.map_err(db_err)?;
	match row {
		Some(row) => Ok(Some(file_from_row(&row).map_err(db_err)?)),
		None => Ok(None),
	}
}

fn live_or_error(file: FileRow) -> ApiResult<FileRow> {
	if file.marker {
		return Err(Error::FileNotFound);
	}
	if file.deleted_at.is_some() {
		return Err(Error::FileDeleted { expires_at: file.delete_expires_at });
	}
	Ok(file)
}

pub(crate) async fn read(db: &SqlitePool, ws: WsRid, path: &str) -> ApiResult<FileRow> {
	let mut conn = db.acquire().await.map_err(db_err)?;
	let file = read_any(&mut *conn, ws, path).await?.ok_or(Error::FileNotFound)?;
	live_or_error(file)
}

pub(crate) async fn put(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	content: &str,
	etag: &str,
	if_match: Option<&str>,
	now: Timestamp,
) -> ApiResult<PutFileOutcome> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let existing = read_any(&mut *tx, ws, path).await?;
	let outcome = match existing {
		Some(file) if file.marker => {
			return Err(Error::Conflict("a folder occupies this path".into()));
		}
		Some(file) if file.deleted_at.is_some() => {
			return Err(Error::FileDeleted { expires_at: file.delete_expires_at });
		}
		Some(file) => {
			if let Some(expected) = if_match {
				if expected != file.etag.as_ref() {
					return Err(Error::EtagMismatch);
				}
			}
			let row = sqlx::query(
				"UPDATE files SET content = ?, etag = ?, size = ?, updated_at = ?
				WHERE file_rid = ? RETURNING *",
			)
			.bind(content)
			.bind(etag)
			.bind(content.len() as i64)
			.bind(now.0)
			.bind(file.file_rid)
			.fetch_one(&mut *tx)
			.await
			.map_err(db_err)?;
			PutFileOutcome { file: file_from_row(&row).map_err(db_err)?, created: false }
		}
		None => {
			// If-Match against a missing file is a failed precondition
			if if_match.is_some() {
				return Err(Error::EtagMismatch);
			}
			let (folder, filename) = vpath::split(path);
			let row = sqlx::query(
				"INSERT INTO files (ws_rid, path, filename, folder, content, etag, size,
					created_at, updated_at)
				VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
			)
			.bind(ws.0)
			.bind(path)
			.bind(filename)
			.bind(folder)
			.bind(content)
			.bind(etag)
			.bind(content.len() as i64)
			.bind(now.0)
			.bind(now.0)
			.fetch_one(&mut *tx)
			.await
			.map_err(db_err)?;
			PutFileOutcome { file: file_from_row(&row).map_err(db_err)?, created: true }
		}
	};

	tx.commit().await.map_err(db_err)?;
	Ok(outcome)
}

pub(crate) async fn soft_delete(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	delete_expires_at: Timestamp,
) -> ApiResult<FileRow> {
	let row = sqlx::query(
		"UPDATE files SET deleted_at = ?, delete_expires_at = ?
		WHERE ws_rid = ? AND path = ? AND deleted_at IS NULL AND marker = 0
		RETURNING *",
	)
	.bind(Timestamp::now().0)
	.bind(delete_expires_at.0)
	.bind(ws.0)
	.bind(path)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;

	match row {
		Some(row) => file_from_row(&row).map_err(db_err),
		None => {
			let mut conn = db.acquire().await.map_err(db_err)?;
			match read_any(&mut *conn, ws, path).await? {
				Some(file) if !file.marker && file.deleted_at.is_some() => {
					Err(Error::FileDeleted { expires_at: file.delete_expires_at })
				}
				_ => Err(Error::FileNotFound),
			}
		}
	}
}

pub(crate) async fn purge(db: &SqlitePool, ws: WsRid, path: &str) -> ApiResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let file_rid: Option<i64> = sqlx::query_scalar(
		"SELECT file_rid FROM files WHERE ws_rid = ? AND path = ? AND marker = 0",
	)
	.bind(ws.0)
	.bind(path)
	.fetch_optional(&mut *tx)
	.await
	.map_err(db_err)?;
	let Some(file_rid) = file_rid else {
		return Err(Error::FileNotFound);
	};

	sqlx::query("DELETE FROM appends WHERE file_rid = ?")
		.bind(file_rid)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	sqlx::query("DELETE FROM files WHERE file_rid = ?")
		.bind(file_rid)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	tx.commit().await.map_err(db_err)
}

pub(crate) async fn recover(db: &SqlitePool, ws: WsRid, path: &str) -> ApiResult<FileRow> {
	let row = sqlx::query(
		"UPDATE files SET deleted_at = NULL, delete_expires_at = NULL
		WHERE ws_rid = ? AND path = ? AND deleted_at IS NOT NULL AND marker = 0
		RETURNING *",
	)
	.bind(ws.0)
	.bind(path)
	.fetch_optional(db)
	.await
	.map_err(db_err)?
	.ok_or(Error::FileNotFound)?;

	file_from_row(&row).map_err(db_err)
}

/// Shared by rename and move: relocate one live file and drag its
/// file-scoped keys and webhooks along, atomically.
pub(crate) async fn relocate(
	db: &SqlitePool,
	ws: WsRid,
	source: &str,
	dest: &str,
	now: Timestamp,
) -> ApiResult<FileRow> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let file = read_any(&mut *tx, ws, source).await?.ok_or(Error::FileNotFound)?;
	let file = live_or_error(file)?;

	let occupied: Option<i64> =
		sqlx::query_scalar("SELECT 1 FROM files WHERE ws_rid = ? AND path = ?")
			.bind(ws.0)
			.bind(dest)
			.fetch_optional(&mut *tx)
			.await
			.map_err(db_err)?;
	if occupied.is_some() {
		return Err(Error::Conflict("destination path already exists".into()));
	}

	let (folder, filename) = vpath::split(dest);
	let row = sqlx::query(
		"UPDATE files SET path = ?, filename = ?, folder = ?, updated_at = ?
		WHERE file_rid = ? RETURNING *",
	)
	.bind(dest)
	.bind(filename)
	.bind(folder)
	.bind(now.0)
	.bind(file.file_rid)
	.fetch_one(&mut *tx)
	.await
	.map_err(db_err)?;

	sqlx::query(
		"UPDATE keys SET scope_path = ?
		WHERE ws_rid = ? AND scope_type = 'file' AND scope_path = ?",
	)
	.bind(dest)
	.bind(ws.0)
	.bind(source)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;
	sqlx::query(
		"UPDATE webhooks SET scope_path = ?
		WHERE ws_rid = ? AND scope_type = 'file' AND scope_path = ?",
	)
	.bind(dest)
	.bind(ws.0)
	.bind(source)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	file_from_row(&row).map_err(db_err)
}

pub(crate) async fn update_settings(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	patch: &DocSettingsPatch,
) -> ApiResult<DocSettings> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let file = read_any(&mut *tx, ws, path).await?.ok_or(Error::FileNotFound)?;
	let file = live_or_error(file)?;

	let updated = patch.apply(&file.settings);
	let serialized = serde_json::to_string(&updated).map_err(|_| Error::DbError)?;
	sqlx::query("UPDATE files SET settings = ? WHERE file_rid = ?")
		.bind(&serialized)
		.bind(file.file_rid)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	Ok(updated)
}

// Folder queries //
//****************//

/// Distinct folder column values under a base (strictly below it)
async fn folders_below(db: &SqlitePool, ws: WsRid, base: &str) -> ApiResult<Vec<String>> {
	let (_, prefix) = prefix_bounds(base);
	let rows: Vec<String> = sqlx::query_scalar(
		"SELECT DISTINCT folder FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL AND folder != ?
			AND substr(folder, 1, length(?)) = ?",
	)
	.bind(ws.0)
	.bind(base)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_all(db)
	.await
	.map_err(db_err)?;
	Ok(rows)
}

async fn folder_exists(db: &SqlitePool, ws: WsRid, folder: &str) -> ApiResult<bool> {
	if folder == "/" {
		return Ok(true);
	}
	let (_, prefix) = prefix_bounds(folder);
	let found: Option<i64> = sqlx::query_scalar(
		"SELECT 1 FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL
			AND (path = ? AND marker = 1 OR substr(path, 1, length(?)) = ?)
		LIMIT 1",
	)
	.bind(ws.0)
	.bind(folder)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;
	Ok(found.is_some())
}

pub(crate) async fn list_folder(
	db: &SqlitePool,
	ws: WsRid,
	folder: &str,
	limit: u32,
) -> ApiResult<FolderListing> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let rows = sqlx::query(
		"SELECT path, filename, size, updated_at FROM files
		WHERE ws_rid = ? AND folder = ? AND deleted_at IS NULL AND marker = 0
		ORDER BY filename LIMIT ?",
	)
	.bind(ws.0)
	.bind(folder)
	.bind(i64::from(limit) + 1)
	.fetch_all(db)
	.await
	.map_err(db_err)?;

	let truncated = rows.len() > limit as usize;
	let files: Vec<FolderFileInfo> = rows
		.iter()
		.take(limit as usize)
		.map(|row: &SqliteRow| -> Result<FolderFileInfo, sqlx::Error> {
			Ok(FolderFileInfo {
				path: row.try_get::<String, _>("path")?.into(),
				name: row.try_get::<String, _>("filename")?.into(),
				size: row.try_get("size")?,
				updated_at: Timestamp(row.try_get("updated_at")?),
			})
		})
		.collect::<Result<_, _>>()
		.map_err(db_err)?;

	// explicit markers directly inside this folder
	let marker_names: Vec<String> = sqlx::query_scalar(
		"SELECT filename FROM files
		WHERE ws_rid = ? AND folder = ? AND marker = 1 AND deleted_at IS NULL",
	)
	.bind(ws.0)
	.bind(folder)
	.fetch_all(db)
	.await
	.map_err(db_err)?;

	// implied subfolders: first segment of any deeper folder value
	let (_, prefix) = prefix_bounds(folder);
	let mut names: BTreeSet<String> = marker_names.into_iter().collect();
	for deeper in folders_below(db, ws, folder).await? {
		if let Some(rest) = deeper.strip_prefix(&prefix) {
			if let Some(first) = rest.split('/').next() {
				if !first.is_empty() {
					names.insert(first.to_string());
				}
			}
		}
	}

	Ok(FolderListing {
		files,
		folders: names.into_iter().map(Into::into).collect(),
		truncated,
	})
}

pub(crate) async fn create_folder(
	db: &SqlitePool,
	ws: WsRid,
	path: &str,
	now: Timestamp,
) -> ApiResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;

	if read_any(&mut *tx, ws, path).await?.is_some() {
		return Err(Error::Conflict("path already exists".into()));
	}
	let (_, prefix) = prefix_bounds(path);
	let occupied: Option<i64> = sqlx::query_scalar(
		"SELECT 1 FROM files WHERE ws_rid = ? AND substr(path, 1, length(?)) = ? LIMIT 1",
	)
	.bind(ws.0)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_optional(&mut *tx)
	.await
	.map_err(db_err)?;
	if occupied.is_some() {
		return Err(Error::Conflict("folder already exists".into()));
	}

	let (folder, filename) = vpath::split(path);
	sqlx::query(
		"INSERT INTO files (ws_rid, path, filename, folder, content, etag, size,
			created_at, updated_at, marker)
		VALUES (?, ?, ?, ?, '', ?, 0, ?, ?, 1)",
	)
	.bind(ws.0)
	.bind(path)
	.bind(filename)
	.bind(folder)
	.bind(mdvault::core::etag::content_etag(b"").as_ref())
	.bind(now.0)
	.bind(now.0)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)
}

pub(crate) async fn stats(db: &SqlitePool, ws: WsRid, folder: &str) -> ApiResult<FolderStats> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let (exact, prefix) = prefix_bounds(folder);
	let row = sqlx::query(
		"SELECT COUNT(*) AS n, COALESCE(SUM(size), 0) AS total FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL AND marker = 0
			AND (folder = ? OR substr(folder, 1, length(?)) = ?)",
	)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_one(db)
	.await
	.map_err(db_err)?;
	let file_count: i64 = row.try_get("n").map_err(db_err)?;
	let total_size: i64 = row.try_get("total").map_err(db_err)?;

	// count every distinct folder below base, including intermediate levels
	let mut seen: BTreeSet<String> = BTreeSet::new();
	for deeper in folders_below(db, ws, folder).await? {
		let mut current = deeper.as_str();
		while current != folder && current.len() > prefix.len() - 1 {
			seen.insert(current.to_string());
			current = vpath::split(current).0;
		}
	}
	let markers: Vec<String> = sqlx::query_scalar(
		"SELECT path FROM files
		WHERE ws_rid = ? AND marker = 1 AND deleted_at IS NULL
			AND substr(path, 1, length(?)) = ?",
	)
	.bind(ws.0)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_all(db)
	.await
	.map_err(db_err)?;
	seen.extend(markers);

	Ok(FolderStats {
		file_count: file_count.max(0) as u64,
		folder_count: seen.len() as u64,
		total_size: total_size.max(0) as u64,
	})
}

fn escape_like(q: &str) -> String {
	q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn snippet_around(content: &str, q: &str) -> Option<Box<str>> {
	let haystack = content.to_lowercase();
	let idx = haystack.find(&q.to_lowercase())?;
	let start = content[..idx].char_indices().rev().nth(40).map(|(i, _)| i).unwrap_or(0);
	let end = (idx + q.len() + 40).min(content.len());
	let mut end_fixed = end;
	while !content.is_char_boundary(end_fixed) {
		end_fixed += 1;
	}
	let mut start_fixed = start;
	while !content.is_char_boundary(start_fixed) {
		start_fixed += 1;
	}
	Some(content[start_fixed..end_fixed].into())
}

pub(crate) async fn search(
	db: &SqlitePool,
	ws: WsRid,
	folder: &str,
	q: &str,
	limit: u32,
) -> ApiResult<Vec<SearchHit>> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let (exact, prefix) = prefix_bounds(folder);
	let pattern = format!("%{}%", escape_like(q));
	let mut hits: Vec<SearchHit> = Vec::new();

	let content_rows = sqlx::query(
		"SELECT path, filename, size, updated_at, etag, content FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL AND marker = 0
			AND (folder = ? OR substr(folder, 1, length(?)) = ?)
			AND content LIKE ? ESCAPE '\\'
		ORDER BY path LIMIT ?",
	)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.bind(&pattern)
	.bind(i64::from(limit))
	.fetch_all(db)
	.await
	.map_err(db_err)?;
	for row in &content_rows {
		let content: String = row.try_get("content").map_err(db_err)?;
		hits.push(SearchHit {
			path: row.try_get::<String, _>("path").map_err(db_err)?.into(),
			name: row.try_get::<String, _>("filename").map_err(db_err)?.into(),
			size: row.try_get("size").map_err(db_err)?,
			updated_at: Timestamp(row.try_get("updated_at").map_err(db_err)?),
			etag: row.try_get::<String, _>("etag").map_err(db_err)?.into(),
			matched_in: "content".into(),
			snippet: snippet_around(&content, q),
		});
	}

	let append_rows = sqlx::query(
		"SELECT f.path, f.filename, f.size, f.updated_at, f.etag, a.content AS acontent
		FROM files f JOIN appends a ON a.file_rid = f.file_rid
		WHERE f.ws_rid = ? AND f.deleted_at IS NULL AND f.marker = 0
			AND (f.folder = ? OR substr(f.folder, 1, length(?)) = ?)
			AND a.content LIKE ? ESCAPE '\\'
		ORDER BY f.path, a.seq LIMIT ?",
	)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.bind(&pattern)
	.bind(i64::from(limit))
	.fetch_all(db)
	.await
	.map_err(db_err)?;
	for row in &append_rows {
		let path: String = row.try_get("path").map_err(db_err)?;
		if hits.iter().any(|h| h.path.as_ref() == path && h.matched_in.as_ref() == "append") {
			continue;
		}
		let content: String = row.try_get("acontent").map_err(db_err)?;
		hits.push(SearchHit {
			path: path.into(),
			name: row.try_get::<String, _>("filename").map_err(db_err)?.into(),
			size: row.try_get("size").map_err(db_err)?,
			updated_at: Timestamp(row.try_get("updated_at").map_err(db_err)?),
			etag: row.try_get::<String, _>("etag").map_err(db_err)?.into(),
			matched_in: "append".into(),
			snippet: snippet_around(&content, q),
		});
	}

	hits.truncate(limit as usize);
	Ok(hits)
}

pub(crate) async fn list_recursive(
	db: &SqlitePool,
	ws: WsRid,
	folder: &str,
) -> ApiResult<Vec<FileRow>> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let (exact, prefix) = prefix_bounds(folder);
	let rows = sqlx::query(
		"SELECT * FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL AND marker = 0
			AND (folder = ? OR substr(folder, 1, length(?)) = ?)
		ORDER BY path",
	)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_all(db)
	.await
	.map_err(db_err)?;

	rows.iter().map(|row| file_from_row(row).map_err(db_err)).collect()
}

pub(crate) async fn cascade_delete(
	db: &SqlitePool,
	ws: WsRid,
	folder: &str,
	delete_expires_at: Timestamp,
) -> ApiResult<u32> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let mut tx = db.begin().await.map_err(db_err)?;
	let (exact, prefix) = prefix_bounds(folder);

	let result = sqlx::query(
		"UPDATE files SET deleted_at = ?, delete_expires_at = ?
		WHERE ws_rid = ? AND deleted_at IS NULL AND marker = 0
			AND (folder = ? OR substr(folder, 1, length(?)) = ?)",
	)
	.bind(Timestamp::now().0)
	.bind(delete_expires_at.0)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	// markers have nothing to recover; drop them outright
	sqlx::query(
		"DELETE FROM files
		WHERE ws_rid = ? AND marker = 1
			AND (path = ? OR substr(path, 1, length(?)) = ?)",
	)
	.bind(ws.0)
	.bind(folder)
	.bind(&prefix)
	.bind(&prefix)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	tx.commit().await.map_err(db_err)?;
	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

pub(crate) async fn delete_empty(db: &SqlitePool, ws: WsRid, folder: &str) -> ApiResult<()> {
	let (exact, prefix) = prefix_bounds(folder);
	let live: i64 = sqlx::query_scalar(
		"SELECT COUNT(*) FROM files
		WHERE ws_rid = ? AND deleted_at IS NULL AND marker = 0
			AND (folder = ? OR substr(folder, 1, length(?)) = ?)",
	)
	.bind(ws.0)
	.bind(&exact)
	.bind(&prefix)
	.bind(&prefix)
	.fetch_one(db)
	.await
	.map_err(db_err)?;
	if live > 0 {
		return Err(Error::FolderNotEmpty);
	}

	let result =
		sqlx::query("DELETE FROM files WHERE ws_rid = ? AND path = ? AND marker = 1")
			.bind(ws.0)
			.bind(folder)
			.execute(db)
			.await
			.map_err(db_err)?;
	if result.rows_affected() == 0 {
		return Err(Error::FolderNotFound);
	}
	Ok(())
}

pub(crate) async fn rename_folder(
	db: &SqlitePool,
	ws: WsRid,
	folder: &str,
	new_folder: &str,
	now: Timestamp,
) -> ApiResult<u32> {
	if !folder_exists(db, ws, folder).await? {
		return Err(Error::FolderNotFound);
	}

	let mut tx = db.begin().await.map_err(db_err)?;
	let (_, old_prefix) = prefix_bounds(folder);
	let (_, new_prefix) = prefix_bounds(new_folder);

	let occupied: Option<i64> = sqlx::query_scalar(
		"SELECT 1 FROM files
		WHERE ws_rid = ? AND (path = ? OR substr(path, 1, length(?)) = ?) LIMIT 1",
	)
	.bind(ws.0)
	.bind(new_folder)
	.bind(&new_prefix)
	.bind(&new_prefix)
	.fetch_optional(&mut *tx)
	.await
	.map_err(db_err)?;
	if occupied.is_some() {
		return Err(Error::Conflict("target folder already exists".into()));
	}

	// the explicit marker row, if present
	sqlx::query(
		"UPDATE files SET path = ?, filename = ?, updated_at = ?
		WHERE ws_rid = ? AND path = ? AND marker = 1",
	)
	.bind(new_folder)
	.bind(vpath::basename(new_folder))
	.bind(now.0)
	.bind(ws.0)
	.bind(folder)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	// every row under the prefix, soft-deleted included
	let skip = folder.len() as i64 + 1;
	let result = sqlx::query(
		"UPDATE files SET
			path = ? || substr(path, ?),
			folder = CASE
				WHEN folder = ? THEN ?
				WHEN substr(folder, 1, length(?)) = ? THEN ? || substr(folder, ?)
				ELSE folder
			END,
			updated_at = ?
		WHERE ws_rid = ? AND substr(path, 1, length(?)) = ?",
	)
	.bind(new_folder)
	.bind(skip)
	.bind(folder)
	.bind(new_folder)
	.bind(&old_prefix)
	.bind(&old_prefix)
	.bind(new_folder)
	.bind(skip)
	.bind(now.0)
	.bind(ws.0)
	.bind(&old_prefix)
	.bind(&old_prefix)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	// scoped keys and webhooks follow the prefix
	for table in ["keys", "webhooks"] {
		sqlx::query(&format!(
			"UPDATE {table} SET scope_path = CASE
				WHEN scope_path = ? THEN ?
				ELSE ? || substr(scope_path, ?)
			END
			WHERE ws_rid = ? AND scope_type IN ('file', 'folder')
				AND (scope_path = ? OR substr(scope_path, 1, length(?)) = ?)"
		))
		.bind(folder)
		.bind(new_folder)
		.bind(new_folder)
		.bind(skip)
		.bind(ws.0)
		.bind(folder)
		.bind(&old_prefix)
		.bind(&old_prefix)
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}

	tx.commit().await.map_err(db_err)?;
	Ok(u32::try_from(result.rows_affected()).unwrap_or_default())
}

// vim: ts=4
