//! Store adapter CRUD tests: workspaces, keys, files, folders, idempotency.

use mdvault::store_adapter::{
	CreateKeyOptions, DocSettingsPatch, Permission, ScopeType, StoreAdapter,
};
use mdvault::types::{Patch, Timestamp, WsRid};
use mdvault::Error;
use mdvault_store_adapter_sqlite::StoreAdapterSqlite;
use tempfile::TempDir;

async fn create_test_adapter() -> (StoreAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter =
		StoreAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

async fn create_test_workspace(adapter: &StoreAdapterSqlite) -> WsRid {
	adapter.create_workspace("ws_testWorkspace1", Some("test")).await.expect("workspace")
}

fn key_opts<'a>(hash: &'a str, permission: Permission) -> CreateKeyOptions<'a> {
	CreateKeyOptions {
		prefix: &hash[..8.min(hash.len())],
		key_hash: hash,
		permission,
		scope_type: ScopeType::Workspace,
		scope_path: "/",
		bound_author: None,
		wip_limit: None,
		allowed_types: None,
		display_name: None,
		expires_at: None,
	}
}

#[tokio::test]
async fn workspace_claim_is_one_way() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;

	let claimed = adapter.claim_workspace(ws, "a@example.com").await.expect("first claim");
	assert_eq!(claimed.claimed_by_email.as_deref(), Some("a@example.com"));

	let second = adapter.claim_workspace(ws, "b@example.com").await;
	assert!(matches!(second, Err(Error::WorkspaceAlreadyClaimed)));

	// the original claim survives
	let row = adapter.read_workspace(ws).await.expect("read");
	assert_eq!(row.claimed_by_email.as_deref(), Some("a@example.com"));
}

#[tokio::test]
async fn key_resolution_round_trip() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;

	let record = adapter
		.create_key(ws, &key_opts("hash-abcdef0123456789", Permission::Write))
		.await
		.expect("create key");
	assert_eq!(record.permission, Permission::Write);
	assert_eq!(record.workspace_id.as_ref(), "ws_testWorkspace1");

	let resolved = adapter.resolve_key("hash-abcdef0123456789").await.expect("resolve");
	assert_eq!(resolved.map(|k| k.key_id), Some(record.key_id));

	let missing = adapter.resolve_key("nope").await.expect("resolve missing");
	assert!(missing.is_none());

	adapter.revoke_key(ws, record.key_id).await.expect("revoke");
	let revoked = adapter.resolve_key("hash-abcdef0123456789").await.expect("resolve revoked");
	assert!(revoked.and_then(|k| k.revoked_at).is_some());

	// revoked keys drop out of the default listing
	let live = adapter.list_keys(ws, false).await.expect("list");
	assert!(live.is_empty());
	let all = adapter.list_keys(ws, true).await.expect("list all");
	assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn file_put_read_etag_and_if_match() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	let created = adapter
		.put_file(ws, "/notes.md", "# Hi", "etag0000aaaa1111", None, now)
		.await
		.expect("create");
	assert!(created.created);
	assert_eq!(created.file.size, 4);

	let read = adapter.read_file(ws, "/notes.md").await.expect("read");
	assert_eq!(read.content.as_ref(), "# Hi");
	assert_eq!(read.etag.as_ref(), "etag0000aaaa1111");

	// If-Match with a stale etag fails before any write
	let stale = adapter
		.put_file(ws, "/notes.md", "# New", "etag2222bbbb3333", Some("wrong"), now)
		.await;
	assert!(matches!(stale, Err(Error::EtagMismatch)));

	let updated = adapter
		.put_file(ws, "/notes.md", "# New", "etag2222bbbb3333", Some("etag0000aaaa1111"), now)
		.await
		.expect("update");
	assert!(!updated.created);
	assert_eq!(updated.file.etag.as_ref(), "etag2222bbbb3333");
}

#[tokio::test]
async fn soft_delete_recover_round_trip() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/t.md", "x", "e1", None, now).await.expect("create");

	let deleted = adapter
		.soft_delete_file(ws, "/t.md", now.add_seconds(3600))
		.await
		.expect("soft delete");
	assert!(deleted.deleted_at.is_some());

	let read = adapter.read_file(ws, "/t.md").await;
	assert!(matches!(read, Err(Error::FileDeleted { .. })));

	let recovered = adapter.recover_file(ws, "/t.md").await.expect("recover");
	assert!(recovered.deleted_at.is_none());
	assert_eq!(recovered.content.as_ref(), "x");

	// recovering a live file is a 404
	let again = adapter.recover_file(ws, "/t.md").await;
	assert!(matches!(again, Err(Error::FileNotFound)));
}

#[tokio::test]
async fn purge_frees_the_path() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/p.md", "x", "e1", None, now).await.expect("create");
	adapter.purge_file(ws, "/p.md").await.expect("purge");

	assert!(matches!(adapter.read_file(ws, "/p.md").await, Err(Error::FileNotFound)));

	// the path can be reused
	let recreated = adapter.put_file(ws, "/p.md", "y", "e2", None, now).await.expect("recreate");
	assert!(recreated.created);
}

#[tokio::test]
async fn reaper_purges_lapsed_files() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/old.md", "x", "e1", None, now).await.expect("create");
	adapter.put_file(ws, "/fresh.md", "y", "e2", None, now).await.expect("create");
	adapter.soft_delete_file(ws, "/old.md", now.add_seconds(-10)).await.expect("delete old");
	adapter.soft_delete_file(ws, "/fresh.md", now.add_seconds(3600)).await.expect("delete fresh");

	let purged = adapter.purge_expired_files(now).await.expect("reap");
	assert_eq!(purged, 1);

	assert!(matches!(adapter.read_file(ws, "/old.md").await, Err(Error::FileNotFound)));
	assert!(matches!(adapter.read_file(ws, "/fresh.md").await, Err(Error::FileDeleted { .. })));
}

#[tokio::test]
async fn move_follows_scoped_keys() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/a.md", "x", "e1", None, now).await.expect("create");
	let mut opts = key_opts("filekeyhash000000", Permission::Write);
	opts.scope_type = ScopeType::File;
	opts.scope_path = "/a.md";
	adapter.create_key(ws, &opts).await.expect("file key");

	let moved = adapter.move_file(ws, "/a.md", "/docs/a.md", now).await.expect("move");
	assert_eq!(moved.path.as_ref(), "/docs/a.md");
	assert_eq!(moved.folder.as_ref(), "/docs");

	let key = adapter
		.resolve_key("filekeyhash000000")
		.await
		.expect("resolve")
		.expect("key exists");
	assert_eq!(key.scope_path.as_ref(), "/docs/a.md");

	// occupied destination conflicts
	adapter.put_file(ws, "/b.md", "y", "e2", None, now).await.expect("create b");
	let clash = adapter.move_file(ws, "/b.md", "/docs/a.md", now).await;
	assert!(matches!(clash, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn folder_listing_and_stats() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/docs/a.md", "aa", "e1", None, now).await.expect("a");
	adapter.put_file(ws, "/docs/sub/b.md", "bbb", "e2", None, now).await.expect("b");
	adapter.put_file(ws, "/top.md", "c", "e3", None, now).await.expect("c");

	let listing = adapter.list_folder(ws, "/docs", 10).await.expect("list");
	assert_eq!(listing.files.len(), 1);
	assert_eq!(listing.files[0].name.as_ref(), "a.md");
	assert_eq!(listing.folders, vec![Box::from("sub")]);

	let root = adapter.list_folder(ws, "/", 10).await.expect("root");
	assert_eq!(root.files.len(), 1);
	assert_eq!(root.folders, vec![Box::from("docs")]);

	let stats = adapter.folder_stats(ws, "/docs").await.expect("stats");
	assert_eq!(stats.file_count, 2);
	assert_eq!(stats.folder_count, 1);
	assert_eq!(stats.total_size, 5);

	assert!(matches!(
		adapter.list_folder(ws, "/nope", 10).await,
		Err(Error::FolderNotFound)
	));
}

#[tokio::test]
async fn folder_rename_rewrites_paths() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.put_file(ws, "/docs/a.md", "aa", "e1", None, now).await.expect("a");
	adapter.put_file(ws, "/docs/sub/b.md", "bb", "e2", None, now).await.expect("b");

	let moved = adapter.rename_folder(ws, "/docs", "/papers", now).await.expect("rename");
	assert_eq!(moved, 2);

	let read = adapter.read_file(ws, "/papers/sub/b.md").await.expect("moved file");
	assert_eq!(read.folder.as_ref(), "/papers/sub");
	assert!(matches!(adapter.read_file(ws, "/docs/a.md").await, Err(Error::FileNotFound)));
}

#[tokio::test]
async fn cascade_delete_and_empty_folder_rules() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter.create_folder(ws, "/empty", now).await.expect("marker");
	adapter.put_file(ws, "/full/a.md", "aa", "e1", None, now).await.expect("a");

	// duplicate folder create conflicts
	assert!(matches!(
		adapter.create_folder(ws, "/empty", now).await,
		Err(Error::Conflict(_))
	));

	// non-empty without cascade refuses
	assert!(matches!(
		adapter.delete_empty_folder(ws, "/full").await,
		Err(Error::FolderNotEmpty)
	));

	adapter.delete_empty_folder(ws, "/empty").await.expect("delete empty");

	let deleted = adapter
		.cascade_delete_folder(ws, "/full", now.add_seconds(3600))
		.await
		.expect("cascade");
	assert_eq!(deleted, 1);
	assert!(matches!(
		adapter.read_file(ws, "/full/a.md").await,
		Err(Error::FileDeleted { .. })
	));
}

#[tokio::test]
async fn settings_patch_merges() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	let patch = DocSettingsPatch {
		wip_limit: Patch::Value(3),
		claim_duration_seconds: Patch::Value(600),
		..Default::default()
	};
	let settings = adapter.update_workspace_settings(ws, &patch).await.expect("patch");
	assert_eq!(settings.wip_limit, Some(3));
	assert_eq!(settings.claim_duration_seconds, Some(600));

	// partial patch keeps the other field; null clears
	let patch = DocSettingsPatch { wip_limit: Patch::Null, ..Default::default() };
	let settings = adapter.update_workspace_settings(ws, &patch).await.expect("patch 2");
	assert_eq!(settings.wip_limit, None);
	assert_eq!(settings.claim_duration_seconds, Some(600));

	// file settings override in the same shape
	adapter.put_file(ws, "/f.md", "x", "e1", None, now).await.expect("file");
	let patch =
		DocSettingsPatch { wip_limit: Patch::Value(1), ..Default::default() };
	let file_settings = adapter.update_file_settings(ws, "/f.md", &patch).await.expect("fpatch");
	assert_eq!(file_settings.wip_limit, Some(1));
}

#[tokio::test]
async fn idempotency_records_are_write_once() {
	let (adapter, _temp) = create_test_adapter().await;
	let ws = create_test_workspace(&adapter).await;
	let now = Timestamp::now();

	adapter
		.store_idempotency(ws, "file.move", "idem-1", "digest-a", 200, r#"{"ok":true}"#, now)
		.await
		.expect("store");
	// second store with different content keeps the first snapshot
	adapter
		.store_idempotency(ws, "file.move", "idem-1", "digest-b", 500, r#"{"ok":false}"#, now)
		.await
		.expect("store dup");

	let record = adapter
		.read_idempotency(ws, "file.move", "idem-1")
		.await
		.expect("read")
		.expect("present");
	assert_eq!(record.request_digest.as_ref(), "digest-a");
	assert_eq!(record.response_status, 200);

	// different route is a different record
	let other = adapter.read_idempotency(ws, "file.delete", "idem-1").await.expect("read");
	assert!(other.is_none());

	let purged = adapter
		.purge_idempotency_records(Timestamp(now.0 + 1))
		.await
		.expect("purge");
	assert_eq!(purged, 1);
}
