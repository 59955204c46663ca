//! Append engine tests against real SQLite: gap-free sequence allocation
//! under concurrency, claim exclusivity, the task state machine end to end.

use std::sync::Arc;

use mdvault::store_adapter::{AppendContext, AppendInput, AppendType, StoreAdapter};
use mdvault::types::{Timestamp, WsRid};
use mdvault::Error;
use mdvault_store_adapter_sqlite::StoreAdapterSqlite;
use tempfile::TempDir;

async fn setup() -> (Arc<StoreAdapterSqlite>, WsRid, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter =
		StoreAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let ws = adapter.create_workspace("ws_appendTests01", None).await.expect("workspace");
	adapter
		.put_file(ws, "/file.md", "# Tasks", "etag000000000001", None, Timestamp::now())
		.await
		.expect("file");
	(Arc::new(adapter), ws, temp_dir)
}

fn ctx() -> AppendContext {
	AppendContext {
		key_allowed_types: None,
		file_allowed_types: None,
		wip_limit: None,
		wip_scope: "/".into(),
		claim_duration_secs: 600,
		now: Timestamp::now(),
	}
}

fn input(typ: AppendType, parent_ref: Option<i64>, author: &str) -> AppendInput {
	AppendInput {
		typ,
		parent_ref,
		author: author.into(),
		content: Some("content".into()),
		priority: None,
		labels: None,
	}
}

#[tokio::test]
async fn sequences_are_gap_free_and_monotonic() {
	let (adapter, ws, _temp) = setup().await;

	for _ in 0..5 {
		adapter
			.append_batch(ws, "/file.md", &[input(AppendType::Comment, None, "a")], &ctx())
			.await
			.expect("append");
	}

	let (file, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	let seqs: Vec<i64> = appends.iter().map(|a| a.seq).collect();
	assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
	assert_eq!(file.append_count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_never_gap() {
	let (adapter, ws, _temp) = setup().await;

	let mut handles = Vec::new();
	for i in 0..20 {
		let adapter = Arc::clone(&adapter);
		let author = format!("agent-{}", i);
		handles.push(tokio::spawn(async move {
			adapter
				.append_batch(ws, "/file.md", &[input(AppendType::Comment, None, &author)], &ctx())
				.await
		}));
	}
	for handle in handles {
		handle.await.expect("join").expect("append");
	}

	let (_, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	let seqs: Vec<i64> = appends.iter().map(|a| a.seq).collect();
	assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());
}

#[tokio::test]
async fn failed_batches_leave_no_gap() {
	let (adapter, ws, _temp) = setup().await;

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task");

	// claim of a missing target rejects the whole batch
	let bad = adapter
		.append_batch(
			ws,
			"/file.md",
			&[
				input(AppendType::Comment, None, "x"),
				input(AppendType::Claim, Some(99), "x"),
			],
			&ctx(),
		)
		.await;
	assert!(matches!(bad, Err(Error::AppendNotFound)));

	// the rejected batch consumed no sequence numbers
	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Comment, None, "y")], &ctx())
		.await
		.expect("comment");
	let (_, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	let seqs: Vec<i64> = appends.iter().map(|a| a.seq).collect();
	assert_eq!(seqs, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_exclusivity_under_contention() {
	let (adapter, ws, _temp) = setup().await;

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task");

	let mut handles = Vec::new();
	for i in 0..8 {
		let adapter = Arc::clone(&adapter);
		let author = format!("claimer-{}", i);
		handles.push(tokio::spawn(async move {
			adapter
				.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), &author)], &ctx())
				.await
		}));
	}

	let mut winners = 0;
	let mut conflicts = 0;
	for handle in handles {
		match handle.await.expect("join") {
			Ok(_) => winners += 1,
			Err(Error::AlreadyClaimed { retry_after_ms, .. }) => {
				assert!(retry_after_ms >= 0);
				conflicts += 1;
			}
			Err(other) => panic!("unexpected error: {:?}", other),
		}
	}
	assert_eq!(winners, 1);
	assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn task_lifecycle_claim_complete() {
	let (adapter, ws, _temp) = setup().await;

	let task = adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task");
	assert_eq!(task.rows[0].status.as_deref(), Some("open"));

	let claim = adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), "worker")], &ctx())
		.await
		.expect("claim");
	assert_eq!(claim.rows[0].status.as_deref(), Some("active"));
	assert!(claim.rows[0].expires_at.is_some());

	// a response by someone else bounces while the claim is active
	let outsider = adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Response, Some(1), "other")], &ctx())
		.await;
	assert!(matches!(outsider, Err(Error::AlreadyClaimed { .. })));

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Response, Some(1), "worker")], &ctx())
		.await
		.expect("response");

	let (_, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	assert_eq!(appends[0].status.as_deref(), Some("done"));
	assert_eq!(appends[1].status.as_deref(), Some("released"));

	// done tasks refuse further claims
	let reclaim = adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), "late")], &ctx())
		.await;
	assert!(matches!(reclaim, Err(Error::TaskAlreadyComplete)));
}

#[tokio::test]
async fn cancel_reopens_the_task() {
	let (adapter, ws, _temp) = setup().await;

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task");
	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), "a")], &ctx())
		.await
		.expect("claim");
	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Cancel, Some(2), "a")], &ctx())
		.await
		.expect("cancel");

	// task is claimable again
	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), "b")], &ctx())
		.await
		.expect("reclaim");

	let (_, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	assert_eq!(appends[1].status.as_deref(), Some("cancelled"));
	assert_eq!(appends[3].status.as_deref(), Some("active"));
}

#[tokio::test]
async fn wip_limit_counts_across_files_in_scope() {
	let (adapter, ws, _temp) = setup().await;
	adapter
		.put_file(ws, "/other.md", "# More", "etag000000000002", None, Timestamp::now())
		.await
		.expect("file 2");

	let mut limited = ctx();
	limited.wip_limit = Some(1);

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task 1");
	adapter
		.append_batch(ws, "/other.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task 2");

	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Claim, Some(1), "x")], &limited)
		.await
		.expect("first claim fits");

	let over = adapter
		.append_batch(ws, "/other.md", &[input(AppendType::Claim, Some(1), "x")], &limited)
		.await;
	match over {
		Err(Error::WipLimitExceeded { current_count, limit }) => {
			assert_eq!((current_count, limit), (1, 1));
		}
		other => panic!("expected WIP limit, got {:?}", other),
	}

	// a different author is unaffected
	adapter
		.append_batch(ws, "/other.md", &[input(AppendType::Claim, Some(1), "y")], &limited)
		.await
		.expect("other author claims");
}

#[tokio::test]
async fn wip_limit_gates_each_batch_author_separately() {
	let (adapter, ws, _temp) = setup().await;

	for _ in 0..4 {
		adapter
			.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
			.await
			.expect("task");
	}

	let mut limited = ctx();
	limited.wip_limit = Some(1);

	// one batch, two authors: each is gated only against their own count
	let batch = vec![
		input(AppendType::Claim, Some(1), "x"),
		input(AppendType::Claim, Some(2), "y"),
	];
	let outcome = adapter
		.append_batch(ws, "/file.md", &batch, &limited)
		.await
		.expect("mixed-author batch fits");
	assert_eq!(outcome.rows.len(), 2);

	// x now holds a claim; pairing a fresh author with x rejects the whole
	// batch on x's count, not z's
	let batch = vec![
		input(AppendType::Claim, Some(3), "z"),
		input(AppendType::Claim, Some(4), "x"),
	];
	let over = adapter.append_batch(ws, "/file.md", &batch, &limited).await;
	match over {
		Err(Error::WipLimitExceeded { current_count, limit }) => {
			assert_eq!((current_count, limit), (1, 1));
		}
		other => panic!("expected WIP limit, got {:?}", other),
	}

	// atomicity: z's claim from the rejected batch never landed
	let (_, appends) = adapter.list_appends(ws, "/file.md").await.expect("list");
	assert_eq!(appends.len(), 6);
	assert!(!appends.iter().any(|a| a.author.as_ref() == "z"));
}

#[tokio::test]
async fn append_to_deleted_file_is_gone() {
	let (adapter, ws, _temp) = setup().await;
	adapter
		.soft_delete_file(ws, "/file.md", Timestamp::now().add_seconds(3600))
		.await
		.expect("delete");

	let result = adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Comment, None, "a")], &ctx())
		.await;
	assert!(matches!(result, Err(Error::FileDeleted { .. })));
}

#[tokio::test]
async fn read_single_append() {
	let (adapter, ws, _temp) = setup().await;
	adapter
		.append_batch(ws, "/file.md", &[input(AppendType::Task, None, "pm")], &ctx())
		.await
		.expect("task");

	let row = adapter.read_append(ws, "/file.md", 1).await.expect("read");
	assert_eq!(row.wire_id(), "a1");
	assert_eq!(row.author.as_ref(), "pm");

	assert!(matches!(
		adapter.read_append(ws, "/file.md", 2).await,
		Err(Error::AppendNotFound)
	));
}
