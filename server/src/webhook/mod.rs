//! Webhooks: registration surface, event filtering, delivery pipeline.

pub mod dispatch;
pub mod guard;
pub mod handler;

use serde_json::json;

use crate::core::path;
use crate::prelude::*;
use crate::store_adapter::{
	AppendEvent, AppendRow, AppendType, FileRow, KeyRecord, ScopeType, WebhookRow, WebhookStatus,
};
use dispatch::DeliveryJob;

/// Closed event enum; registration rejects anything else
pub const ALLOWED_EVENTS: &[&str] = &[
	"append",
	"append.created",
	"task.created",
	"task.claimed",
	"task.completed",
	"task.cancelled",
	"task.blocked",
	"file.created",
	"file.updated",
	"file.deleted",
];

/// `append` is the umbrella subscription for the raw append stream
fn event_matches(subscribed: &str, event: &str) -> bool {
	subscribed == event || (subscribed == "append" && event.starts_with("append."))
}

/// Pure filter: does this webhook want this event?
pub fn webhook_matches(
	webhook: &WebhookRow,
	event: &str,
	file_path: &str,
	author: Option<&str>,
	append_type: Option<AppendType>,
) -> bool {
	if webhook.status != WebhookStatus::Active {
		return false;
	}
	if !webhook.events.iter().any(|e| event_matches(e, event)) {
		return false;
	}

	let scope_ok = match webhook.scope_type {
		ScopeType::File => file_path == webhook.scope_path.as_ref(),
		ScopeType::Folder | ScopeType::Workspace => {
			let base = match webhook.scope_type {
				ScopeType::Workspace => "/",
				_ => webhook.scope_path.as_ref(),
			};
			if webhook.recursive {
				path::is_within(file_path, base)
			} else {
				path::split(file_path).0 == base
			}
		}
	};
	if !scope_ok {
		return false;
	}

	if let (Some(filter), Some(author)) = (&webhook.filter_authors, author) {
		if !filter.iter().any(|a| a.as_ref() == author) {
			return false;
		}
	}
	if let (Some(filter), Some(typ)) = (&webhook.filter_append_types, append_type) {
		if !filter.contains(&typ) {
			return false;
		}
	}

	true
}

fn enqueue_for(
	app: &App,
	webhooks: &[WebhookRow],
	event: &str,
	file: &FileRow,
	author: Option<&str>,
	append_type: Option<AppendType>,
	payload: &serde_json::Value,
) {
	for webhook in webhooks {
		if !webhook_matches(webhook, event, &file.path, author, append_type) {
			continue;
		}
		let mut payload = payload.clone();
		if webhook.include_urls {
			payload["url"] = json!(format!("{}{}", app.opts.base_url, file.path));
		}
		let body = match serde_json::to_string(&payload) {
			Ok(body) => body,
			Err(err) => {
				warn!("webhook payload serialization failed: {}", err);
				continue;
			}
		};
		app.dispatcher.enqueue(DeliveryJob {
			webhook_id: webhook.webhook_id.clone(),
			url: webhook.url.clone(),
			secret: webhook.secret.clone(),
			body,
		});
	}
}

/// Emit a `file.*` event after a committed file mutation. Failures are
/// logged, never propagated: delivery is best-effort by contract.
pub async fn emit_file_event(app: &App, key: &KeyRecord, event: &str, file: &FileRow) {
	let webhooks = match app.store.list_webhooks(key.ws).await {
		Ok(webhooks) => webhooks,
		Err(err) => {
			warn!("webhook listing failed, skipping {} event: {:?}", event, err);
			return;
		}
	};
	if webhooks.is_empty() {
		return;
	}

	let payload = json!({
		"event": event,
		"workspaceId": key.workspace_id,
		"path": file.path,
		"file": {
			"path": file.path,
			"filename": file.filename,
			"etag": file.etag,
			"size": file.size,
		},
		"timestamp": Timestamp::now(),
	});
	enqueue_for(app, &webhooks, event, file, None, None, &payload);
}

/// Emit the event stream produced by an append batch. The planner emits, per
/// item, its transition events followed by `append.created`; that ordering is
/// used to pair events back to rows here.
pub async fn emit_append_events(
	app: &App,
	key: &KeyRecord,
	file: &FileRow,
	rows: &[AppendRow],
	events: &[AppendEvent],
) {
	if rows.is_empty() {
		return;
	}
	let webhooks = match app.store.list_webhooks(key.ws).await {
		Ok(webhooks) => webhooks,
		Err(err) => {
			warn!("webhook listing failed, skipping append events: {:?}", err);
			return;
		}
	};
	if webhooks.is_empty() {
		return;
	}

	let mut event_iter = events.iter();
	for row in rows {
		let mut row_events: Vec<&'static str> = Vec::new();
		for event in event_iter.by_ref() {
			row_events.push(event.as_str());
			if matches!(event, AppendEvent::AppendCreated) {
				break;
			}
		}

		for event in row_events {
			let payload = json!({
				"event": event,
				"workspaceId": key.workspace_id,
				"path": file.path,
				"append": crate::append::handler::AppendView::from(row.clone()),
				"timestamp": Timestamp::now(),
			});
			enqueue_for(
				app,
				&webhooks,
				event,
				file,
				Some(&row.author),
				Some(row.typ),
				&payload,
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn webhook(scope_type: ScopeType, scope_path: &str, events: &[&str]) -> WebhookRow {
		WebhookRow {
			webhook_id: "wh_test".into(),
			ws: WsRid(1),
			scope_type,
			scope_path: scope_path.into(),
			url: "https://example.com/hook".into(),
			events: events.iter().map(|e| Box::from(*e)).collect(),
			filter_authors: None,
			filter_append_types: None,
			recursive: true,
			include_urls: false,
			secret: "whsec_x".into(),
			status: WebhookStatus::Active,
			created_at: Timestamp(0),
		}
	}

	#[test]
	fn matches_by_event_and_scope() {
		let w = webhook(ScopeType::Folder, "/docs", &["task.created"]);
		assert!(webhook_matches(&w, "task.created", "/docs/a.md", Some("x"), None));
		assert!(!webhook_matches(&w, "task.completed", "/docs/a.md", Some("x"), None));
		assert!(!webhook_matches(&w, "task.created", "/other/a.md", Some("x"), None));
	}

	#[test]
	fn append_umbrella_covers_the_append_stream() {
		let w = webhook(ScopeType::Workspace, "/", &["append"]);
		assert!(webhook_matches(&w, "append.created", "/a.md", Some("x"), None));
		assert!(!webhook_matches(&w, "task.created", "/a.md", Some("x"), None));
	}

	#[test]
	fn non_recursive_folder_scope_only_sees_direct_children() {
		let mut w = webhook(ScopeType::Folder, "/docs", &["file.updated"]);
		w.recursive = false;
		assert!(webhook_matches(&w, "file.updated", "/docs/a.md", None, None));
		assert!(!webhook_matches(&w, "file.updated", "/docs/sub/a.md", None, None));
	}

	#[test]
	fn disabled_webhooks_never_match() {
		let mut w = webhook(ScopeType::Workspace, "/", &["file.created"]);
		w.status = WebhookStatus::Disabled;
		assert!(!webhook_matches(&w, "file.created", "/a.md", None, None));
	}

	#[test]
	fn author_and_type_filters_apply() {
		let mut w = webhook(ScopeType::Workspace, "/", &["append.created"]);
		w.filter_authors = Some(Box::new(["alice".into()]));
		w.filter_append_types = Some(Box::new([AppendType::Task]));
		assert!(webhook_matches(&w, "append.created", "/a.md", Some("alice"), Some(AppendType::Task)));
		assert!(!webhook_matches(&w, "append.created", "/a.md", Some("bob"), Some(AppendType::Task)));
		assert!(!webhook_matches(
			&w,
			"append.created",
			"/a.md",
			Some("alice"),
			Some(AppendType::Comment)
		));
	}
}

// vim: ts=4
