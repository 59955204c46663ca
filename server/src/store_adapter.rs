//! Adapter that manages persistent state: workspaces, capability keys, files,
//! append logs, webhooks, idempotency records.
//!
//! The server never touches SQL; everything below this trait is owned by an
//! adapter crate. Invariants the adapter must uphold:
//! - `(workspace, path)` is unique among non-purged files
//! - append sequence numbers are monotonic and gap-free per file, allocated
//!   under the file's write lock inside the append transaction
//! - claim/`If-Match`/move/rename races serialize on that same lock

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::prelude::*;

// Permissions & scopes
//**********************

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
	#[default]
	Read,
	Append,
	Write,
}

impl Permission {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Append => "append",
			Self::Write => "write",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"read" => Some(Self::Read),
			"append" => Some(Self::Append),
			"write" => Some(Self::Write),
			_ => None,
		}
	}

	/// Permission hierarchy: write implies append implies read
	pub fn allows(&self, required: Permission) -> bool {
		match required {
			Permission::Read => true,
			Permission::Append => matches!(self, Permission::Append | Permission::Write),
			Permission::Write => matches!(self, Permission::Write),
		}
	}

	/// URL class this permission unlocks (`/r`, `/a`, `/w`)
	pub fn url_prefix(&self) -> &'static str {
		match self {
			Self::Read => "r",
			Self::Append => "a",
			Self::Write => "w",
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
	#[default]
	Workspace,
	Folder,
	File,
}

impl ScopeType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Workspace => "workspace",
			Self::Folder => "folder",
			Self::File => "file",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"workspace" => Some(Self::Workspace),
			"folder" => Some(Self::Folder),
			"file" => Some(Self::File),
			_ => None,
		}
	}
}

// Capability keys
//*****************

/// A resolved capability key. The plaintext never appears here; resolution
/// goes through the one-way hash.
#[derive(Debug, Clone)]
pub struct KeyRecord {
	pub key_id: i64,
	pub ws: WsRid,
	pub workspace_id: Box<str>,
	pub prefix: Box<str>,
	pub permission: Permission,
	pub scope_type: ScopeType,
	pub scope_path: Box<str>,
	pub bound_author: Option<Box<str>>,
	pub wip_limit: Option<u32>,
	pub allowed_types: Option<Box<[AppendType]>>,
	pub display_name: Option<Box<str>>,
	pub created_at: Timestamp,
	pub expires_at: Option<Timestamp>,
	pub revoked_at: Option<Timestamp>,
}

#[derive(Debug)]
pub struct CreateKeyOptions<'a> {
	pub prefix: &'a str,
	pub key_hash: &'a str,
	pub permission: Permission,
	pub scope_type: ScopeType,
	pub scope_path: &'a str,
	pub bound_author: Option<&'a str>,
	pub wip_limit: Option<u32>,
	pub allowed_types: Option<&'a [AppendType]>,
	pub display_name: Option<&'a str>,
	pub expires_at: Option<Timestamp>,
}

// Appends
//*********

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendType {
	Task,
	Claim,
	Response,
	Cancel,
	Renew,
	Comment,
}

impl AppendType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Task => "task",
			Self::Claim => "claim",
			Self::Response => "response",
			Self::Cancel => "cancel",
			Self::Renew => "renew",
			Self::Comment => "comment",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"task" => Some(Self::Task),
			"claim" => Some(Self::Claim),
			"response" => Some(Self::Response),
			"cancel" => Some(Self::Cancel),
			"renew" => Some(Self::Renew),
			"comment" => Some(Self::Comment),
			_ => None,
		}
	}
}

/// Materialized status values. The wire-visible log stays immutable; these
/// columns cache the reduction of later appends over earlier ones.
pub mod append_status {
	pub const OPEN: &str = "open";
	pub const DONE: &str = "done";
	pub const ACTIVE: &str = "active";
	pub const CANCELLED: &str = "cancelled";
	pub const RELEASED: &str = "released";
}

#[derive(Debug, Clone)]
pub struct AppendRow {
	pub seq: i64,
	pub parent_ref: Option<i64>,
	pub author: Box<str>,
	pub typ: AppendType,
	pub status: Option<Box<str>>,
	pub priority: Option<Box<str>>,
	pub labels: Option<Box<[Box<str>]>>,
	pub content: Option<Box<str>>,
	pub expires_at: Option<Timestamp>,
	pub created_at: Timestamp,
}

impl AppendRow {
	/// Wire id: `a` followed by the per-file sequence number
	pub fn wire_id(&self) -> String {
		format!("a{}", self.seq)
	}
}

/// One validated append request item (request parsing already done)
#[derive(Debug, Clone)]
pub struct AppendInput {
	pub typ: AppendType,
	pub parent_ref: Option<i64>,
	pub author: Box<str>,
	pub content: Option<Box<str>>,
	pub priority: Option<Box<str>>,
	pub labels: Option<Box<[Box<str>]>>,
}

/// Constraint context for an append batch: the merged file/workspace settings
/// plus the capability key's own restrictions.
#[derive(Debug, Clone)]
pub struct AppendContext {
	pub key_allowed_types: Option<Box<[AppendType]>>,
	pub file_allowed_types: Option<Box<[AppendType]>>,
	pub wip_limit: Option<u32>,
	/// Scope path of the key; WIP counting is bounded to this subtree
	pub wip_scope: Box<str>,
	pub claim_duration_secs: i64,
	pub now: Timestamp,
}

/// Insert produced by the append planner, with its sequence number already
/// assigned (the planner receives the post-bump counter base).
#[derive(Debug, Clone)]
pub struct PlannedAppend {
	pub seq: i64,
	pub typ: AppendType,
	pub parent_ref: Option<i64>,
	pub author: Box<str>,
	pub status: Option<&'static str>,
	pub priority: Option<Box<str>>,
	pub labels: Option<Box<[Box<str>]>>,
	pub content: Option<Box<str>>,
	pub expires_at: Option<Timestamp>,
}

/// Status/expiry rewrite of an existing row (materialized reduction only)
#[derive(Debug, Clone, Copy)]
pub struct AppendUpdate {
	pub seq: i64,
	pub set_status: Option<&'static str>,
	pub set_expires_at: Option<Timestamp>,
}

/// Webhook-relevant state transitions produced by a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendEvent {
	AppendCreated,
	TaskCreated,
	TaskClaimed,
	TaskCompleted,
	TaskCancelled,
}

impl AppendEvent {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::AppendCreated => "append.created",
			Self::TaskCreated => "task.created",
			Self::TaskClaimed => "task.claimed",
			Self::TaskCompleted => "task.completed",
			Self::TaskCancelled => "task.cancelled",
		}
	}
}

/// Full output of the planner, applied atomically by the adapter
#[derive(Debug, Clone, Default)]
pub struct AppendPlan {
	pub items: Vec<PlannedAppend>,
	pub updates: Vec<AppendUpdate>,
	pub events: Vec<AppendEvent>,
}

#[derive(Debug)]
pub struct AppendOutcome {
	pub file: FileRow,
	pub rows: Vec<AppendRow>,
	pub events: Vec<AppendEvent>,
}

// Files & settings
//******************

/// Per-file (or workspace-default) behavioral settings
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSettings {
	#[serde(rename = "wipLimit")]
	pub wip_limit: Option<u32>,
	#[serde(rename = "claimDurationSeconds")]
	pub claim_duration_seconds: Option<i64>,
	#[serde(rename = "allowedAppendTypes")]
	pub allowed_append_types: Option<Vec<AppendType>>,
	pub labels: Option<Vec<Box<str>>>,
}

impl DocSettings {
	/// Layer `self` (the more specific level) over `base`
	pub fn merged_over(&self, base: &DocSettings) -> DocSettings {
		DocSettings {
			wip_limit: self.wip_limit.or(base.wip_limit),
			claim_duration_seconds: self.claim_duration_seconds.or(base.claim_duration_seconds),
			allowed_append_types: self
				.allowed_append_types
				.clone()
				.or_else(|| base.allowed_append_types.clone()),
			labels: self.labels.clone().or_else(|| base.labels.clone()),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct DocSettingsPatch {
	#[serde(rename = "wipLimit", default)]
	pub wip_limit: Patch<u32>,
	#[serde(rename = "claimDurationSeconds", default)]
	pub claim_duration_seconds: Patch<i64>,
	#[serde(rename = "allowedAppendTypes", default)]
	pub allowed_append_types: Patch<Vec<AppendType>>,
	#[serde(default)]
	pub labels: Patch<Vec<Box<str>>>,
}

impl DocSettingsPatch {
	/// PATCH semantics: absent fields keep their value, null clears, a value
	/// replaces
	pub fn apply(&self, base: &DocSettings) -> DocSettings {
		fn field<T: Clone>(patch: &Patch<T>, current: &Option<T>) -> Option<T> {
			match patch {
				Patch::Undefined => current.clone(),
				Patch::Null => None,
				Patch::Value(v) => Some(v.clone()),
			}
		}
		DocSettings {
			wip_limit: field(&self.wip_limit, &base.wip_limit),
			claim_duration_seconds: field(
				&self.claim_duration_seconds,
				&base.claim_duration_seconds,
			),
			allowed_append_types: field(
				&self.allowed_append_types,
				&base.allowed_append_types,
			),
			labels: field(&self.labels, &base.labels),
		}
	}
}

#[derive(Debug, Clone)]
pub struct FileRow {
	pub file_rid: i64,
	pub ws: WsRid,
	pub path: Box<str>,
	pub filename: Box<str>,
	pub folder: Box<str>,
	pub content: Box<str>,
	pub etag: Box<str>,
	pub size: i64,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	pub deleted_at: Option<Timestamp>,
	pub delete_expires_at: Option<Timestamp>,
	pub settings: DocSettings,
	/// Current value of the append allocation counter (== MAX(seq))
	pub append_count: i64,
	/// Folder placeholder rows are hidden from listings and reads
	pub marker: bool,
}

#[derive(Debug)]
pub struct PutFileOutcome {
	pub file: FileRow,
	pub created: bool,
}

// Workspaces
//************

#[derive(Debug, Clone)]
pub struct WorkspaceRow {
	pub ws: WsRid,
	pub workspace_id: Box<str>,
	pub name: Option<Box<str>>,
	pub created_at: Timestamp,
	pub claimed_at: Option<Timestamp>,
	pub claimed_by_email: Option<Box<str>>,
}

// Folders
//*********

#[derive(Debug, Clone)]
pub struct FolderFileInfo {
	pub path: Box<str>,
	pub name: Box<str>,
	pub size: i64,
	pub updated_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct FolderListing {
	pub files: Vec<FolderFileInfo>,
	pub folders: Vec<Box<str>>,
	pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FolderStats {
	#[serde(rename = "fileCount")]
	pub file_count: u64,
	#[serde(rename = "folderCount")]
	pub folder_count: u64,
	#[serde(rename = "totalSize")]
	pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
	pub path: Box<str>,
	pub name: Box<str>,
	pub size: i64,
	pub updated_at: Timestamp,
	pub etag: Box<str>,
	/// "content" or "append"
	pub matched_in: Box<str>,
	pub snippet: Option<Box<str>>,
}

// Webhooks
//**********

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
	Active,
	Disabled,
}

#[derive(Debug, Clone)]
pub struct WebhookRow {
	pub webhook_id: Box<str>,
	pub ws: WsRid,
	pub scope_type: ScopeType,
	pub scope_path: Box<str>,
	pub url: Box<str>,
	pub events: Box<[Box<str>]>,
	pub filter_authors: Option<Box<[Box<str>]>>,
	pub filter_append_types: Option<Box<[AppendType]>>,
	pub recursive: bool,
	pub include_urls: bool,
	pub secret: Box<str>,
	pub status: WebhookStatus,
	pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct NewWebhook<'a> {
	pub webhook_id: &'a str,
	pub scope_type: ScopeType,
	pub scope_path: &'a str,
	pub url: &'a str,
	pub events: &'a [Box<str>],
	pub filter_authors: Option<&'a [Box<str>]>,
	pub filter_append_types: Option<&'a [AppendType]>,
	pub recursive: bool,
	pub include_urls: bool,
	pub secret: &'a str,
}

// Idempotency
//*************

#[derive(Debug, Clone)]
pub struct IdempotencyRow {
	pub request_digest: Box<str>,
	pub response_status: u16,
	pub response_body: Box<str>,
}

// The adapter trait
//*******************

#[async_trait]
pub trait StoreAdapter: Send + Sync + Debug {
	// Workspaces
	async fn create_workspace(&self, workspace_id: &str, name: Option<&str>) -> ApiResult<WsRid>;
	async fn read_workspace(&self, ws: WsRid) -> ApiResult<WorkspaceRow>;
	/// One-way transition; `Error::WorkspaceAlreadyClaimed` on a second claim
	async fn claim_workspace(&self, ws: WsRid, email: &str) -> ApiResult<WorkspaceRow>;

	// Workspace-level default settings
	async fn read_workspace_settings(&self, ws: WsRid) -> ApiResult<DocSettings>;
	async fn update_workspace_settings(
		&self,
		ws: WsRid,
		patch: &DocSettingsPatch,
	) -> ApiResult<DocSettings>;

	// Capability keys
	async fn create_key(&self, ws: WsRid, opts: &CreateKeyOptions<'_>) -> ApiResult<KeyRecord>;
	/// Lookup by hash; returns revoked/expired records as-is (the engine
	/// orders the failure taxonomy)
	async fn resolve_key(&self, key_hash: &str) -> ApiResult<Option<KeyRecord>>;
	async fn list_keys(&self, ws: WsRid, include_revoked: bool) -> ApiResult<Vec<KeyRecord>>;
	async fn revoke_key(&self, ws: WsRid, key_id: i64) -> ApiResult<()>;
	/// Revoke every live key scoped to exactly this file path; returns count
	async fn revoke_file_keys(&self, ws: WsRid, path: &str) -> ApiResult<u32>;

	// Files
	#[allow(clippy::too_many_arguments)]
	async fn put_file(
		&self,
		ws: WsRid,
		path: &str,
		content: &str,
		etag: &str,
		if_match: Option<&str>,
		now: Timestamp,
	) -> ApiResult<PutFileOutcome>;
	/// Soft-deleted rows surface as `Error::FileDeleted`, missing rows as
	/// `Error::FileNotFound`
	async fn read_file(&self, ws: WsRid, path: &str) -> ApiResult<FileRow>;
	async fn soft_delete_file(
		&self,
		ws: WsRid,
		path: &str,
		delete_expires_at: Timestamp,
	) -> ApiResult<FileRow>;
	/// Permanent removal of the row and its appends
	async fn purge_file(&self, ws: WsRid, path: &str) -> ApiResult<()>;
	async fn recover_file(&self, ws: WsRid, path: &str) -> ApiResult<FileRow>;
	/// Rename and move also rewrite the scope paths of file-scoped keys and
	/// webhooks in the same transaction
	async fn rename_file(
		&self,
		ws: WsRid,
		path: &str,
		new_filename: &str,
		now: Timestamp,
	) -> ApiResult<FileRow>;
	async fn move_file(
		&self,
		ws: WsRid,
		source: &str,
		dest_path: &str,
		now: Timestamp,
	) -> ApiResult<FileRow>;
	async fn update_file_settings(
		&self,
		ws: WsRid,
		path: &str,
		patch: &DocSettingsPatch,
	) -> ApiResult<DocSettings>;

	// Appends
	async fn list_appends(&self, ws: WsRid, path: &str) -> ApiResult<(FileRow, Vec<AppendRow>)>;
	async fn read_append(&self, ws: WsRid, path: &str, seq: i64) -> ApiResult<AppendRow>;
	/// Validate and persist a batch atomically. The adapter takes the file's
	/// write lock (counter bump), loads the log, runs the pure planner from
	/// `crate::append::engine`, and applies the plan. Any validation failure
	/// rolls back the whole batch.
	async fn append_batch(
		&self,
		ws: WsRid,
		path: &str,
		inputs: &[AppendInput],
		ctx: &AppendContext,
	) -> ApiResult<AppendOutcome>;

	// Folders
	async fn list_folder(&self, ws: WsRid, folder: &str, limit: u32) -> ApiResult<FolderListing>;
	async fn create_folder(&self, ws: WsRid, path: &str, now: Timestamp) -> ApiResult<()>;
	async fn folder_stats(&self, ws: WsRid, folder: &str) -> ApiResult<FolderStats>;
	async fn search_files(
		&self,
		ws: WsRid,
		folder: &str,
		q: &str,
		limit: u32,
	) -> ApiResult<Vec<SearchHit>>;
	/// All live files under a prefix (markers excluded), for export
	async fn list_files_recursive(&self, ws: WsRid, folder: &str) -> ApiResult<Vec<FileRow>>;
	async fn cascade_delete_folder(
		&self,
		ws: WsRid,
		folder: &str,
		delete_expires_at: Timestamp,
	) -> ApiResult<u32>;
	/// Fails with `FolderNotEmpty` when live files remain under the prefix
	async fn delete_empty_folder(&self, ws: WsRid, folder: &str) -> ApiResult<()>;
	/// Rewrites every contained path plus key/webhook scopes in one
	/// transaction; `Conflict` when the target prefix is occupied
	async fn rename_folder(
		&self,
		ws: WsRid,
		folder: &str,
		new_folder: &str,
		now: Timestamp,
	) -> ApiResult<u32>;

	// Webhooks
	async fn create_webhook(&self, ws: WsRid, opts: &NewWebhook<'_>) -> ApiResult<WebhookRow>;
	async fn list_webhooks(&self, ws: WsRid) -> ApiResult<Vec<WebhookRow>>;
	async fn delete_webhook(&self, ws: WsRid, webhook_id: &str) -> ApiResult<()>;

	// Idempotency records
	async fn read_idempotency(
		&self,
		ws: WsRid,
		route: &str,
		key: &str,
	) -> ApiResult<Option<IdempotencyRow>>;
	#[allow(clippy::too_many_arguments)]
	async fn store_idempotency(
		&self,
		ws: WsRid,
		route: &str,
		key: &str,
		digest: &str,
		status: u16,
		body: &str,
		now: Timestamp,
	) -> ApiResult<()>;

	// Maintenance (driven by the scheduler)
	async fn purge_expired_files(&self, now: Timestamp) -> ApiResult<u64>;
	async fn purge_idempotency_records(&self, older_than: Timestamp) -> ApiResult<u64>;
}

// vim: ts=4
