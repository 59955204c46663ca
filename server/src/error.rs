//! Error handling subsystem. Implements the wire-level error taxonomy.
//!
//! Every failure the server can surface is a variant here, carrying its wire
//! code and HTTP status. Capability-key failures deliberately map to 404 so
//! that probing a URL reveals nothing about workspace existence.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::prelude::*;
use crate::types::{ErrorResponse, Timestamp};

pub type ApiResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Input validation (rejected before any transaction)
	InvalidRequest(String),
	InvalidPath(String),
	InvalidAuthor(String),
	InvalidWebhookUrl(String),
	InvalidEventType(String),
	ConfirmPathMismatch,
	TypeNotAllowed(String),
	PayloadTooLarge { limit: u64 },

	// Capability keys (all 404 on the wire)
	InvalidKey,
	KeyRevoked,
	KeyExpired,
	PermissionDenied(String),

	// Missing resources
	NotFound,
	FileNotFound,
	FolderNotFound,
	SectionNotFound,
	AppendNotFound,
	WebhookNotFound,
	FileDeleted { expires_at: Option<Timestamp> },

	// State conflicts
	Conflict(String),        // 409 - duplicate path, folder create, move target
	EtagMismatch,            // 412 - If-Match precondition failed
	FolderNotEmpty,          // 409 - delete without cascade
	TaskAlreadyComplete,     // 400 - claim on a done task
	AlreadyClaimed { claimed_by: Box<str>, expires_at: Timestamp, retry_after_ms: i64 },
	WorkspaceAlreadyClaimed, // 400 - contractually 400, not 409
	WipLimitExceeded { current_count: u32, limit: u32 },
	IdempotencyMismatch,     // 409 - same key, different request digest

	// Auth (only the workspace claim endpoint uses a session)
	Unauthorized,

	// Rate limiting
	RateLimited { retry_after: u64 },

	// Internal failures (never leak detail to the wire)
	DbError,
	Internal(String),
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json serialization error: {}", err);
		Self::Internal("serialization failed".into())
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", err);
		Self::Internal("background task failed".into())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl Error {
	/// Wire code for this error (stable, part of the API contract)
	pub fn code(&self) -> &'static str {
		match self {
			Error::InvalidRequest(_) => "INVALID_REQUEST",
			Error::InvalidPath(_) => "INVALID_PATH",
			Error::InvalidAuthor(_) => "INVALID_AUTHOR",
			Error::InvalidWebhookUrl(_) => "INVALID_WEBHOOK_URL",
			Error::InvalidEventType(_) => "INVALID_EVENT_TYPE",
			Error::ConfirmPathMismatch => "CONFIRM_PATH_MISMATCH",
			Error::TypeNotAllowed(_) => "TYPE_NOT_ALLOWED",
			Error::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
			Error::InvalidKey => "INVALID_KEY",
			Error::KeyRevoked => "KEY_REVOKED",
			Error::KeyExpired => "KEY_EXPIRED",
			Error::PermissionDenied(_) => "PERMISSION_DENIED",
			Error::NotFound => "NOT_FOUND",
			Error::FileNotFound => "FILE_NOT_FOUND",
			Error::FolderNotFound => "FOLDER_NOT_FOUND",
			Error::SectionNotFound => "SECTION_NOT_FOUND",
			Error::AppendNotFound => "APPEND_NOT_FOUND",
			Error::WebhookNotFound => "WEBHOOK_NOT_FOUND",
			Error::FileDeleted { .. } => "FILE_DELETED",
			Error::Conflict(_) | Error::EtagMismatch | Error::IdempotencyMismatch => "CONFLICT",
			Error::FolderNotEmpty => "FOLDER_NOT_EMPTY",
			Error::TaskAlreadyComplete => "TASK_ALREADY_COMPLETE",
			Error::AlreadyClaimed { .. } | Error::WorkspaceAlreadyClaimed => "ALREADY_CLAIMED",
			Error::WipLimitExceeded { .. } => "WIP_LIMIT_EXCEEDED",
			Error::Unauthorized => "UNAUTHORIZED",
			Error::RateLimited { .. } => "RATE_LIMITED",
			Error::DbError | Error::Internal(_) | Error::Io(_) => "INTERNAL",
		}
	}

	pub fn status(&self) -> StatusCode {
		match self {
			Error::InvalidRequest(_)
			| Error::InvalidPath(_)
			| Error::InvalidAuthor(_)
			| Error::InvalidWebhookUrl(_)
			| Error::InvalidEventType(_)
			| Error::ConfirmPathMismatch
			| Error::TypeNotAllowed(_)
			| Error::TaskAlreadyComplete
			| Error::WorkspaceAlreadyClaimed => StatusCode::BAD_REQUEST,
			Error::Unauthorized => StatusCode::UNAUTHORIZED,
			Error::InvalidKey
			| Error::KeyRevoked
			| Error::KeyExpired
			| Error::PermissionDenied(_)
			| Error::NotFound
			| Error::FileNotFound
			| Error::FolderNotFound
			| Error::SectionNotFound
			| Error::AppendNotFound
			| Error::WebhookNotFound => StatusCode::NOT_FOUND,
			Error::FileDeleted { .. } => StatusCode::GONE,
			Error::Conflict(_)
			| Error::FolderNotEmpty
			| Error::AlreadyClaimed { .. }
			| Error::IdempotencyMismatch => StatusCode::CONFLICT,
			Error::EtagMismatch => StatusCode::PRECONDITION_FAILED,
			Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
			Error::WipLimitExceeded { .. } | Error::RateLimited { .. } => {
				StatusCode::TOO_MANY_REQUESTS
			}
			Error::DbError | Error::Internal(_) | Error::Io(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}

	fn message(&self) -> String {
		match self {
			Error::InvalidRequest(msg) => format!("Invalid request: {}", msg),
			Error::InvalidPath(msg) => format!("Invalid path: {}", msg),
			Error::InvalidAuthor(msg) => format!("Invalid author: {}", msg),
			Error::InvalidWebhookUrl(msg) => format!("Invalid webhook URL: {}", msg),
			Error::InvalidEventType(msg) => format!("Unknown event type: {}", msg),
			Error::ConfirmPathMismatch => {
				"confirmPath does not match the folder being deleted".into()
			}
			Error::TypeNotAllowed(typ) => {
				format!("Append type '{}' is not allowed by this key or file", typ)
			}
			Error::PayloadTooLarge { limit } => {
				format!("Content exceeds the maximum size of {} bytes", limit)
			}
			Error::InvalidKey => "Invalid key".into(),
			Error::KeyRevoked => "This key has been revoked".into(),
			Error::KeyExpired => "This key has expired".into(),
			Error::PermissionDenied(msg) => msg.clone(),
			Error::NotFound => "Resource not found".into(),
			Error::FileNotFound => "File not found".into(),
			Error::FolderNotFound => "Folder not found".into(),
			Error::SectionNotFound => "Section not found".into(),
			Error::AppendNotFound => "Append not found".into(),
			Error::WebhookNotFound => "Webhook not found".into(),
			Error::FileDeleted { .. } => "File has been deleted".into(),
			Error::Conflict(msg) => format!("Conflict: {}", msg),
			Error::EtagMismatch => "ETag does not match current file version".into(),
			Error::IdempotencyMismatch => {
				"Idempotency-Key was already used with a different request".into()
			}
			Error::FolderNotEmpty => "Folder is not empty; pass cascade=true to delete".into(),
			Error::TaskAlreadyComplete => "Task is already complete".into(),
			Error::AlreadyClaimed { claimed_by, .. } => {
				format!("Task is already claimed by '{}'", claimed_by)
			}
			Error::WorkspaceAlreadyClaimed => "Workspace is already claimed".into(),
			Error::WipLimitExceeded { current_count, limit } => format!(
				"Work-in-progress limit reached ({} of {} active claims)",
				current_count, limit
			),
			Error::Unauthorized => "Authentication required".into(),
			Error::RateLimited { .. } => "Rate limit exceeded".into(),
			// Server errors: no detail exposure
			Error::DbError | Error::Internal(_) | Error::Io(_) => "Internal server error".into(),
		}
	}

	fn details(&self) -> Option<serde_json::Value> {
		match self {
			Error::AlreadyClaimed { claimed_by, expires_at, retry_after_ms } => Some(json!({
				"claimedBy": claimed_by,
				"expiresAt": expires_at,
				"retryAfterMs": retry_after_ms,
			})),
			Error::WipLimitExceeded { current_count, limit } => Some(json!({
				"currentCount": current_count,
				"limit": limit,
			})),
			Error::FileDeleted { expires_at: Some(expires_at) } => Some(json!({
				"recoverable": true,
				"expiresAt": expires_at,
			})),
			_ => None,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		if matches!(self, Error::DbError | Error::Internal(_) | Error::Io(_)) {
			warn!("internal error: {:?}", self);
		}

		let status = self.status();
		let mut response = ErrorResponse::new(self.code(), self.message());
		if let Some(details) = self.details() {
			response = response.with_details(details);
		}

		let mut res = (status, Json(response)).into_response();
		match self {
			Error::PayloadTooLarge { limit } => {
				if let Ok(value) = limit.to_string().parse() {
					res.headers_mut().insert("X-Content-Size-Limit", value);
				}
			}
			Error::RateLimited { retry_after } => {
				if let Ok(value) = retry_after.to_string().parse() {
					res.headers_mut().insert("Retry-After", value);
				}
			}
			_ => {}
		}
		res
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_failures_are_masked_as_404() {
		for err in [
			Error::InvalidKey,
			Error::KeyRevoked,
			Error::KeyExpired,
			Error::PermissionDenied("request path is outside of key scope".into()),
		] {
			assert_eq!(err.status(), StatusCode::NOT_FOUND);
		}
	}

	#[test]
	fn workspace_claim_conflict_is_400() {
		assert_eq!(Error::WorkspaceAlreadyClaimed.status(), StatusCode::BAD_REQUEST);
		assert_eq!(Error::WorkspaceAlreadyClaimed.code(), "ALREADY_CLAIMED");
	}

	#[test]
	fn task_claim_conflict_is_409() {
		let err = Error::AlreadyClaimed {
			claimed_by: "alice".into(),
			expires_at: Timestamp(0),
			retry_after_ms: 1000,
		};
		assert_eq!(err.status(), StatusCode::CONFLICT);
		assert_eq!(err.code(), "ALREADY_CLAIMED");
	}

	#[test]
	fn internal_messages_stay_neutral() {
		let err = Error::Internal("sqlite disk I/O at /home/user/db".into());
		assert_eq!(err.message(), "Internal server error");
	}
}

// vim: ts=4
