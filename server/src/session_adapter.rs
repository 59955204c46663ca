//! Adapter seam for the external OAuth session backend.
//!
//! Only the workspace-claim endpoint consults sessions; everything else runs
//! purely on capability keys.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::prelude::*;

#[async_trait]
pub trait SessionAdapter: Send + Sync + Debug {
	/// Resolve a `session` cookie value to the authenticated email address.
	/// Invalid or expired sessions fail with `Error::Unauthorized`.
	async fn verify_session(&self, cookie_value: &str) -> ApiResult<Box<str>>;
}

/// Default adapter when no session backend is wired: every claim attempt is
/// rejected as unauthenticated.
#[derive(Debug, Default)]
pub struct DenySessions;

#[async_trait]
impl SessionAdapter for DenySessions {
	async fn verify_session(&self, _cookie_value: &str) -> ApiResult<Box<str>> {
		Err(Error::Unauthorized)
	}
}

// vim: ts=4
