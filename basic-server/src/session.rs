//! HMAC-signed session cookies.
//!
//! The OAuth frontend (out of scope here) is expected to set a `session`
//! cookie of the form `<email>.<hex hmac-sha256(email, secret)>`. This
//! adapter verifies the signature and hands the email to the claim endpoint.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use mdvault::prelude::*;
use mdvault::session_adapter::SessionAdapter;

#[derive(Debug)]
pub struct HmacSessionAdapter {
	secret: Box<str>,
}

impl HmacSessionAdapter {
	pub fn new(secret: impl Into<Box<str>>) -> Self {
		Self { secret: secret.into() }
	}

	fn sign(&self, email: &str) -> Option<String> {
		let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).ok()?;
		mac.update(email.as_bytes());
		let digest = mac.finalize().into_bytes();
		Some(digest.iter().map(|b| format!("{:02x}", b)).collect())
	}

	/// Mint a cookie value; useful for local testing against a dev server
	pub fn cookie_for(&self, email: &str) -> Option<String> {
		Some(format!("{}.{}", email, self.sign(email)?))
	}
}

#[async_trait]
impl SessionAdapter for HmacSessionAdapter {
	async fn verify_session(&self, cookie_value: &str) -> ApiResult<Box<str>> {
		let (email, signature) = cookie_value.rsplit_once('.').ok_or(Error::Unauthorized)?;
		if email.is_empty() || !email.contains('@') {
			return Err(Error::Unauthorized);
		}
		let expected = self.sign(email).ok_or(Error::Unauthorized)?;
		// constant-time-ish compare; both sides are fixed-length hex
		let matches = expected.len() == signature.len()
			&& expected
				.bytes()
				.zip(signature.bytes())
				.fold(0u8, |acc, (a, b)| acc | (a ^ b))
				== 0;
		if !matches {
			return Err(Error::Unauthorized);
		}
		Ok(email.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn round_trip_verifies() {
		let sessions = HmacSessionAdapter::new("test-secret");
		let cookie = sessions.cookie_for("a@example.com").unwrap();
		let email = sessions.verify_session(&cookie).await.unwrap();
		assert_eq!(email.as_ref(), "a@example.com");
	}

	#[tokio::test]
	async fn tampered_cookies_are_rejected() {
		let sessions = HmacSessionAdapter::new("test-secret");
		let cookie = sessions.cookie_for("a@example.com").unwrap();
		let tampered = cookie.replace("a@example.com", "b@example.com");
		assert!(sessions.verify_session(&tampered).await.is_err());
		assert!(sessions.verify_session("no-dot-here").await.is_err());
	}
}

// vim: ts=4
