//! Content digests: etags and export checksums.

use sha2::{Digest, Sha256};

/// Compute the etag for file content: the first 8 bytes of a SHA-256 digest,
/// rendered as 16 lowercase hex characters. Collisions only affect optimistic
/// concurrency, so a truncated digest is sufficient.
pub fn content_etag(content: &[u8]) -> Box<str> {
	let digest = Sha256::digest(content);
	let mut out = String::with_capacity(16);
	for byte in &digest[..8] {
		out.push_str(&format!("{:02x}", byte));
	}
	out.into()
}

/// Full SHA-256 hex digest, used for export checksums and request digests
pub fn sha256_hex(data: &[u8]) -> String {
	let digest = Sha256::digest(data);
	digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn etag_is_16_lowercase_hex() {
		let etag = content_etag(b"# Hi");
		assert_eq!(etag.len(), 16);
		assert!(etag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn etag_changes_iff_content_changes() {
		assert_eq!(content_etag(b"same"), content_etag(b"same"));
		assert_ne!(content_etag(b"same"), content_etag(b"different"));
	}

	#[test]
	fn sha256_hex_is_stable() {
		assert_eq!(
			sha256_hex(b""),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
	}
}

// vim: ts=4
