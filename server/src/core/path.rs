//! Path normalization and validation.
//!
//! Runs before any storage access. The URL router hands over the
//! percent-decoded remainder of the request path; this module bounds it,
//! normalizes slashes, and rejects traversal and control bytes. Backslash is
//! an ordinary byte (paths are not Windows paths).

use crate::prelude::*;

/// Maximum total path length in bytes
pub const MAX_PATH_BYTES: usize = 1024;
/// Maximum length of a single path segment in bytes
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Normalize a decoded request path into canonical absolute form.
///
/// - collapses runs of `/`
/// - strips a trailing `/`
/// - guarantees a leading `/`
///
/// Rejects `..` segments, NUL bytes, control characters, oversized paths and
/// oversized segments with `INVALID_PATH`.
pub fn normalize(raw: &str) -> ApiResult<String> {
	if raw.len() > MAX_PATH_BYTES {
		return Err(Error::InvalidPath(format!("path exceeds {} bytes", MAX_PATH_BYTES)));
	}
	if raw.contains('\0') {
		return Err(Error::InvalidPath("path contains a NUL byte".into()));
	}

	let mut segments: Vec<&str> = Vec::new();
	for segment in raw.split('/') {
		if segment.is_empty() {
			continue; // collapses runs of '/' and ignores leading/trailing
		}
		if segment == ".." || segment == "." {
			return Err(Error::InvalidPath("path traversal is not allowed".into()));
		}
		if segment.len() > MAX_SEGMENT_BYTES {
			return Err(Error::InvalidPath(format!(
				"path segment exceeds {} bytes",
				MAX_SEGMENT_BYTES
			)));
		}
		if segment.chars().any(|c| c.is_control()) {
			return Err(Error::InvalidPath("path contains control characters".into()));
		}
		segments.push(segment);
	}

	let mut path = String::with_capacity(raw.len() + 1);
	for segment in &segments {
		path.push('/');
		path.push_str(segment);
	}
	if path.is_empty() {
		path.push('/');
	}
	if path.len() > MAX_PATH_BYTES {
		return Err(Error::InvalidPath(format!("path exceeds {} bytes", MAX_PATH_BYTES)));
	}

	Ok(path)
}

/// Validate a bare filename (a single segment, used by rename and bulk create)
pub fn validate_filename(name: &str) -> ApiResult<()> {
	if name.is_empty() {
		return Err(Error::InvalidPath("filename must not be empty".into()));
	}
	if name.len() > MAX_SEGMENT_BYTES {
		return Err(Error::InvalidPath(format!("filename exceeds {} bytes", MAX_SEGMENT_BYTES)));
	}
	if name.contains('/') || name == ".." || name == "." {
		return Err(Error::InvalidPath("filename must be a single path segment".into()));
	}
	if name.chars().any(|c| c.is_control()) {
		return Err(Error::InvalidPath("filename contains control characters".into()));
	}
	Ok(())
}

/// Split a normalized path into (folder, filename).
/// `/a/b/c.md` -> (`/a/b`, `c.md`); `/c.md` -> (`/`, `c.md`).
pub fn split(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(0) => ("/", &path[1..]),
		Some(idx) => (&path[..idx], &path[idx + 1..]),
		None => ("/", path),
	}
}

/// The final segment of a normalized path
pub fn basename(path: &str) -> &str {
	split(path).1
}

/// Join a normalized folder path and a filename
pub fn join(folder: &str, name: &str) -> String {
	if folder == "/" {
		format!("/{}", name)
	} else {
		format!("{}/{}", folder, name)
	}
}

/// True if `path` is `folder` itself or lies underneath it.
/// `folder` is normalized; `/` contains everything.
pub fn is_within(path: &str, folder: &str) -> bool {
	if folder == "/" {
		return true;
	}
	path == folder || path.strip_prefix(folder).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_slash_runs_and_trailing_slash() {
		assert_eq!(normalize("a//b///c.md").unwrap(), "/a/b/c.md");
		assert_eq!(normalize("/a/b/").unwrap(), "/a/b");
		assert_eq!(normalize("notes.md").unwrap(), "/notes.md");
		assert_eq!(normalize("").unwrap(), "/");
	}

	#[test]
	fn rejects_traversal() {
		assert!(matches!(normalize("../etc/passwd"), Err(Error::InvalidPath(_))));
		assert!(matches!(normalize("/a/../b"), Err(Error::InvalidPath(_))));
		assert!(matches!(normalize("/a/./b"), Err(Error::InvalidPath(_))));
	}

	#[test]
	fn rejects_nul_and_control_bytes() {
		assert!(matches!(normalize("/a\0b"), Err(Error::InvalidPath(_))));
		assert!(matches!(normalize("/a\x01b"), Err(Error::InvalidPath(_))));
		assert!(matches!(normalize("/a\nb.md"), Err(Error::InvalidPath(_))));
	}

	#[test]
	fn backslash_is_an_ordinary_byte() {
		assert_eq!(normalize("/a\\b.md").unwrap(), "/a\\b.md");
	}

	#[test]
	fn enforces_length_bounds() {
		let long = "a".repeat(MAX_PATH_BYTES + 1);
		assert!(matches!(normalize(&long), Err(Error::InvalidPath(_))));

		let long_segment = format!("/ok/{}", "b".repeat(MAX_SEGMENT_BYTES + 1));
		assert!(matches!(normalize(&long_segment), Err(Error::InvalidPath(_))));

		// exactly at the limit passes
		let at_limit = "c".repeat(MAX_SEGMENT_BYTES);
		assert!(normalize(&at_limit).is_ok());
	}

	#[test]
	fn split_and_join_round_trip() {
		assert_eq!(split("/a/b/c.md"), ("/a/b", "c.md"));
		assert_eq!(split("/c.md"), ("/", "c.md"));
		assert_eq!(join("/", "c.md"), "/c.md");
		assert_eq!(join("/a/b", "c.md"), "/a/b/c.md");
	}

	#[test]
	fn containment_respects_segment_boundaries() {
		assert!(is_within("/docs/a.md", "/docs"));
		assert!(is_within("/docs", "/docs"));
		assert!(!is_within("/docs-other/a.md", "/docs"));
		assert!(is_within("/anything", "/"));
	}
}

// vim: ts=4
