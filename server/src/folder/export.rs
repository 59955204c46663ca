//! Zip archive assembly for folder export. Runs on the worker pool; the
//! archive is deterministic (entries in path order) so the advertised
//! checksum is stable for unchanged content.

use std::io::{Cursor, Write};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::prelude::*;

/// One archive entry: relative name inside the archive plus content
#[derive(Debug, Clone)]
pub struct ExportEntry {
	pub name: String,
	pub content: String,
}

/// Build the export archive: all entries plus a trailing `manifest.json`
pub fn build_zip(mut entries: Vec<ExportEntry>, manifest: serde_json::Value) -> ApiResult<Vec<u8>> {
	entries.sort_by(|a, b| a.name.cmp(&b.name));

	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
	let options = FileOptions::<()>::default()
		.compression_method(CompressionMethod::Deflated)
		.unix_permissions(0o644);

	for entry in &entries {
		writer
			.start_file(entry.name.as_str(), options)
			.map_err(|err| Error::Internal(format!("zip entry failed: {}", err)))?;
		writer.write_all(entry.content.as_bytes())?;
	}

	writer
		.start_file("manifest.json", options)
		.map_err(|err| Error::Internal(format!("zip manifest failed: {}", err)))?;
	writer.write_all(manifest.to_string().as_bytes())?;

	let cursor = writer
		.finish()
		.map_err(|err| Error::Internal(format!("zip finalize failed: {}", err)))?;
	Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn archive_is_nonempty_and_deterministic() {
		let entries = vec![
			ExportEntry { name: "b.md".into(), content: "# B".into() },
			ExportEntry { name: "a.md".into(), content: "# A".into() },
		];
		let manifest = json!({ "fileCount": 2 });
		let first = build_zip(entries.clone(), manifest.clone()).unwrap();
		let second = build_zip(entries, manifest).unwrap();
		assert!(!first.is_empty());
		// zip magic
		assert_eq!(&first[..2], b"PK");
		assert_eq!(first, second);
	}
}

// vim: ts=4
