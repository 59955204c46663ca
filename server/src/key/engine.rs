//! Capability key engine: minting, resolution, authorization.
//!
//! Keys are the sole bearer authority; there is no ambient authentication.
//! Only the SHA-256 hash of a key is stored, so a database leak does not
//! expose live URLs. All resolution/authorization failures surface as 404 on
//! the wire (capability-URL confidentiality).

use rand::{distr::Alphanumeric, RngExt};

use crate::core::etag::sha256_hex;
use crate::prelude::*;
use crate::store_adapter::{
	AppendType, CreateKeyOptions, KeyRecord, Permission, ScopeType,
};

/// Plaintext key length (base62, CSPRNG). 24 chars ≈ 143 bits of entropy.
pub const KEY_LEN: usize = 24;
/// Shortest plaintext we even bother hashing
const MIN_KEY_LEN: usize = 16;
/// First characters of the plaintext, kept for listings
const PREFIX_LEN: usize = 8;

/// Authors an append may never impersonate
pub const RESERVED_AUTHORS: &[&str] = &["system", "mdvault"];

/// Random base62 token of the given length
pub fn generate_token(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Generate a fresh plaintext key and its listing prefix
pub fn generate_key() -> (String, String) {
	let plaintext = generate_token(KEY_LEN);
	let prefix = plaintext[..PREFIX_LEN].to_string();
	(plaintext, prefix)
}

pub fn hash_key(plaintext: &str) -> String {
	sha256_hex(plaintext.as_bytes())
}

/// Resolve a plaintext key from the URL. Failure order: malformed, unknown,
/// revoked, expired.
pub async fn resolve(app: &App, plaintext: &str) -> ApiResult<KeyRecord> {
	if plaintext.len() < MIN_KEY_LEN || !plaintext.bytes().all(|b| b.is_ascii_alphanumeric()) {
		return Err(Error::InvalidKey);
	}

	let record = app
		.store
		.resolve_key(&hash_key(plaintext))
		.await?
		.ok_or(Error::InvalidKey)?;

	if record.revoked_at.is_some() {
		return Err(Error::KeyRevoked);
	}
	if let Some(expires_at) = record.expires_at {
		if expires_at <= Timestamp::now() {
			return Err(Error::KeyExpired);
		}
	}

	Ok(record)
}

/// Permission hierarchy check: write ⊃ append ⊃ read
pub fn authorize(key: &KeyRecord, required: Permission) -> ApiResult<()> {
	if key.permission.allows(required) {
		Ok(())
	} else {
		Err(Error::PermissionDenied(format!(
			"this key does not grant {} access",
			required.as_str()
		)))
	}
}

/// Scope containment for a normalized request path
pub fn check_scope(key: &KeyRecord, path: &str) -> ApiResult<()> {
	let ok = match key.scope_type {
		ScopeType::Workspace => true,
		ScopeType::Folder => crate::core::path::is_within(path, &key.scope_path),
		ScopeType::File => path == key.scope_path.as_ref(),
	};
	if ok {
		Ok(())
	} else {
		Err(Error::PermissionDenied("request path is outside of key scope".into()))
	}
}

/// Author character class + reserved-name check
pub fn validate_author(author: &str) -> ApiResult<()> {
	if author.is_empty() || author.len() > 64 {
		return Err(Error::InvalidAuthor("author must be 1-64 characters".into()));
	}
	if !author.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-') {
		return Err(Error::InvalidAuthor(
			"author may only contain letters, digits, '_', '.' and '-'".into(),
		));
	}
	if RESERVED_AUTHORS.contains(&author) {
		return Err(Error::InvalidAuthor(format!("'{}' is a reserved author name", author)));
	}
	Ok(())
}

/// Author-binding constraint carried by scoped keys
pub fn check_author(key: &KeyRecord, author: &str) -> ApiResult<()> {
	if let Some(bound) = &key.bound_author {
		if bound.as_ref() != author {
			return Err(Error::PermissionDenied(format!(
				"this key is bound to author '{}'",
				bound
			)));
		}
	}
	Ok(())
}

/// One freshly minted key: the record plus the plaintext (returned once)
pub struct MintedKey {
	pub record: KeyRecord,
	pub plaintext: String,
}

#[derive(Debug, Default)]
pub struct MintSpec<'a> {
	pub permission: Permission,
	pub scope_type: ScopeType,
	pub scope_path: &'a str,
	pub bound_author: Option<&'a str>,
	pub wip_limit: Option<u32>,
	pub allowed_types: Option<&'a [AppendType]>,
	pub display_name: Option<&'a str>,
	pub expires_at: Option<Timestamp>,
}

pub async fn mint(app: &App, ws: WsRid, spec: &MintSpec<'_>) -> ApiResult<MintedKey> {
	let (plaintext, prefix) = generate_key();
	let record = app
		.store
		.create_key(
			ws,
			&CreateKeyOptions {
				prefix: &prefix,
				key_hash: &hash_key(&plaintext),
				permission: spec.permission,
				scope_type: spec.scope_type,
				scope_path: spec.scope_path,
				bound_author: spec.bound_author,
				wip_limit: spec.wip_limit,
				allowed_types: spec.allowed_types,
				display_name: spec.display_name,
				expires_at: spec.expires_at,
			},
		)
		.await?;
	Ok(MintedKey { record, plaintext })
}

/// Read/append/write triple over one scope. Used at bootstrap (workspace
/// scope) and at file creation / rotation (file scope).
pub async fn mint_triple(
	app: &App,
	ws: WsRid,
	scope_type: ScopeType,
	scope_path: &str,
) -> ApiResult<[MintedKey; 3]> {
	let read = mint(
		app,
		ws,
		&MintSpec { permission: Permission::Read, scope_type, scope_path, ..Default::default() },
	)
	.await?;
	let append = mint(
		app,
		ws,
		&MintSpec { permission: Permission::Append, scope_type, scope_path, ..Default::default() },
	)
	.await?;
	let write = mint(
		app,
		ws,
		&MintSpec { permission: Permission::Write, scope_type, scope_path, ..Default::default() },
	)
	.await?;
	Ok([read, append, write])
}

/// Capability URL set for one scope, rendered from a minted triple
#[derive(Debug, serde::Serialize)]
pub struct KeyUrls {
	pub read: String,
	pub append: String,
	pub write: String,
}

impl KeyUrls {
	pub fn from_triple(base_url: &str, triple: &[MintedKey; 3]) -> Self {
		let render = |key: &MintedKey| {
			format!("{}/{}/{}", base_url, key.record.permission.url_prefix(), key.plaintext)
		};
		KeyUrls { read: render(&triple[0]), append: render(&triple[1]), write: render(&triple[2]) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(permission: Permission, scope_type: ScopeType, scope_path: &str) -> KeyRecord {
		KeyRecord {
			key_id: 1,
			ws: WsRid(1),
			workspace_id: "ws_abcdefGHIJ1234".into(),
			prefix: "abcd1234".into(),
			permission,
			scope_type,
			scope_path: scope_path.into(),
			bound_author: None,
			wip_limit: None,
			allowed_types: None,
			display_name: None,
			created_at: Timestamp::now(),
			expires_at: None,
			revoked_at: None,
		}
	}

	#[test]
	fn generated_keys_are_base62_and_long_enough() {
		let (plaintext, prefix) = generate_key();
		assert_eq!(plaintext.len(), KEY_LEN);
		assert!(plaintext.len() >= 22);
		assert!(plaintext.bytes().all(|b| b.is_ascii_alphanumeric()));
		assert!(plaintext.starts_with(&prefix));
	}

	#[test]
	fn permission_hierarchy() {
		let write = record(Permission::Write, ScopeType::Workspace, "/");
		assert!(authorize(&write, Permission::Read).is_ok());
		assert!(authorize(&write, Permission::Append).is_ok());
		assert!(authorize(&write, Permission::Write).is_ok());

		let read = record(Permission::Read, ScopeType::Workspace, "/");
		assert!(authorize(&read, Permission::Read).is_ok());
		assert!(matches!(authorize(&read, Permission::Write), Err(Error::PermissionDenied(_))));
	}

	#[test]
	fn folder_scope_respects_boundaries() {
		let key = record(Permission::Read, ScopeType::Folder, "/docs");
		assert!(check_scope(&key, "/docs/a.md").is_ok());
		assert!(check_scope(&key, "/docs").is_ok());
		let err = check_scope(&key, "/docs-other/a.md").unwrap_err();
		match err {
			Error::PermissionDenied(msg) => assert!(msg.contains("outside of key scope")),
			other => panic!("unexpected error: {:?}", other),
		}
	}

	#[test]
	fn file_scope_is_exact() {
		let key = record(Permission::Write, ScopeType::File, "/notes.md");
		assert!(check_scope(&key, "/notes.md").is_ok());
		assert!(check_scope(&key, "/notes.md.bak").is_err());
		assert!(check_scope(&key, "/").is_err());
	}

	#[test]
	fn author_validation() {
		assert!(validate_author("alice-2.bot_x").is_ok());
		assert!(validate_author("").is_err());
		assert!(validate_author("has space").is_err());
		assert!(validate_author("system").is_err());
	}
}

// vim: ts=4
