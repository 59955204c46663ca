//! Common types used throughout mdvault.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;

// WsRid //
//*******//
/// Internal workspace row id. Never serialized to the wire; the public
/// identifier is the `ws_…` workspace id string.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct WsRid(pub i64);

impl std::fmt::Display for WsRid {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

// Timestamp //
//***********//
/// Millisecond-precision UTC timestamp. Stored as epoch milliseconds,
/// serialized on the wire as ISO-8601 with exactly three fractional digits
/// (`2026-01-31T12:00:00.000Z`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_millis() as i64)
	}

	pub fn from_now_secs(delta: i64) -> Timestamp {
		Timestamp(Self::now().0 + delta * 1000)
	}

	pub fn add_seconds(&self, seconds: i64) -> Timestamp {
		Timestamp(self.0 + seconds * 1000)
	}

	pub fn as_millis(&self) -> i64 {
		self.0
	}

	/// ISO-8601 UTC representation with millisecond precision
	pub fn to_iso(&self) -> String {
		chrono::DateTime::from_timestamp_millis(self.0)
			.unwrap_or_default()
			.format("%Y-%m-%dT%H:%M:%S%.3fZ")
			.to_string()
	}

	pub fn parse_iso(s: &str) -> Option<Timestamp> {
		chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| Timestamp(dt.timestamp_millis()))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.to_iso())
	}
}

impl std::cmp::PartialEq for Timestamp {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl std::cmp::Eq for Timestamp {}

impl std::cmp::PartialOrd for Timestamp {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::cmp::Ord for Timestamp {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.cmp(&other.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_iso())
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Timestamp::parse_iso(&s)
			.ok_or_else(|| serde::de::Error::custom("expected an ISO-8601 UTC timestamp"))
	}
}

// Patch<T> - for PATCH semantics //
//********************************//
/// Represents a field in a PATCH request with three states:
/// - `Undefined`: field not present - don't change the existing value
/// - `Null`: field present with null - clear the value
/// - `Value(T)`: field present - update to this value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn is_value(&self) -> bool {
		matches!(self, Patch::Value(_))
	}

	pub fn value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn map<U, F>(self, f: F) -> Patch<U>
	where
		F: FnOnce(T) -> U,
	{
		match self {
			Patch::Undefined => Patch::Undefined,
			Patch::Null => Patch::Null,
			Patch::Value(v) => Patch::Value(f(v)),
		}
	}
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
	T: Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<T>::deserialize(deserializer).map(|opt| match opt {
			None => Patch::Null,
			Some(v) => Patch::Value(v),
		})
	}
}

// API Response Envelope //
//***********************//

/// Success response envelope: `{ ok: true, data, serverTime? }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
	pub ok: bool,
	pub data: T,
	#[serde(rename = "serverTime", skip_serializing_if = "Option::is_none")]
	pub server_time: Option<Timestamp>,
}

impl<T> ApiResponse<T> {
	pub fn new(data: T) -> Self {
		Self { ok: true, data, server_time: None }
	}

	/// Mutation responses carry the server clock alongside the data
	pub fn with_server_time(data: T) -> Self {
		Self { ok: true, data, server_time: Some(Timestamp::now()) }
	}
}

/// Error response envelope: `{ ok: false, error: { code, message, details? } }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub ok: bool,
	pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			ok: false,
			error: ErrorDetails { code: code.into(), message: message.into(), details: None },
		}
	}

	pub fn with_details(mut self, details: serde_json::Value) -> Self {
		self.error.details = Some(details);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timestamp_wire_format() {
		let ts = Timestamp(1_700_000_000_123);
		let iso = ts.to_iso();
		assert!(iso.ends_with('Z'));
		assert_eq!(iso, "2023-11-14T22:13:20.123Z");
		assert_eq!(Timestamp::parse_iso(&iso), Some(ts));
	}

	#[test]
	fn timestamp_wire_format_matches_contract_regex() {
		let iso = Timestamp::now().to_iso();
		// ^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$
		let bytes = iso.as_bytes();
		assert_eq!(bytes.len(), 24);
		assert_eq!(bytes[10], b'T');
		assert_eq!(bytes[19], b'.');
		assert_eq!(bytes[23], b'Z');
	}

	#[test]
	fn patch_deserialization_states() {
		#[derive(Deserialize)]
		struct Req {
			#[serde(default)]
			name: Patch<String>,
			#[serde(default)]
			limit: Patch<u32>,
		}

		let req: Req = serde_json::from_str(r#"{"limit": null}"#).unwrap();
		assert!(req.name.is_undefined());
		assert!(req.limit.is_null());

		let req: Req = serde_json::from_str(r#"{"name": "x", "limit": 3}"#).unwrap();
		assert_eq!(req.name.value().map(String::as_str), Some("x"));
		assert_eq!(req.limit.value(), Some(&3));
	}

	#[test]
	fn envelope_shapes() {
		let ok = serde_json::to_value(ApiResponse::new(42)).unwrap();
		assert_eq!(ok["ok"], true);
		assert_eq!(ok["data"], 42);
		assert!(ok.get("serverTime").is_none());

		let err = serde_json::to_value(ErrorResponse::new("FILE_NOT_FOUND", "File not found"))
			.unwrap();
		assert_eq!(err["ok"], false);
		assert_eq!(err["error"]["code"], "FILE_NOT_FOUND");
	}
}

// vim: ts=4
