//! The library document: one typed record of named collections, persisted as a
//! single JSON file and replaced atomically on every write.
//!
//! Field names follow the client document format (camelCase). Entities carry a
//! flattened `extra` map so fields this server does not interpret survive a
//! push/pull round-trip unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Epoch zero, used as recency for entities that carry no timestamp at all.
pub(crate) fn epoch() -> DateTime<Utc> {
	DateTime::<Utc>::UNIX_EPOCH
}

/// The authoritative store for a library. Every collection is always present
/// once the document exists; partially-written files are never observable
/// because writes go through temp-file + rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDocument {
	#[serde(default)]
	pub books: Vec<Book>,
	#[serde(default)]
	pub tags: Vec<Tag>,
	#[serde(default)]
	pub annotations: Vec<Annotation>,
	#[serde(default)]
	pub xray_data: Vec<XrayEntry>,
	/// Append-only session records. Never merged: a non-empty pushed batch
	/// replaces the whole collection (see `ops::sync`).
	#[serde(default)]
	pub reading_sessions: Vec<ReadingSession>,
	#[serde(default)]
	pub users: Vec<User>,
	/// Per-user reading progress, composite-keyed by `(userId, bookId)`.
	/// Authoritative over the legacy per-book progress fields on `books`.
	#[serde(default)]
	pub user_book_data: Vec<UserBookData>,
	/// Updated on every successful write.
	#[serde(default = "Utc::now")]
	pub last_sync: DateTime<Utc>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl LibraryDocument {
	/// The empty-collections document used when no file exists yet.
	pub fn skeleton() -> Self {
		Self {
			books: Vec::new(),
			tags: Vec::new(),
			annotations: Vec::new(),
			xray_data: Vec::new(),
			reading_sessions: Vec::new(),
			users: Vec::new(),
			user_book_data: Vec::new(),
			last_sync: Utc::now(),
			extra: Map::new(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub author: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_name: Option<String>,
	/// Legacy single-user progress, percent. `user_book_data` is authoritative
	/// when a userId is known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_position: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_pages: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_page: Option<u64>,
	/// Inline base64 data URI. Stripped from pull responses and by the cover
	/// cleanup job; covers are served on demand by the image pipeline.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cover: Option<String>,
	/// Legacy inline file blob, same treatment as `cover`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub added_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_read_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Book {
	pub fn recency(&self) -> DateTime<Utc> {
		[self.updated_at, self.last_read_at, self.added_at]
			.into_iter()
			.flatten()
			.max()
			.unwrap_or_else(epoch)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Globally unique; merge key when `id` is absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Tag {
	pub fn recency(&self) -> DateTime<Utc> {
		self.created_at.unwrap_or_else(epoch)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub book_id: Option<String>,
	/// Absent on records created before multi-user support.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cfi: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Annotation {
	pub fn recency(&self) -> DateTime<Utc> {
		[self.updated_at, self.created_at]
			.into_iter()
			.flatten()
			.max()
			.unwrap_or_else(epoch)
	}
}

/// Derived per-book analysis payload. The payload itself is opaque to the
/// store; only keying and recency are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrayEntry {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub book_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub generated_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl XrayEntry {
	pub fn recency(&self) -> DateTime<Utc> {
		self.generated_at.unwrap_or_else(epoch)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub book_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ended_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password_hash: Option<String>,
	#[serde(default)]
	pub is_admin: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl User {
	pub fn recency(&self) -> DateTime<Utc> {
		[self.updated_at, self.created_at]
			.into_iter()
			.flatten()
			.max()
			.unwrap_or_else(epoch)
	}
}

/// The authoritative per-user-per-book progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBookData {
	/// Server-assigned. Client-supplied ids are discarded during merge so two
	/// devices can't fork one `(userId, bookId)` record.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub user_id: String,
	pub book_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_position: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_pages: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub current_page: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_read_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl UserBookData {
	pub fn recency(&self) -> DateTime<Utc> {
		[self.updated_at, self.last_read_at]
			.into_iter()
			.flatten()
			.max()
			.unwrap_or_else(epoch)
	}

	pub fn composite_key(&self) -> String {
		format!("{}_{}", self.user_id, self.book_id)
	}
}
