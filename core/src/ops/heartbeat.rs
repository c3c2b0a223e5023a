//! High-frequency reading-progress updates.
//!
//! Much narrower than a metadata push: one `(userId, bookId)` progress record
//! (or, without a userId, the legacy per-book fields) is touched per call.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
	document::UserBookData,
	error::HeartbeatError,
	store::DocumentStore,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatInput {
	#[serde(default)]
	pub book_id: Option<String>,
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub cfi: Option<String>,
	#[serde(default)]
	pub progress: Option<f64>,
	#[serde(default)]
	pub total_pages: Option<u64>,
	#[serde(default)]
	pub current_page: Option<u64>,
}

impl HeartbeatInput {
	/// `bookId` and `cfi` are mandatory; checked before any store access so
	/// bad requests fail fast with a 400.
	pub fn validate(&self) -> Result<(&str, &str), HeartbeatError> {
		let book_id = self
			.book_id
			.as_deref()
			.filter(|s| !s.is_empty())
			.ok_or(HeartbeatError::MissingField("bookId"))?;
		let cfi = self
			.cfi
			.as_deref()
			.filter(|s| !s.is_empty())
			.ok_or(HeartbeatError::MissingField("cfi"))?;
		Ok((book_id, cfi))
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutput {
	pub success: bool,
	/// False when legacy mode was asked to update a book the store does not
	/// know. Old clients only look at `success`; new ones can surface the
	/// warning instead of treating the no-op as a confirmed write.
	pub updated: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub warning: Option<String>,
}

pub async fn heartbeat(
	store: &DocumentStore,
	input: HeartbeatInput,
) -> Result<HeartbeatOutput, HeartbeatError> {
	let (book_id, cfi) = input.validate()?;
	let book_id = book_id.to_string();
	let cfi = cfi.to_string();

	let output = store
		.update(|mut document| async move {
			let now = Utc::now();

			if let Some(user_id) = input.user_id {
				// Multi-user mode: upsert the composite-key progress record.
				let position = document
					.user_book_data
					.iter()
					.position(|r| r.user_id == user_id && r.book_id == book_id);

				match position {
					Some(i) => {
						let record = &mut document.user_book_data[i];
						record.current_position = Some(cfi);
						if input.progress.is_some() {
							record.progress = input.progress;
						}
						if input.total_pages.is_some() {
							record.total_pages = input.total_pages;
						}
						if input.current_page.is_some() {
							record.current_page = input.current_page;
						}
						record.last_read_at = Some(now);
						record.updated_at = Some(now);
					}
					None => {
						document.user_book_data.push(UserBookData {
							id: Some(Uuid::new_v4().to_string()),
							user_id,
							book_id,
							current_position: Some(cfi),
							progress: input.progress,
							status: Some("reading".to_string()),
							total_pages: input.total_pages,
							current_page: input.current_page,
							updated_at: Some(now),
							last_read_at: Some(now),
							extra: Default::default(),
						});
					}
				}

				document.last_sync = now;
				let output = HeartbeatOutput {
					success: true,
					updated: true,
					warning: None,
				};
				return Ok((Some(document), output));
			}

			// Legacy single-user mode: mutate the per-book progress fields.
			let Some(book) = document
				.books
				.iter_mut()
				.find(|b| b.id.as_deref() == Some(book_id.as_str()))
			else {
				warn!(%book_id, "legacy heartbeat for unknown book, nothing updated");
				let output = HeartbeatOutput {
					success: true,
					updated: false,
					warning: Some(format!("unknown book '{book_id}'")),
				};
				return Ok((None, output));
			};

			book.current_position = Some(cfi);
			if input.progress.is_some() {
				book.progress = input.progress;
			}
			if input.total_pages.is_some() {
				book.total_pages = input.total_pages;
			}
			if input.current_page.is_some() {
				book.current_page = input.current_page;
			}
			book.last_read_at = Some(now);
			book.updated_at = Some(now);
			document.last_sync = now;

			let output = HeartbeatOutput {
				success: true,
				updated: true,
				warning: None,
			};
			Ok((Some(document), output))
		})
		.await?;

	Ok(output)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;

	use crate::ops::sync::{self, SyncPushInput};

	fn heartbeat_input(value: serde_json::Value) -> HeartbeatInput {
		serde_json::from_value(value).unwrap()
	}

	async fn store_with_book(dir: &TempDir) -> DocumentStore {
		let store = DocumentStore::new(dir.path());
		let payload: SyncPushInput = serde_json::from_value(json!({
			"books": [{"id": "b1", "title": "X", "updatedAt": "2024-01-01T00:00:00Z"}]
		}))
		.unwrap();
		sync::push(&store, payload).await.unwrap();
		store
	}

	#[tokio::test]
	async fn missing_book_id_or_cfi_is_rejected() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());

		let result = heartbeat(&store, heartbeat_input(json!({"cfi": "/6/4"}))).await;
		assert!(matches!(
			result,
			Err(HeartbeatError::MissingField("bookId"))
		));

		let result = heartbeat(&store, heartbeat_input(json!({"bookId": "b1", "cfi": ""}))).await;
		assert!(matches!(result, Err(HeartbeatError::MissingField("cfi"))));
	}

	#[tokio::test]
	async fn creates_user_book_data_with_reading_status() {
		let dir = TempDir::new().unwrap();
		let store = store_with_book(&dir).await;

		let output = heartbeat(
			&store,
			heartbeat_input(json!({
				"bookId": "b1", "userId": "u1", "cfi": "/6/4", "progress": 10.0
			})),
		)
		.await
		.unwrap();
		assert!(output.success && output.updated);

		let document = store.read().await.unwrap().unwrap();
		assert_eq!(document.user_book_data.len(), 1);
		let record = &document.user_book_data[0];
		assert_eq!(record.user_id, "u1");
		assert_eq!(record.book_id, "b1");
		assert_eq!(record.current_position.as_deref(), Some("/6/4"));
		assert_eq!(record.progress, Some(10.0));
		assert_eq!(record.status.as_deref(), Some("reading"));
		assert!(record.id.is_some());
	}

	#[tokio::test]
	async fn second_heartbeat_updates_the_same_record() {
		let dir = TempDir::new().unwrap();
		let store = store_with_book(&dir).await;

		heartbeat(
			&store,
			heartbeat_input(json!({"bookId": "b1", "userId": "u1", "cfi": "/6/4"})),
		)
		.await
		.unwrap();
		let first_id = store.read().await.unwrap().unwrap().user_book_data[0]
			.id
			.clone();

		heartbeat(
			&store,
			heartbeat_input(json!({
				"bookId": "b1", "userId": "u1", "cfi": "/6/8", "progress": 25.0
			})),
		)
		.await
		.unwrap();

		let document = store.read().await.unwrap().unwrap();
		assert_eq!(document.user_book_data.len(), 1);
		let record = &document.user_book_data[0];
		assert_eq!(record.id, first_id);
		assert_eq!(record.current_position.as_deref(), Some("/6/8"));
		assert_eq!(record.progress, Some(25.0));
	}

	#[tokio::test]
	async fn legacy_mode_updates_book_fields() {
		let dir = TempDir::new().unwrap();
		let store = store_with_book(&dir).await;

		let output = heartbeat(
			&store,
			heartbeat_input(json!({"bookId": "b1", "cfi": "/6/4", "progress": 40.0})),
		)
		.await
		.unwrap();
		assert!(output.updated);

		let document = store.read().await.unwrap().unwrap();
		let book = &document.books[0];
		assert_eq!(book.current_position.as_deref(), Some("/6/4"));
		assert_eq!(book.progress, Some(40.0));
		assert!(document.user_book_data.is_empty());
	}

	#[tokio::test]
	async fn legacy_mode_unknown_book_reports_not_updated() {
		let dir = TempDir::new().unwrap();
		let store = store_with_book(&dir).await;
		let before = std::fs::read(store.document_path()).unwrap();

		let output = heartbeat(
			&store,
			heartbeat_input(json!({"bookId": "missing", "cfi": "/6/4"})),
		)
		.await
		.unwrap();

		assert!(output.success);
		assert!(!output.updated);
		assert!(output.warning.is_some());
		// The no-op must not rewrite the document.
		assert_eq!(before, std::fs::read(store.document_path()).unwrap());
	}
}
