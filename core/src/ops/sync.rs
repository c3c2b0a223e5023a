//! Full-document pull/push for the metadata sync endpoint.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
	document::{
		Annotation, Book, LibraryDocument, ReadingSession, Tag, User, UserBookData, XrayEntry,
	},
	error::StoreError,
	merge,
	store::DocumentStore,
};

/// Partial-or-full client payload: any subset of the collections plus an
/// explicit deletion list for books.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPushInput {
	#[serde(default)]
	pub books: Option<Vec<Book>>,
	#[serde(default)]
	pub tags: Option<Vec<Tag>>,
	#[serde(default)]
	pub annotations: Option<Vec<Annotation>>,
	#[serde(default)]
	pub xray_data: Option<Vec<XrayEntry>>,
	#[serde(default)]
	pub reading_sessions: Option<Vec<ReadingSession>>,
	#[serde(default)]
	pub users: Option<Vec<User>>,
	#[serde(default)]
	pub user_book_data: Option<Vec<UserBookData>>,
	#[serde(default)]
	pub deleted_book_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPushOutput {
	pub success: bool,
	pub timestamp: DateTime<Utc>,
	pub merged_books: usize,
}

/// Return the full document for the client, heavy per-book payloads removed.
/// A store with no document yet pulls as a fresh skeleton, not an error.
pub async fn pull(store: &DocumentStore) -> Result<LibraryDocument, StoreError> {
	let mut document = store
		.read()
		.await?
		.unwrap_or_else(LibraryDocument::skeleton);

	for book in &mut document.books {
		book.cover = None;
		book.file_data = None;
	}

	Ok(document)
}

/// Reconcile a pushed payload into the document in one transaction.
///
/// Collections merge last-write-wins by their declared keys; `readingSessions`
/// is the exception: a non-empty incoming batch replaces the stored collection
/// wholesale (sessions are append-only on the client, merging them was never
/// implemented and replacement is the documented behavior).
///
/// Deleting and re-pushing the same book id in one payload resurrects the
/// book, because tombstones apply before upserts. Clients re-pull to observe
/// canonical state; the merged document is not echoed back.
pub async fn push(
	store: &DocumentStore,
	input: SyncPushInput,
) -> Result<SyncPushOutput, StoreError> {
	store
		.update(|mut document| async move {
			let deleted_ids: HashSet<String> =
				input.deleted_book_ids.unwrap_or_default().into_iter().collect();

			let incoming_books = input.books.unwrap_or_default();
			info!(
				incoming_books = incoming_books.len(),
				deleted_books = deleted_ids.len(),
				"merging metadata push"
			);

			document.books =
				merge::merge_books(std::mem::take(&mut document.books), incoming_books, &deleted_ids);
			if let Some(tags) = input.tags {
				document.tags = merge::merge_tags(std::mem::take(&mut document.tags), tags);
			}
			if let Some(annotations) = input.annotations {
				document.annotations =
					merge::merge_annotations(std::mem::take(&mut document.annotations), annotations);
			}
			if let Some(xray_data) = input.xray_data {
				document.xray_data =
					merge::merge_xray_data(std::mem::take(&mut document.xray_data), xray_data);
			}
			if let Some(users) = input.users {
				document.users = merge::merge_users(std::mem::take(&mut document.users), users);
			}
			if let Some(user_book_data) = input.user_book_data {
				document.user_book_data = merge::merge_user_book_data(
					std::mem::take(&mut document.user_book_data),
					user_book_data,
				);
			}
			if let Some(sessions) = input.reading_sessions {
				if !sessions.is_empty() {
					document.reading_sessions = sessions;
				}
			}

			let timestamp = Utc::now();
			document.last_sync = timestamp;

			let merged_books = document.books.len();
			let output = SyncPushOutput {
				success: true,
				timestamp,
				merged_books,
			};
			Ok((Some(document), output))
		})
		.await
}
