//! Maintenance jobs: dead-book cleanup, cover payload cleanup and user-data
//! migration. All are ordinary consumers of the store's `update` transaction.

use std::{
	collections::HashSet,
	path::{Component, Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::{document::Book, error::StoreError, merge, store::DocumentStore};

// ---------------------------------------------------------------------------
// Cleanup: drop books whose backing file vanished.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
	pub scanned: usize,
	pub removed_books: usize,
	pub removed_annotations: usize,
	pub removed_titles: Vec<String>,
	pub applied: bool,
}

/// Drop books whose backing file cannot be resolved and cascade-delete the
/// annotations that reference them. `apply = false` previews without writing.
///
/// Resolution tries the stored path as-is, then NFC/NFD normalizations of it,
/// then a component-by-component directory walk matching names
/// case- and diacritic-insensitively (files synced across macOS/Linux often
/// differ only in normalization form or case). Books that carry no path at
/// all are left alone; there is nothing to check them against.
pub async fn cleanup(store: &DocumentStore, apply: bool) -> Result<CleanupReport, StoreError> {
	let library_root = store.library_root().to_path_buf();

	store
		.update(|mut document| async move {
			let scanned = document.books.len();
			let mut removed_ids: HashSet<String> = HashSet::new();
			let mut removed_titles = Vec::new();
			let mut kept = Vec::with_capacity(document.books.len());

			for book in std::mem::take(&mut document.books) {
				match book_file_candidate(&library_root, &book) {
					None => kept.push(book),
					Some(candidate) => {
						if resolve_file(&candidate).await.is_some() {
							kept.push(book);
						} else {
							warn!(
								book_id = ?book.id,
								path = %candidate.display(),
								"book file unresolvable, removing book"
							);
							if let Some(id) = &book.id {
								removed_ids.insert(id.clone());
							}
							removed_titles
								.push(book.title.clone().unwrap_or_else(|| "<untitled>".into()));
						}
					}
				}
			}
			document.books = kept;

			let annotations_before = document.annotations.len();
			document.annotations.retain(|a| {
				a.book_id
					.as_ref()
					.map_or(true, |book_id| !removed_ids.contains(book_id))
			});
			let removed_annotations = annotations_before - document.annotations.len();

			let report = CleanupReport {
				scanned,
				removed_books: removed_titles.len(),
				removed_annotations,
				removed_titles,
				applied: apply,
			};

			if apply && (report.removed_books > 0 || report.removed_annotations > 0) {
				info!(
					removed_books = report.removed_books,
					removed_annotations = report.removed_annotations,
					"cleanup applied"
				);
				document.last_sync = Utc::now();
				Ok((Some(document), report))
			} else {
				Ok((None, report))
			}
		})
		.await
}

fn book_file_candidate(library_root: &Path, book: &Book) -> Option<PathBuf> {
	let raw = book
		.file_path
		.as_deref()
		.or(book.file_name.as_deref())?;
	let path = Path::new(raw);
	if path.is_absolute() {
		Some(path.to_path_buf())
	} else {
		Some(library_root.join(path))
	}
}

/// Fold a file name for fuzzy comparison: decompose, drop combining marks,
/// lowercase.
fn fold_name(name: &str) -> String {
	name.nfd()
		.filter(|c| !is_combining_mark(*c))
		.flat_map(char::to_lowercase)
		.collect()
}

async fn exists(path: &Path) -> bool {
	fs::metadata(path).await.is_ok()
}

/// The fallback chain: exact path, NFC/NFD forms of the whole path, then a
/// per-component sibling search.
async fn resolve_file(path: &Path) -> Option<PathBuf> {
	if exists(path).await {
		return Some(path.to_path_buf());
	}

	let raw = path.to_string_lossy();
	for variant in [
		raw.nfc().collect::<String>(),
		raw.nfd().collect::<String>(),
	] {
		let variant = PathBuf::from(variant);
		if variant.as_path() != path && exists(&variant).await {
			debug!(path = %variant.display(), "resolved via unicode normalization");
			return Some(variant);
		}
	}

	walk_insensitive(path).await
}

async fn walk_insensitive(path: &Path) -> Option<PathBuf> {
	let mut current = PathBuf::new();

	for component in path.components() {
		match component {
			Component::Normal(name) => {
				let exact = current.join(name);
				if exists(&exact).await {
					current = exact;
					continue;
				}

				let wanted = fold_name(&name.to_string_lossy());
				let mut entries = fs::read_dir(&current).await.ok()?;
				let mut matched = None;
				while let Ok(Some(entry)) = entries.next_entry().await {
					if fold_name(&entry.file_name().to_string_lossy()) == wanted {
						matched = Some(entry.file_name());
						break;
					}
				}
				current = current.join(matched?);
			}
			other => current.push(other),
		}
	}

	if exists(&current).await {
		debug!(path = %current.display(), "resolved via insensitive walk");
		Some(current)
	} else {
		None
	}
}

// ---------------------------------------------------------------------------
// Cover cleanup: strip inline cover/file payloads from book records.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverCleanupReport {
	pub cleaned: usize,
	pub bytes_reclaimed: usize,
	pub applied: bool,
}

/// Covers are served on demand by the image pipeline; inline base64 payloads
/// only bloat the document and every pull. `apply = false` previews.
pub async fn clean_covers(
	store: &DocumentStore,
	apply: bool,
) -> Result<CoverCleanupReport, StoreError> {
	store
		.update(|mut document| async move {
			let mut cleaned = 0usize;
			let mut bytes_reclaimed = 0usize;

			for book in &mut document.books {
				let mut touched = false;
				if let Some(cover) = &book.cover {
					bytes_reclaimed += cover.len();
					touched = true;
				}
				if let Some(file_data) = &book.file_data {
					bytes_reclaimed += file_data.len();
					touched = true;
				}
				if touched {
					cleaned += 1;
					if apply {
						book.cover = None;
						book.file_data = None;
					}
				}
			}

			let report = CoverCleanupReport {
				cleaned,
				bytes_reclaimed,
				applied: apply,
			};

			if apply && cleaned > 0 {
				info!(cleaned, bytes_reclaimed, "cover payloads stripped");
				document.last_sync = Utc::now();
				Ok((Some(document), report))
			} else {
				Ok((None, report))
			}
		})
		.await
}

// ---------------------------------------------------------------------------
// User-data migration: reassign records owned by stale user ids.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateUserInput {
	pub from_user_ids: Vec<String>,
	pub to_user_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateUserReport {
	pub migrated_annotations: usize,
	pub migrated_user_book_data: usize,
}

/// Reassign annotations and per-book progress from stale user ids to the
/// canonical one. When a stale and a canonical progress record exist for the
/// same book, the merge engine's recency rule decides which survives.
pub async fn migrate_user(
	store: &DocumentStore,
	input: MigrateUserInput,
) -> Result<MigrateUserReport, StoreError> {
	store
		.update(|mut document| async move {
			let stale_ids: HashSet<&String> = input.from_user_ids.iter().collect();

			let mut migrated_annotations = 0usize;
			for annotation in &mut document.annotations {
				if let Some(user_id) = &annotation.user_id {
					if stale_ids.contains(user_id) {
						annotation.user_id = Some(input.to_user_id.clone());
						migrated_annotations += 1;
					}
				}
			}

			let (stale, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut document.user_book_data)
				.into_iter()
				.partition(|record| stale_ids.contains(&record.user_id));

			let migrated_user_book_data = stale.len();
			let reassigned = stale
				.into_iter()
				.map(|mut record| {
					record.user_id = input.to_user_id.clone();
					record
				})
				.collect();
			document.user_book_data = merge::merge_user_book_data(kept, reassigned);

			let report = MigrateUserReport {
				migrated_annotations,
				migrated_user_book_data,
			};

			if report.migrated_annotations > 0 || report.migrated_user_book_data > 0 {
				info!(
					annotations = report.migrated_annotations,
					user_book_data = report.migrated_user_book_data,
					to_user_id = %input.to_user_id,
					"user data migrated"
				);
				document.last_sync = Utc::now();
				Ok((Some(document), report))
			} else {
				Ok((None, report))
			}
		})
		.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;

	use crate::ops::sync::{self, SyncPushInput};

	fn push_input(value: serde_json::Value) -> SyncPushInput {
		serde_json::from_value(value).unwrap()
	}

	#[tokio::test]
	async fn cleanup_drops_fileless_books_and_cascades_annotations() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());
		std::fs::write(dir.path().join("present.epub"), b"epub").unwrap();

		sync::push(
			&store,
			push_input(json!({
				"books": [
					{"id": "b1", "title": "Present", "filePath": "present.epub",
					 "updatedAt": "2024-01-01T00:00:00Z"},
					{"id": "b2", "title": "Gone", "filePath": "gone.epub",
					 "updatedAt": "2024-01-01T00:00:00Z"},
					{"id": "b3", "title": "No file info",
					 "updatedAt": "2024-01-01T00:00:00Z"}
				],
				"annotations": [
					{"id": "a1", "bookId": "b1", "cfi": "/6/2"},
					{"id": "a2", "bookId": "b2", "cfi": "/6/4"}
				]
			})),
		)
		.await
		.unwrap();

		// Dry run reports but does not write.
		let preview = cleanup(&store, false).await.unwrap();
		assert_eq!(preview.removed_books, 1);
		assert_eq!(preview.removed_annotations, 1);
		assert!(!preview.applied);
		assert_eq!(store.read().await.unwrap().unwrap().books.len(), 3);

		let report = cleanup(&store, true).await.unwrap();
		assert_eq!(report.scanned, 3);
		assert_eq!(report.removed_books, 1);
		assert_eq!(report.removed_titles, vec!["Gone"]);

		let document = store.read().await.unwrap().unwrap();
		let ids: Vec<_> = document
			.books
			.iter()
			.map(|b| b.id.clone().unwrap())
			.collect();
		assert_eq!(ids, vec!["b1", "b3"]);
		assert_eq!(document.annotations.len(), 1);
		assert_eq!(document.annotations[0].id.as_deref(), Some("a1"));
	}

	#[tokio::test]
	async fn cleanup_resolves_nfd_named_file_for_nfc_path() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());

		// File on disk uses decomposed form (as macOS would store it), the
		// document records the composed form.
		let nfd_name: String = "café.epub".nfd().collect();
		std::fs::write(dir.path().join(&nfd_name), b"epub").unwrap();
		let nfc_name: String = "café.epub".nfc().collect();

		sync::push(
			&store,
			push_input(json!({
				"books": [{"id": "b1", "title": "Café", "filePath": nfc_name,
				           "updatedAt": "2024-01-01T00:00:00Z"}]
			})),
		)
		.await
		.unwrap();

		let report = cleanup(&store, true).await.unwrap();
		assert_eq!(report.removed_books, 0);
		assert_eq!(store.read().await.unwrap().unwrap().books.len(), 1);
	}

	#[tokio::test]
	async fn cleanup_walks_case_insensitively() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());
		std::fs::create_dir(dir.path().join("Fiction")).unwrap();
		std::fs::write(dir.path().join("Fiction/Dune.epub"), b"epub").unwrap();

		sync::push(
			&store,
			push_input(json!({
				"books": [{"id": "b1", "filePath": "fiction/dune.EPUB",
				           "updatedAt": "2024-01-01T00:00:00Z"}]
			})),
		)
		.await
		.unwrap();

		let report = cleanup(&store, true).await.unwrap();
		assert_eq!(report.removed_books, 0);
	}

	#[tokio::test]
	async fn cover_cleanup_reports_and_strips() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());
		let cover = format!("data:image/png;base64,{}", "A".repeat(64));

		sync::push(
			&store,
			push_input(json!({
				"books": [
					{"id": "b1", "cover": cover, "updatedAt": "2024-01-01T00:00:00Z"},
					{"id": "b2", "updatedAt": "2024-01-01T00:00:00Z"}
				]
			})),
		)
		.await
		.unwrap();

		let preview = clean_covers(&store, false).await.unwrap();
		assert_eq!(preview.cleaned, 1);
		assert_eq!(preview.bytes_reclaimed, cover.len());
		assert!(store.read().await.unwrap().unwrap().books[0].cover.is_some());

		let report = clean_covers(&store, true).await.unwrap();
		assert_eq!(report.cleaned, 1);
		assert!(store.read().await.unwrap().unwrap().books[0].cover.is_none());

		// Second apply finds nothing to do.
		let again = clean_covers(&store, true).await.unwrap();
		assert_eq!(again.cleaned, 0);
		assert_eq!(again.bytes_reclaimed, 0);
	}

	#[tokio::test]
	async fn migration_reassigns_and_resolves_conflicts_by_recency() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());

		sync::push(
			&store,
			push_input(json!({
				"annotations": [
					{"id": "a1", "bookId": "b1", "userId": "stale", "cfi": "/6/2"},
					{"id": "a2", "bookId": "b1", "userId": "u1", "cfi": "/6/4"}
				],
				"userBookData": [
					{"id": "k1", "userId": "u1", "bookId": "b1",
					 "progress": 10.0, "updatedAt": "2024-01-01T00:00:00Z"},
					{"id": "k2", "userId": "stale", "bookId": "b1",
					 "progress": 80.0, "updatedAt": "2024-03-01T00:00:00Z"},
					{"id": "k3", "userId": "stale", "bookId": "b2",
					 "progress": 5.0, "updatedAt": "2024-01-01T00:00:00Z"}
				]
			})),
		)
		.await
		.unwrap();

		let report = migrate_user(
			&store,
			MigrateUserInput {
				from_user_ids: vec!["stale".into()],
				to_user_id: "u1".into(),
			},
		)
		.await
		.unwrap();

		assert_eq!(report.migrated_annotations, 1);
		assert_eq!(report.migrated_user_book_data, 2);

		let document = store.read().await.unwrap().unwrap();
		assert!(document
			.annotations
			.iter()
			.all(|a| a.user_id.as_deref() == Some("u1")));

		// (u1, b1): the stale record was more recent, so its progress wins,
		// but the canonical record's id is kept.
		assert_eq!(document.user_book_data.len(), 2);
		let b1 = document
			.user_book_data
			.iter()
			.find(|r| r.book_id == "b1")
			.unwrap();
		assert_eq!(b1.user_id, "u1");
		assert_eq!(b1.progress, Some(80.0));
		assert_eq!(b1.id.as_deref(), Some("k1"));

		let b2 = document
			.user_book_data
			.iter()
			.find(|r| r.book_id == "b2")
			.unwrap();
		assert_eq!(b2.user_id, "u1");
		assert_eq!(b2.progress, Some(5.0));
	}

	#[tokio::test]
	async fn migration_with_nothing_to_do_does_not_write() {
		let dir = TempDir::new().unwrap();
		let store = DocumentStore::new(dir.path());

		let report = migrate_user(
			&store,
			MigrateUserInput {
				from_user_ids: vec!["nobody".into()],
				to_user_id: "u1".into(),
			},
		)
		.await
		.unwrap();

		assert_eq!(report.migrated_annotations, 0);
		assert_eq!(report.migrated_user_book_data, 0);
		assert!(!store.document_path().exists());
	}
}
