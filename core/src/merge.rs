//! Generic reconciliation for document collections.
//!
//! One merge function parameterized by key and recency extraction; the by-id
//! and composite-key strategies are instantiations of it. Conflict resolution
//! is last-write-wins on the entity's recency timestamp, ties favoring the
//! incoming (pushing) side. Deletion lists are explicit tombstones, distinct
//! from an entity merely being absent from an incoming batch.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::document::{Annotation, Book, Tag, User, UserBookData, XrayEntry};

/// Merge `incoming` into `existing`, keyed by `key` and ordered by first
/// insertion. Entities whose key extractor returns `None` are skipped with a
/// warning rather than collapsed onto a shared map slot.
///
/// Deletions are applied before incoming upserts: a key that is both in
/// `deleted_keys` and present in `incoming` ends up present (resurrected).
/// Callers rely on that ordering; see `ops::sync`.
pub fn merge_entities<T>(
	existing: Vec<T>,
	incoming: Vec<T>,
	deleted_keys: &HashSet<String>,
	key: impl Fn(&T) -> Option<String>,
	recency: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
	let mut order: Vec<String> = Vec::with_capacity(existing.len() + incoming.len());
	let mut by_key: HashMap<String, T> = HashMap::with_capacity(existing.len());

	for entity in existing {
		let Some(k) = key(&entity) else {
			warn!("dropping existing entity with no usable merge key");
			continue;
		};
		if !by_key.contains_key(&k) {
			order.push(k.clone());
		}
		by_key.insert(k, entity);
	}

	for k in deleted_keys {
		by_key.remove(k);
	}

	for entity in incoming {
		let Some(k) = key(&entity) else {
			warn!("skipping incoming entity with no usable merge key");
			continue;
		};
		match by_key.get(&k) {
			Some(current) if recency(current) > recency(&entity) => {
				// Existing copy is strictly newer; keep it.
			}
			Some(_) => {
				by_key.insert(k, entity);
			}
			None => {
				order.push(k.clone());
				by_key.insert(k, entity);
			}
		}
	}

	order
		.into_iter()
		.filter_map(|k| by_key.remove(&k))
		.collect()
}

/// Explicit per-entity-kind merge keys. Each collection declares how its
/// members are identified instead of falling back to whatever field happens
/// to be present.
pub fn book_key(book: &Book) -> Option<String> {
	book.id.clone()
}

pub fn tag_key(tag: &Tag) -> Option<String> {
	tag.id.clone().or_else(|| tag.name.clone())
}

pub fn annotation_key(annotation: &Annotation) -> Option<String> {
	annotation.id.clone()
}

pub fn xray_key(entry: &XrayEntry) -> Option<String> {
	entry
		.id
		.clone()
		.or_else(|| entry.generated_at.map(|t| t.to_rfc3339()))
}

pub fn user_key(user: &User) -> Option<String> {
	user.id.clone()
}

pub fn merge_books(
	existing: Vec<Book>,
	incoming: Vec<Book>,
	deleted_ids: &HashSet<String>,
) -> Vec<Book> {
	merge_entities(existing, incoming, deleted_ids, book_key, Book::recency)
}

pub fn merge_tags(existing: Vec<Tag>, incoming: Vec<Tag>) -> Vec<Tag> {
	merge_entities(existing, incoming, &HashSet::new(), tag_key, Tag::recency)
}

pub fn merge_annotations(existing: Vec<Annotation>, incoming: Vec<Annotation>) -> Vec<Annotation> {
	merge_entities(
		existing,
		incoming,
		&HashSet::new(),
		annotation_key,
		Annotation::recency,
	)
}

pub fn merge_xray_data(existing: Vec<XrayEntry>, incoming: Vec<XrayEntry>) -> Vec<XrayEntry> {
	merge_entities(existing, incoming, &HashSet::new(), xray_key, XrayEntry::recency)
}

pub fn merge_users(existing: Vec<User>, incoming: Vec<User>) -> Vec<User> {
	merge_entities(existing, incoming, &HashSet::new(), user_key, User::recency)
}

/// Composite-key merge for per-user reading progress. Incoming records are
/// re-keyed to the server's existing record id (when one exists) before the
/// recency comparison, so ids minted independently on two devices can't fork
/// one `(userId, bookId)` record.
pub fn merge_user_book_data(
	existing: Vec<UserBookData>,
	incoming: Vec<UserBookData>,
) -> Vec<UserBookData> {
	let server_ids: HashMap<String, Option<String>> = existing
		.iter()
		.map(|record| (record.composite_key(), record.id.clone()))
		.collect();

	let incoming = incoming
		.into_iter()
		.map(|mut record| {
			if let Some(server_id) = server_ids.get(&record.composite_key()) {
				record.id = server_id.clone();
			}
			record
		})
		.collect();

	merge_entities(
		existing,
		incoming,
		&HashSet::new(),
		|record| Some(record.composite_key()),
		UserBookData::recency,
	)
}
