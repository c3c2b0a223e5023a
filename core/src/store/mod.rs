//! Atomic persistence for the library document.
//!
//! Every read and every update passes through one [`StoreSerializer`], so
//! store access is totally ordered within the process and each transaction
//! sees the fully-consistent snapshot left by its predecessor. On-disk
//! atomicity comes from writing a sibling temp file and renaming it over the
//! document; readers never observe a partial write. No file locks are taken,
//! so running two server processes against one library root is unsupported.

use std::{
	future::Future,
	io,
	path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, warn};

use crate::{document::LibraryDocument, error::StoreError};

mod serializer;

pub use serializer::StoreSerializer;

pub const DOCUMENT_FILE_NAME: &str = "lectro_data.json";

/// What loading the backing file produced. Missing and corrupt files are
/// expected conditions, kept distinct so callers choose the fallback
/// deliberately instead of relying on a swallowed error.
enum DocumentState {
	Loaded(Box<LibraryDocument>),
	Missing,
	Corrupt,
}

pub struct DocumentStore {
	library_root: PathBuf,
	document_path: PathBuf,
	serializer: StoreSerializer,
}

impl DocumentStore {
	pub fn new(library_root: impl Into<PathBuf>) -> Self {
		let library_root = library_root.into();
		let document_path = library_root.join(DOCUMENT_FILE_NAME);
		Self {
			library_root,
			document_path,
			serializer: StoreSerializer::new(),
		}
	}

	pub fn library_root(&self) -> &Path {
		&self.library_root
	}

	pub fn document_path(&self) -> &Path {
		&self.document_path
	}

	/// Load the current document, or `None` when no (parsable) document
	/// exists yet. Never fails for absence or corruption; callers substitute
	/// a skeleton if they need a document.
	pub async fn read(&self) -> Result<Option<LibraryDocument>, StoreError> {
		self.serializer
			.dispatch(|| async {
				Ok(match self.load_state().await? {
					DocumentState::Loaded(document) => Some(*document),
					DocumentState::Missing | DocumentState::Corrupt => None,
				})
			})
			.await
	}

	/// Run one read-modify-write transaction.
	///
	/// The transaction receives the current document (a skeleton when the
	/// file is absent or corrupt) and returns the document to persist plus
	/// its output, or `None` to skip the write. Errors from the transaction
	/// and from I/O propagate to the caller; nothing is swallowed. This is
	/// the only write path to the document file.
	pub async fn update<T, F, Fut>(&self, transaction: F) -> Result<T, StoreError>
	where
		F: FnOnce(LibraryDocument) -> Fut,
		Fut: Future<Output = Result<(Option<LibraryDocument>, T), StoreError>>,
	{
		self.serializer
			.dispatch(|| async {
				let document = match self.load_state().await? {
					DocumentState::Loaded(document) => *document,
					DocumentState::Missing => {
						debug!(path = %self.document_path.display(), "no document yet, starting from skeleton");
						LibraryDocument::skeleton()
					}
					DocumentState::Corrupt => LibraryDocument::skeleton(),
				};

				let (maybe_updated, output) = transaction(document).await?;
				if let Some(updated) = maybe_updated {
					self.persist(&updated).await?;
				}
				Ok(output)
			})
			.await
	}

	async fn load_state(&self) -> Result<DocumentState, StoreError> {
		let bytes = match fs::read(&self.document_path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				return Ok(DocumentState::Missing);
			}
			Err(e) => return Err(StoreError::io(&self.document_path, e)),
		};

		match serde_json::from_slice(&bytes) {
			Ok(document) => Ok(DocumentState::Loaded(Box::new(document))),
			Err(e) => {
				warn!(
					path = %self.document_path.display(),
					error = %e,
					"document file is not parsable, treating as absent"
				);
				Ok(DocumentState::Corrupt)
			}
		}
	}

	/// Serialize to `<document>.tmp` in the same directory, then rename onto
	/// the document path. Same-filesystem rename is what makes the replace
	/// atomic.
	async fn persist(&self, document: &LibraryDocument) -> Result<(), StoreError> {
		if let Some(parent) = self.document_path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StoreError::io(parent, e))?;
		}

		let bytes = serde_json::to_vec_pretty(document)?;

		let mut temp_path = self.document_path.as_os_str().to_owned();
		temp_path.push(".tmp");
		let temp_path = PathBuf::from(temp_path);

		fs::write(&temp_path, &bytes)
			.await
			.map_err(|e| StoreError::io(&temp_path, e))?;
		fs::rename(&temp_path, &self.document_path)
			.await
			.map_err(|e| StoreError::io(&self.document_path, e))?;

		Ok(())
	}
}
