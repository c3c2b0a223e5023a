//! lectro-core: the server-side data subsystem of Lectro.
//!
//! The authoritative store is a single JSON document (`lectro_data.json`)
//! holding books, tags, annotations, reading sessions, users and per-user
//! reading progress. Access is totally ordered by a FIFO serializer, writes
//! are atomic (temp file + rename), and state pushed from multiple devices is
//! reconciled with timestamp-based last-write-wins merging.
//!
//! Deployment constraint: serialization is in-process only. Running more than
//! one server instance against the same library root is unsupported.

pub mod config;
pub mod document;
pub mod error;
pub mod merge;
pub mod ops;
pub mod store;

pub use document::LibraryDocument;
pub use error::{ConfigError, HeartbeatError, StoreError};
pub use store::DocumentStore;
