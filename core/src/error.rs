use std::path::Path;

use thiserror::Error;

/// Store-level failures. Missing or corrupt document files are NOT errors
/// (they surface as `None`/skeleton, see `store`); these are the conditions
/// that propagate to callers and become HTTP 500s.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("document I/O error: {source}; path: '{}'", path.display())]
	Io {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to serialize document: {0}")]
	Serialize(#[from] serde_json::Error),
}

impl StoreError {
	pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::Io {
			path: path.as_ref().into(),
			source,
		}
	}
}

/// Heartbeat request validation failures; mapped to HTTP 400 by the server.
#[derive(Debug, Error)]
pub enum HeartbeatError {
	#[error("missing required field '{0}'")]
	MissingField(&'static str),
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Config file load outcomes. `NotFound` is expected on fresh installs; the
/// caller decides whether `Parse`/`Io` fall back or propagate.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file not found at '{}'", .0.display())]
	NotFound(Box<Path>),
	#[error("config file at '{}' is not valid JSON: {source}", path.display())]
	Parse {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error("config file I/O error: {source}; path: '{}'", path.display())]
	Io {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
}
