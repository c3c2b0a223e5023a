//! Library root resolution.
//!
//! Precedence: `LECTRO_LIBRARY_PATH` environment variable, then the
//! `libraryPath` field of `lectro_config.json` in the data directory, then
//! `<cwd>/library`. Nothing request-scoped participates: an earlier design
//! let an HTTP header override the path per-request and it caused a
//! production data-path mismatch, so the root is resolved once at startup.

use std::{
	io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "lectro_config.json";
pub const LIBRARY_PATH_ENV: &str = "LECTRO_LIBRARY_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
	#[serde(default)]
	pub library_path: Option<PathBuf>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Load `lectro_config.json` from the data directory. Outcomes are typed so
/// the caller decides what falls back and what propagates; nothing is
/// silently defaulted here.
pub fn load_config(data_dir: &Path) -> Result<ServerConfig, ConfigError> {
	let path = data_dir.join(CONFIG_FILE_NAME);
	let bytes = match std::fs::read(&path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			return Err(ConfigError::NotFound(path.into_boxed_path()));
		}
		Err(e) => {
			return Err(ConfigError::Io {
				path: path.into_boxed_path(),
				source: e,
			});
		}
	};

	serde_json::from_slice(&bytes).map_err(|e| ConfigError::Parse {
		path: path.into_boxed_path(),
		source: e,
	})
}

/// Resolve the directory holding `lectro_data.json`.
pub fn resolve_library_root(data_dir: &Path) -> PathBuf {
	if let Ok(path) = std::env::var(LIBRARY_PATH_ENV) {
		if !path.trim().is_empty() {
			info!(%path, "library root from {LIBRARY_PATH_ENV}");
			return PathBuf::from(path);
		}
	}

	match load_config(data_dir) {
		Ok(config) => {
			if let Some(path) = config.library_path {
				info!(path = %path.display(), "library root from config file");
				return path;
			}
		}
		Err(ConfigError::NotFound(path)) => {
			debug!(path = %path.display(), "no config file, using default library root");
		}
		Err(e) => {
			warn!(error = %e, "config file unusable, using default library root");
		}
	}

	std::env::current_dir()
		.unwrap_or_else(|_| PathBuf::from("."))
		.join("library")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn missing_config_is_not_found() {
		let dir = TempDir::new().unwrap();
		assert!(matches!(
			load_config(dir.path()),
			Err(ConfigError::NotFound(_))
		));
	}

	#[test]
	fn invalid_config_is_a_parse_error() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"not json").unwrap();
		assert!(matches!(
			load_config(dir.path()),
			Err(ConfigError::Parse { .. })
		));
	}

	#[test]
	fn config_library_path_is_used() {
		let dir = TempDir::new().unwrap();
		std::fs::write(
			dir.path().join(CONFIG_FILE_NAME),
			br#"{"libraryPath": "/srv/books"}"#,
		)
		.unwrap();

		let config = load_config(dir.path()).unwrap();
		assert_eq!(config.library_path, Some(PathBuf::from("/srv/books")));
	}
}
