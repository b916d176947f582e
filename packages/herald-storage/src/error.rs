use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Failed to access {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Failed to decode {path:?}: {source}")]
	Decode { path: PathBuf, source: serde_json::Error },
	#[error(transparent)]
	Encode(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
