pub mod db;
pub mod events;
pub mod kv;
pub mod models;
pub mod notes;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result of a status-conditioned update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
	Updated,
	/// The row already carried the requested status.
	Unchanged,
	NotFound,
}
