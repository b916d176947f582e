pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid event: {0}")]
	InvalidEvent(String),
	#[error("Relay {relay} failed: {message}")]
	Relay { relay: String, message: String },
	#[error("Relay {relay} rejected the event: {message}")]
	Rejected { relay: String, message: String },
	#[error("Broadcast cancelled.")]
	Cancelled,
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
