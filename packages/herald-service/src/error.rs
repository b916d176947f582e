pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] herald_storage::Error),
	#[error(transparent)]
	Nostr(#[from] herald_nostr::Error),
	#[error(transparent)]
	Provider(#[from] herald_providers::Error),
	#[error(transparent)]
	Config(#[from] herald_config::Error),
	#[error("No signing keys for room {room_name:?}.")]
	MissingRoomKeys { room_name: String },
	#[error("Invalid record: {message}")]
	InvalidRecord { message: String },
	#[error("Invocation cancelled.")]
	Cancelled,
}
