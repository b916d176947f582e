use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	#[serde(default)]
	pub storage: Storage,
	#[serde(default)]
	pub nostr: Nostr,
	#[serde(default)]
	pub delivery: Delivery,
	#[serde(default)]
	pub notes: Notes,
	pub rooms: Option<Rooms>,
	pub webhook: Option<Webhook>,
	#[serde(default)]
	pub listener: Listener,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: default_log_level() }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
	#[serde(default)]
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	/// Usually supplied through `DATABASE_URL`.
	#[serde(default)]
	pub dsn: String,
	#[serde(default = "default_pool_max_conns")]
	pub pool_max_conns: u32,
	#[serde(default = "default_connect_timeout_ms")]
	pub connect_timeout_ms: u64,
}
impl Default for Postgres {
	fn default() -> Self {
		Self {
			dsn: String::new(),
			pool_max_conns: default_pool_max_conns(),
			connect_timeout_ms: default_connect_timeout_ms(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nostr {
	/// Global relay set. Per-record relays are appended to this list.
	#[serde(default)]
	pub relays: Vec<String>,
	/// Hex or `nsec` encoded secret key used by jobs that sign with a single identity.
	pub secret_key: Option<String>,
	#[serde(default = "default_publish_timeout_ms")]
	pub publish_timeout_ms: u64,
}
impl Default for Nostr {
	fn default() -> Self {
		Self {
			relays: Vec::new(),
			secret_key: None,
			publish_timeout_ms: default_publish_timeout_ms(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	#[serde(default = "default_max_workers")]
	pub max_workers: usize,
	/// Half width of the selection window around the current time.
	#[serde(default = "default_window_seconds")]
	pub window_seconds: i64,
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	#[serde(default = "default_invocation_timeout_ms")]
	pub invocation_timeout_ms: u64,
	/// Base URL joined with a record slug to build the `streaming` locator.
	#[serde(default)]
	pub locator_base_url: String,
}
impl Default for Delivery {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
			max_workers: default_max_workers(),
			window_seconds: default_window_seconds(),
			poll_interval_seconds: default_poll_interval_seconds(),
			invocation_timeout_ms: default_invocation_timeout_ms(),
			locator_base_url: String::new(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notes {
	/// Failed notes scheduled longer ago than this are no longer retried. Pending notes are
	/// always published, however late.
	#[serde(default = "default_retry_horizon_seconds")]
	pub retry_horizon_seconds: i64,
}
impl Default for Notes {
	fn default() -> Self {
		Self { retry_horizon_seconds: default_retry_horizon_seconds() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rooms {
	#[serde(default)]
	pub source_url: String,
	/// Sent verbatim in the `authorization` header when present.
	pub api_key: Option<String>,
	#[serde(default = "default_state_path")]
	pub state_path: PathBuf,
	#[serde(default)]
	pub service_base_url: String,
	pub default_image: Option<String>,
	#[serde(default = "default_room_topics")]
	pub topics: Vec<String>,
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
}
impl Default for Rooms {
	fn default() -> Self {
		Self {
			source_url: String::new(),
			api_key: None,
			state_path: default_state_path(),
			service_base_url: String::new(),
			default_image: None,
			topics: default_room_topics(),
			request_timeout_ms: default_request_timeout_ms(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
	#[serde(default)]
	pub url: String,
	#[serde(default = "default_min_interval_ms")]
	pub min_interval_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_backoff_ms")]
	pub retry_backoff_ms: u64,
	#[serde(default = "default_max_message_chars")]
	pub max_message_chars: usize,
	#[serde(default = "default_rooms_per_message")]
	pub rooms_per_message: usize,
}
impl Default for Webhook {
	fn default() -> Self {
		Self {
			url: String::new(),
			min_interval_ms: default_min_interval_ms(),
			max_attempts: default_max_attempts(),
			retry_backoff_ms: default_retry_backoff_ms(),
			max_message_chars: default_max_message_chars(),
			rooms_per_message: default_rooms_per_message(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listener {
	/// Relay to subscribe to. Falls back to the first global relay.
	pub relay_url: Option<String>,
	/// How far back the subscription's `since` reaches on every (re)connect.
	#[serde(default = "default_lookback_seconds")]
	pub lookback_seconds: i64,
	#[serde(default = "default_reconnect_delay_ms")]
	pub reconnect_delay_ms: u64,
}
impl Default for Listener {
	fn default() -> Self {
		Self {
			relay_url: None,
			lookback_seconds: default_lookback_seconds(),
			reconnect_delay_ms: default_reconnect_delay_ms(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_pool_max_conns() -> u32 {
	4
}

fn default_connect_timeout_ms() -> u64 {
	5_000
}

fn default_publish_timeout_ms() -> u64 {
	5_000
}

fn default_batch_size() -> usize {
	25
}

fn default_max_workers() -> usize {
	2
}

fn default_window_seconds() -> i64 {
	120
}

fn default_poll_interval_seconds() -> u64 {
	60
}

fn default_invocation_timeout_ms() -> u64 {
	300_000
}

fn default_retry_horizon_seconds() -> i64 {
	3_600
}

fn default_state_path() -> PathBuf {
	PathBuf::from("rooms.json")
}

fn default_room_topics() -> Vec<String> {
	vec!["hivetalk-honey".to_string(), "interactive room".to_string()]
}

fn default_request_timeout_ms() -> u64 {
	10_000
}

fn default_min_interval_ms() -> u64 {
	200
}

fn default_max_attempts() -> u32 {
	3
}

fn default_retry_backoff_ms() -> u64 {
	2_000
}

fn default_max_message_chars() -> usize {
	2_000
}

fn default_rooms_per_message() -> usize {
	2
}

fn default_lookback_seconds() -> i64 {
	7 * 24 * 3_600
}

fn default_reconnect_delay_ms() -> u64 {
	5_000
}
