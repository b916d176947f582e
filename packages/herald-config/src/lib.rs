mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Delivery, Listener, Notes, Nostr, Postgres, Rooms, Service, Storage, Webhook,
};

use std::{env, fs, path::Path};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_RELAY_URLS: &str = "RELAY_URLS";
pub const ENV_SECRET_KEY: &str = "NOSTR_PRIVATE_KEY";
pub const ENV_LOCATOR_BASE_URL: &str = "HIVETALK_URL";
pub const ENV_ROOMS_SOURCE_URL: &str = "ROOMS_SOURCE_URL";
pub const ENV_ROOMS_API_KEY: &str = "ROOMS_API_KEY";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const ENV_LISTENER_RELAY_URL: &str = "LISTENER_RELAY_URL";
pub const ENV_POLL_INTERVAL_SECONDS: &str = "POLL_INTERVAL_SECONDS";
pub const ENV_LOG_LEVEL: &str = "HERALD_LOG";

pub fn load(path: &Path) -> Result<Config> {
	load_with_env(path, |name| env::var(name).ok())
}

/// Same as [`load`] with an explicit environment lookup.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config>
where
	F: Fn(&str) -> Option<String>,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, lookup)?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

	if let Some(dsn) = lookup(ENV_DATABASE_URL) {
		cfg.storage.postgres.dsn = dsn;
	}
	if let Some(relays) = lookup(ENV_RELAY_URLS) {
		cfg.nostr.relays = split_list(&relays);
	}
	if let Some(secret_key) = lookup(ENV_SECRET_KEY) {
		cfg.nostr.secret_key = Some(secret_key);
	}
	if let Some(base_url) = lookup(ENV_LOCATOR_BASE_URL) {
		cfg.delivery.locator_base_url = base_url;
	}
	if let Some(interval) = lookup(ENV_POLL_INTERVAL_SECONDS) {
		cfg.delivery.poll_interval_seconds =
			interval.trim().parse().map_err(|_| Error::Environment {
				name: ENV_POLL_INTERVAL_SECONDS,
				message: format!("expected a whole number of seconds, got {interval:?}."),
			})?;
	}
	if let Some(level) = lookup(ENV_LOG_LEVEL) {
		cfg.service.log_level = level;
	}
	if let Some(source_url) = lookup(ENV_ROOMS_SOURCE_URL) {
		cfg.rooms.get_or_insert_with(Rooms::default).source_url = source_url;
	}
	if let Some(api_key) = lookup(ENV_ROOMS_API_KEY) {
		cfg.rooms.get_or_insert_with(Rooms::default).api_key = Some(api_key);
	}
	if let Some(url) = lookup(ENV_WEBHOOK_URL) {
		cfg.webhook.get_or_insert_with(Webhook::default).url = url;
	}
	if let Some(url) = lookup(ENV_LISTENER_RELAY_URL) {
		cfg.listener.relay_url = Some(url);
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.nostr.publish_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "nostr.publish_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for relay in &cfg.nostr.relays {
		if !is_relay_url(relay) {
			return Err(Error::Validation {
				message: format!("nostr.relays entry {relay:?} must start with ws:// or wss://."),
			});
		}
	}

	if cfg.delivery.batch_size == 0 {
		return Err(Error::Validation {
			message: "delivery.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.delivery.max_workers == 0 {
		return Err(Error::Validation {
			message: "delivery.max_workers must be greater than zero.".to_string(),
		});
	}
	if cfg.delivery.window_seconds <= 0 {
		return Err(Error::Validation {
			message: "delivery.window_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.delivery.poll_interval_seconds == 0 {
		return Err(Error::Validation {
			message: "delivery.poll_interval_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.delivery.invocation_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "delivery.invocation_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.notes.retry_horizon_seconds <= 0 {
		return Err(Error::Validation {
			message: "notes.retry_horizon_seconds must be greater than zero.".to_string(),
		});
	}

	if let Some(relay) = cfg.listener.relay_url.as_deref()
		&& !is_relay_url(relay)
	{
		return Err(Error::Validation {
			message: format!("listener.relay_url {relay:?} must start with ws:// or wss://."),
		});
	}
	if cfg.listener.lookback_seconds < 0 {
		return Err(Error::Validation {
			message: "listener.lookback_seconds must not be negative.".to_string(),
		});
	}

	if let Some(webhook) = cfg.webhook.as_ref() {
		if webhook.max_attempts == 0 {
			return Err(Error::Validation {
				message: "webhook.max_attempts must be greater than zero.".to_string(),
			});
		}
		// Room for the truncation notice.
		if webhook.max_message_chars < 100 {
			return Err(Error::Validation {
				message: "webhook.max_message_chars must be at least 100.".to_string(),
			});
		}
		if webhook.rooms_per_message == 0 {
			return Err(Error::Validation {
				message: "webhook.rooms_per_message must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

impl Config {
	pub fn require_postgres(&self) -> Result<&Postgres> {
		if self.storage.postgres.dsn.trim().is_empty() {
			return Err(Error::Validation {
				message: format!(
					"storage.postgres.dsn must be set (or provide {ENV_DATABASE_URL})."
				),
			});
		}

		Ok(&self.storage.postgres)
	}

	pub fn require_secret_key(&self) -> Result<&str> {
		match self.nostr.secret_key.as_deref() {
			Some(key) => Ok(key),
			None => Err(Error::Validation {
				message: format!("nostr.secret_key must be set (or provide {ENV_SECRET_KEY})."),
			}),
		}
	}

	pub fn require_relays(&self) -> Result<&[String]> {
		if self.nostr.relays.is_empty() {
			return Err(Error::Validation {
				message: format!("nostr.relays must be non-empty (or provide {ENV_RELAY_URLS})."),
			});
		}

		Ok(&self.nostr.relays)
	}

	pub fn require_locator_base_url(&self) -> Result<&str> {
		if self.delivery.locator_base_url.is_empty() {
			return Err(Error::Validation {
				message: format!(
					"delivery.locator_base_url must be set (or provide {ENV_LOCATOR_BASE_URL})."
				),
			});
		}

		Ok(&self.delivery.locator_base_url)
	}

	pub fn require_rooms(&self) -> Result<&Rooms> {
		let Some(rooms) = self.rooms.as_ref() else {
			return Err(Error::Validation {
				message: "[rooms] section is required for the room poller.".to_string(),
			});
		};

		if rooms.source_url.trim().is_empty() {
			return Err(Error::Validation {
				message: format!(
					"rooms.source_url must be set (or provide {ENV_ROOMS_SOURCE_URL})."
				),
			});
		}
		if rooms.service_base_url.trim().is_empty() {
			return Err(Error::Validation {
				message: "rooms.service_base_url must be set.".to_string(),
			});
		}

		Ok(rooms)
	}

	/// The webhook section only counts as enabled when it carries a URL.
	pub fn webhook(&self) -> Option<&Webhook> {
		self.webhook.as_ref().filter(|webhook| !webhook.url.is_empty())
	}

	pub fn require_webhook(&self) -> Result<&Webhook> {
		self.webhook().ok_or_else(|| Error::Validation {
			message: format!("webhook.url must be set (or provide {ENV_WEBHOOK_URL})."),
		})
	}

	pub fn require_listener_relay(&self) -> Result<&str> {
		self.listener
			.relay_url
			.as_deref()
			.or_else(|| self.nostr.relays.first().map(String::as_str))
			.ok_or_else(|| Error::Validation {
				message: format!(
					"listener.relay_url or nostr.relays must be set (or provide {ENV_LISTENER_RELAY_URL})."
				),
			})
	}
}

/// Splits a comma separated list, dropping blank entries.
pub fn split_list(raw: &str) -> Vec<String> {
	raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn is_relay_url(url: &str) -> bool {
	url.starts_with("ws://") || url.starts_with("wss://")
}

fn normalize(cfg: &mut Config) {
	cfg.nostr.relays = cfg
		.nostr
		.relays
		.iter()
		.map(|relay| relay.trim())
		.filter(|relay| !relay.is_empty())
		.map(str::to_string)
		.collect();

	if cfg.nostr.secret_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.nostr.secret_key = None;
	}
	if let Some(key) = cfg.nostr.secret_key.as_mut() {
		*key = key.trim().to_string();
	}

	cfg.delivery.locator_base_url =
		cfg.delivery.locator_base_url.trim().trim_end_matches('/').to_string();

	if let Some(rooms) = cfg.rooms.as_mut() {
		if rooms.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
			rooms.api_key = None;
		}
		if rooms.default_image.as_deref().map(|image| image.trim().is_empty()).unwrap_or(false) {
			rooms.default_image = None;
		}

		rooms.service_base_url = rooms.service_base_url.trim().trim_end_matches('/').to_string();
	}

	if let Some(webhook) = cfg.webhook.as_mut() {
		webhook.url = webhook.url.trim().to_string();
	}

	cfg.listener.relay_url = cfg
		.listener
		.relay_url
		.take()
		.map(|relay| relay.trim().to_string())
		.filter(|relay| !relay.is_empty());
}
