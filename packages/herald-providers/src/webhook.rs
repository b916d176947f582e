//! Best-effort chat notifications for room status changes.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::{
	sync::Mutex,
	time::{self, Instant},
};

use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TRUNCATION_NOTICE: &str = "\n... [message truncated due to size limits]";
const TRUNCATION_RESERVE: usize = 50;

/// A room whose announced status changed during a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChange {
	pub room_id: String,
	pub name: String,
	pub status: String,
	pub participants: u32,
	pub description: Option<String>,
	pub join_url: String,
}

pub struct WebhookNotifier {
	client: Client,
	url: String,
	min_interval: Duration,
	max_attempts: u32,
	retry_backoff: Duration,
	max_message_chars: usize,
	rooms_per_message: usize,
	last_sent: Mutex<Option<Instant>>,
}
impl WebhookNotifier {
	pub fn new(cfg: &herald_config::Webhook) -> Result<Self> {
		let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

		Ok(Self {
			client,
			url: cfg.url.clone(),
			min_interval: Duration::from_millis(cfg.min_interval_ms),
			max_attempts: cfg.max_attempts.max(1),
			retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
			max_message_chars: cfg.max_message_chars,
			rooms_per_message: cfg.rooms_per_message.max(1),
			last_sent: Mutex::new(None),
		})
	}

	/// Posts `content`, waiting for the rate limiter and retrying with a fixed backoff.
	pub async fn send(&self, content: &str) -> Result<()> {
		let content = truncate_message(content, self.max_message_chars);
		let mut attempt = 1;

		loop {
			self.wait_for_slot().await;

			match self.post(&content).await {
				Ok(()) => return Ok(()),
				Err(err) if attempt < self.max_attempts => {
					tracing::warn!(error = %err, attempt, "Webhook post failed. Retrying.");

					time::sleep(self.retry_backoff).await;

					attempt += 1;
				},
				Err(err) => return Err(err),
			}
		}
	}

	/// Groups changes by new status and posts a few rooms per message. Returns how many
	/// messages were delivered; failures are logged and skipped.
	pub async fn notify_room_changes(&self, changes: &[RoomChange]) -> usize {
		let mut statuses = Vec::<&str>::new();

		for change in changes {
			if !statuses.contains(&change.status.as_str()) {
				statuses.push(&change.status);
			}
		}

		let mut delivered = 0;

		for status in statuses {
			let group = changes.iter().filter(|change| change.status == status).collect::<Vec<_>>();

			for chunk in group.chunks(self.rooms_per_message) {
				let message = chunk.iter().map(|change| format_room_message(change)).collect::<String>();

				match self.send(&message).await {
					Ok(()) => {
						tracing::info!(status, rooms = chunk.len(), "Webhook message sent.");

						delivered += 1;
					},
					Err(err) => {
						tracing::error!(error = %err, status, rooms = chunk.len(), "Webhook message dropped.");
					},
				}
			}
		}

		delivered
	}

	async fn wait_for_slot(&self) {
		let mut last_sent = self.last_sent.lock().await;

		if let Some(last) = *last_sent {
			let ready_at = last + self.min_interval;

			if ready_at > Instant::now() {
				time::sleep_until(ready_at).await;
			}
		}

		*last_sent = Some(Instant::now());
	}

	async fn post(&self, content: &str) -> Result<()> {
		let res = self.client.post(&self.url).json(&json!({ "content": content })).send().await?;
		let status = res.status();

		if !status.is_success() {
			return Err(Error::WebhookStatus { status: status.as_u16() });
		}

		Ok(())
	}
}

pub fn format_room_message(change: &RoomChange) -> String {
	let emoji = match change.status.as_str() {
		"open" => "🟢",
		"closed" => "🔴",
		_ => "🔄",
	};
	let mut msg = format!("{emoji} **Room Update: {}**\n", change.name);

	msg.push_str(&format!("**Status:** {}\n", change.status));
	msg.push_str(&format!("**Room ID:** {}\n", change.room_id));
	msg.push_str(&format!("**Participants:** {}\n", change.participants));

	if let Some(description) = change.description.as_deref() {
		msg.push_str(&format!("**Description:** {description}\n"));
	}

	msg.push_str(&format!("**Join URL:** {}\n", change.join_url));
	msg.push_str("----------------------------\n");

	msg
}

/// Caps `message` at `max_chars` characters, replacing the tail with a notice.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
	if message.chars().count() <= max_chars {
		return message.to_string();
	}

	let keep = max_chars.saturating_sub(TRUNCATION_RESERVE);
	let mut out = message.chars().take(keep).collect::<String>();

	out.push_str(TRUNCATION_NOTICE);

	out
}
