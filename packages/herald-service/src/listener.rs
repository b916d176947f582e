//! Forwards live activity and room events seen on a relay to the chat webhook.
//!
//! The listener holds one `REQ` subscription for kinds 30311, 30312 and 30313 reaching back over a
//! lookback window. When the relay drops the subscription it reconnects after a fixed delay.
//! Events already forwarded by this process are skipped after a reconnect.

use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
	time::Duration,
};

use time::{OffsetDateTime, format_description::well_known::Rfc2822};
use tokio_util::sync::CancellationToken;

use herald_nostr::{
	Event, Filter, KIND_INTERACTIVE_ROOM, KIND_LIVE_ACTIVITY, KIND_ROOM_MEETING, Subscription,
};
use herald_providers::webhook::WebhookNotifier;

use crate::{BoxFuture, Result};

pub const LISTENED_KINDS: [u16; 3] = [KIND_LIVE_ACTIVITY, KIND_INTERACTIVE_ROOM, KIND_ROOM_MEETING];

const SUBSCRIPTION_ID: &str = "herald-activity";
const PROFILE_BASE_URL: &str = "https://njump.me";

pub trait MessageSink
where
	Self: Send + Sync,
{
	fn deliver<'a>(&'a self, content: &'a str) -> BoxFuture<'a, Result<()>>;
}
impl MessageSink for WebhookNotifier {
	fn deliver<'a>(&'a self, content: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.send(content).await?) })
	}
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
	pub relay_url: String,
	pub lookback: time::Duration,
	pub reconnect_delay: Duration,
}
impl ListenerSettings {
	pub fn from_config(cfg: &herald_config::Config) -> Result<Self> {
		Ok(Self {
			relay_url: cfg.require_listener_relay()?.to_string(),
			lookback: time::Duration::seconds(cfg.listener.lookback_seconds),
			reconnect_delay: Duration::from_millis(cfg.listener.reconnect_delay_ms),
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
	pub received: usize,
	pub forwarded: usize,
	pub dropped: usize,
	pub invalid: usize,
	pub duplicates: usize,
}

enum Forwarded {
	Sent,
	Dropped,
	Invalid,
	Duplicate,
}

pub struct ActivityListener {
	settings: ListenerSettings,
	sink: Arc<dyn MessageSink>,
	forwarded_ids: Mutex<HashSet<String>>,
}
impl ActivityListener {
	pub fn new(settings: ListenerSettings, sink: Arc<dyn MessageSink>) -> Self {
		Self { settings, sink, forwarded_ids: Mutex::new(HashSet::new()) }
	}

	/// Listens until shutdown, reconnecting whenever a session ends.
	pub async fn run(&self, cancel: &CancellationToken) {
		let relay = self.settings.relay_url.as_str();

		loop {
			match self.listen_once(OffsetDateTime::now_utc(), cancel).await {
				Ok(report) => tracing::info!(
					relay,
					received = report.received,
					forwarded = report.forwarded,
					dropped = report.dropped,
					invalid = report.invalid,
					duplicates = report.duplicates,
					"Subscription session ended."
				),
				Err(err) => tracing::warn!(relay, error = %err, "Subscription session failed."),
			}

			if cancel.is_cancelled() {
				return;
			}

			tracing::info!(
				relay,
				delay_ms = self.settings.reconnect_delay.as_millis() as u64,
				"Reconnecting after delay."
			);

			tokio::select! {
				biased;

				_ = cancel.cancelled() => return,
				_ = tokio::time::sleep(self.settings.reconnect_delay) => {},
			}
		}
	}

	/// One connection: subscribe, forward events until the relay ends the session or `cancel`
	/// fires. A connect or read failure is returned as an error.
	pub async fn listen_once(
		&self,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> Result<SessionReport> {
		let mut report = SessionReport::default();
		let filter = Filter {
			kinds: LISTENED_KINDS.to_vec(),
			since: Some((now - self.settings.lookback).unix_timestamp()),
		};
		let opened = tokio::select! {
			biased;

			_ = cancel.cancelled() => return Ok(report),
			opened = Subscription::open(&self.settings.relay_url, SUBSCRIPTION_ID, &filter) => opened,
		};
		let mut subscription = opened?;

		loop {
			let next = tokio::select! {
				biased;

				_ = cancel.cancelled() => None,
				next = subscription.next_event() => Some(next),
			};
			let Some(next) = next else {
				subscription.close().await;

				return Ok(report);
			};
			let Some(event) = next? else {
				return Ok(report);
			};

			report.received += 1;

			let forwarded = tokio::select! {
				biased;

				_ = cancel.cancelled() => None,
				forwarded = self.forward(&event) => Some(forwarded),
			};

			match forwarded {
				Some(Forwarded::Sent) => report.forwarded += 1,
				Some(Forwarded::Dropped) => report.dropped += 1,
				Some(Forwarded::Invalid) => report.invalid += 1,
				Some(Forwarded::Duplicate) => report.duplicates += 1,
				None => {
					subscription.close().await;

					return Ok(report);
				},
			}
		}
	}

	async fn forward(&self, event: &Event) -> Forwarded {
		if !LISTENED_KINDS.contains(&event.kind) {
			tracing::debug!(event_id = %event.id, kind = event.kind, "Ignoring unexpected kind.");

			return Forwarded::Invalid;
		}
		if let Err(err) = herald_nostr::verify(event) {
			tracing::warn!(event_id = %event.id, error = %err, "Ignoring event with a bad signature.");

			return Forwarded::Invalid;
		}
		if self.was_forwarded(&event.id) {
			return Forwarded::Duplicate;
		}

		tracing::info!(event_id = %event.id, kind = event.kind, "Event received.");

		match self.sink.deliver(&format_activity_message(event)).await {
			Ok(()) => {
				self.mark_forwarded(&event.id);

				tracing::info!(event_id = %event.id, "Event forwarded.");

				Forwarded::Sent
			},
			Err(err) => {
				tracing::error!(event_id = %event.id, error = %err, "Event was not forwarded.");

				Forwarded::Dropped
			},
		}
	}

	fn was_forwarded(&self, id: &str) -> bool {
		self.forwarded_ids.lock().map(|ids| ids.contains(id)).unwrap_or(false)
	}

	fn mark_forwarded(&self, id: &str) {
		if let Ok(mut ids) = self.forwarded_ids.lock() {
			ids.insert(id.to_string());
		}
	}
}

/// Chat message for one live activity, room or meeting event.
pub fn format_activity_message(event: &Event) -> String {
	let mut msg = String::from("🎯 **Nostr Event Update**\n\n");

	msg.push_str(&format!("👤 **Author:** {}\n", short_npub(&event.pubkey)));
	msg.push_str(&format!("🔢 **Kind:** {} - {}\n", event.kind, kind_label(event.kind)));

	if let Some(title) = event.tag_value("title") {
		msg.push_str(&format!("📌 **Title:** {title}\n"));
	}
	if let Some(summary) = event.tag_value("summary") {
		msg.push_str(&format!("📝 **Summary:** {summary}\n"));
	}
	if let Some(status) = event.tag_value("status") {
		msg.push_str(&format!("{} **Status:** {status}\n", status_marker(status)));
	}
	if let Some(streaming) = event.tag_value("streaming") {
		msg.push_str(&format!("🎥 **Stream:** {streaming}\n"));
	}
	if let Some(starts) = event.tag_value("starts").and_then(format_timestamp) {
		msg.push_str(&format!("⏰ **Starts:** {starts}\n"));
	}
	if let Some(ends) = event.tag_value("ends").and_then(format_timestamp) {
		msg.push_str(&format!("🏁 **Ends:** {ends}\n"));
	}
	if let Some(service) = event.tag_value("service") {
		msg.push_str(&format!("🔗 **Service:** {service}\n"));
	}
	if let Some(room) = event.tag_value("room") {
		msg.push_str(&format!("🏠 **Room:** {room}\n"));
	}

	let participants = participants(event);

	if !participants.is_empty() {
		msg.push_str(&format!("👥 **Participants:** {}\n", participants.join(", ")));
	}
	if let Some(image) = event.tag_value("image") {
		msg.push_str(&format!("\n{image}"));
	}

	msg
}

fn kind_label(kind: u16) -> &'static str {
	match kind {
		KIND_LIVE_ACTIVITY => "Live Activity",
		KIND_INTERACTIVE_ROOM => "Interactive Room",
		KIND_ROOM_MEETING => "Room Meeting",
		_ => "Unknown",
	}
}

fn status_marker(status: &str) -> &'static str {
	match status {
		"planned" => "📅",
		"live" | "open" => "🟢",
		"ended" | "closed" => "🔴",
		_ => "🔄",
	}
}

fn short_npub(pubkey: &str) -> String {
	match herald_nostr::npub(pubkey) {
		Ok(npub) => format!("{}...", &npub[..12]),
		Err(_) => format!("{}...", pubkey.chars().take(8).collect::<String>()),
	}
}

fn format_timestamp(raw: &str) -> Option<String> {
	let seconds = raw.trim().parse::<i64>().ok()?;

	OffsetDateTime::from_unix_timestamp(seconds).ok()?.format(&Rfc2822).ok()
}

fn participants(event: &Event) -> Vec<String> {
	event
		.tags
		.iter()
		.filter(|tag| tag.first().map(String::as_str) == Some("p"))
		.filter_map(|tag| {
			let npub = herald_nostr::npub(tag.get(1)?).ok()?;
			let role = tag.get(3).map(String::as_str).filter(|role| !role.is_empty());

			Some(format!("{PROFILE_BASE_URL}/{npub} ({})", role.unwrap_or("participant")))
		})
		.collect()
}
