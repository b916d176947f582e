//! Mirrors the upstream list of active rooms as kind 30312 events.
//!
//! Each upstream room id maps to a [`RoomEntry`] holding a stable `d` tag and the last announced
//! status. A poll publishes only when a room appears, changes name or changes status, and closes
//! rooms that were open but are no longer listed.

use std::{collections::HashSet, sync::Arc};

use rand::Rng;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use herald_nostr::{Broadcaster, Keys};
use herald_providers::{
	rooms::{ActiveRoom, HttpRoomSource, STATUS_CLOSED, STATUS_OPEN},
	webhook::{RoomChange, WebhookNotifier},
};
use herald_storage::{kv::KeyValueStore, models::RoomEntry};

use crate::{
	BoxFuture, Error, Result,
	formatter::{self, RoomAnnouncement},
};

const D_TAG_LEN: usize = 10;
const D_TAG_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub trait RoomSource
where
	Self: Send + Sync,
{
	fn active_rooms<'a>(&'a self) -> BoxFuture<'a, Result<Vec<ActiveRoom>>>;
}
impl RoomSource for HttpRoomSource {
	fn active_rooms<'a>(&'a self) -> BoxFuture<'a, Result<Vec<ActiveRoom>>> {
		Box::pin(async move { Ok(self.fetch().await?) })
	}
}

pub trait ChangeNotifier
where
	Self: Send + Sync,
{
	/// Returns how many messages went out. Never fails the poll.
	fn notify<'a>(&'a self, changes: &'a [RoomChange]) -> BoxFuture<'a, usize>;
}
impl ChangeNotifier for WebhookNotifier {
	fn notify<'a>(&'a self, changes: &'a [RoomChange]) -> BoxFuture<'a, usize> {
		Box::pin(self.notify_room_changes(changes))
	}
}

#[derive(Debug, Clone, Default)]
pub struct RoomPollerSettings {
	pub service_base_url: String,
	pub default_image: Option<String>,
	pub topics: Vec<String>,
	pub relays: Vec<String>,
}
impl RoomPollerSettings {
	pub fn from_config(rooms: &herald_config::Rooms, relays: &[String]) -> Self {
		Self {
			service_base_url: rooms.service_base_url.clone(),
			default_image: rooms.default_image.clone(),
			topics: rooms.topics.clone(),
			relays: relays.to_vec(),
		}
	}

	fn service_url(&self, room_name: &str) -> String {
		format!("{}/{}", self.service_base_url.trim_end_matches('/'), urlencoding::encode(room_name))
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
	pub active: usize,
	pub published: usize,
	pub publish_failures: usize,
	pub closed: usize,
	pub notified: usize,
}

pub struct RoomPoller {
	source: Arc<dyn RoomSource>,
	state: Arc<dyn KeyValueStore<RoomEntry>>,
	keys: Keys,
	broadcaster: Broadcaster,
	notifier: Option<Arc<dyn ChangeNotifier>>,
	settings: RoomPollerSettings,
}
impl RoomPoller {
	pub fn new(
		source: Arc<dyn RoomSource>,
		state: Arc<dyn KeyValueStore<RoomEntry>>,
		keys: Keys,
		broadcaster: Broadcaster,
		settings: RoomPollerSettings,
	) -> Self {
		Self { source, state, keys, broadcaster, notifier: None, settings }
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
		self.notifier = Some(notifier);

		self
	}

	pub async fn poll_once(
		&self,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> Result<PollReport> {
		let rooms = tokio::select! {
			biased;

			_ = cancel.cancelled() => Err(Error::Cancelled),
			rooms = self.source.active_rooms() => rooms,
		};
		let rooms = rooms?;
		let mut report = PollReport { active: rooms.len(), ..Default::default() };
		let mut changes = Vec::new();
		let mut seen = HashSet::new();

		tracing::info!(active = rooms.len(), "Active rooms fetched.");

		for room in &rooms {
			seen.insert(room.id.as_str());

			let status = room.effective_status();
			let (mut entry, changed) = match self.state.get(&room.id)? {
				Some(entry) => {
					let changed = entry.status != status || entry.room_name != room.name;

					(entry, changed)
				},
				None => {
					let entry = RoomEntry {
						d_tag: generate_d_tag(),
						room_name: room.name.clone(),
						status: status.to_string(),
						last_seen: now.unix_timestamp(),
					};

					tracing::info!(room_id = %room.id, d_tag = %entry.d_tag, "New room tracked.");

					(entry, true)
				},
			};

			entry.room_name = room.name.clone();
			entry.status = status.to_string();
			entry.last_seen = now.unix_timestamp();

			self.state.put(&room.id, entry.clone())?;

			if !changed {
				continue;
			}

			let summary = room.description.as_deref().unwrap_or(&room.name);
			let image = room.picture_url.as_deref().or(self.settings.default_image.as_deref());
			let service_url = self.settings.service_url(&room.name);
			let announcement = RoomAnnouncement {
				d_tag: &entry.d_tag,
				room_name: &room.name,
				summary,
				status,
				image,
				service_url: &service_url,
				owner: room.owner.as_deref(),
				topics: &self.settings.topics,
				relays: &self.settings.relays,
			};

			self.record_publish(&mut report, &announcement, now, cancel).await?;

			changes.push(RoomChange {
				room_id: room.id.clone(),
				name: room.name.clone(),
				status: status.to_string(),
				participants: room.participants,
				description: room.description.clone(),
				join_url: service_url,
			});
		}

		for (room_id, mut entry) in self.state.list()? {
			if entry.status != STATUS_OPEN || seen.contains(room_id.as_str()) {
				continue;
			}

			entry.status = STATUS_CLOSED.to_string();

			self.state.put(&room_id, entry.clone())?;

			report.closed += 1;

			tracing::info!(room_id = %room_id, room_name = %entry.room_name, "Room closed.");

			let summary = format!("{} is now closed", entry.room_name);
			let service_url = self.settings.service_url(&entry.room_name);
			let announcement = RoomAnnouncement {
				d_tag: &entry.d_tag,
				room_name: &entry.room_name,
				summary: &summary,
				status: STATUS_CLOSED,
				image: self.settings.default_image.as_deref(),
				service_url: &service_url,
				owner: None,
				topics: &self.settings.topics,
				relays: &self.settings.relays,
			};

			self.record_publish(&mut report, &announcement, now, cancel).await?;

			changes.push(RoomChange {
				room_id,
				name: entry.room_name.clone(),
				status: STATUS_CLOSED.to_string(),
				participants: 0,
				description: None,
				join_url: service_url,
			});
		}

		if let Some(notifier) = self.notifier.as_ref()
			&& !changes.is_empty()
		{
			report.notified = notifier.notify(&changes).await;
		}

		tracing::info!(
			active = report.active,
			published = report.published,
			publish_failures = report.publish_failures,
			closed = report.closed,
			notified = report.notified,
			"Room poll finished."
		);

		Ok(report)
	}

	async fn record_publish(
		&self,
		report: &mut PollReport,
		announcement: &RoomAnnouncement<'_>,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> Result<()> {
		match self.publish(announcement, now, cancel).await {
			Ok(true) => report.published += 1,
			Ok(false) => report.publish_failures += 1,
			Err(Error::Nostr(herald_nostr::Error::Cancelled)) => return Err(Error::Cancelled),
			Err(err) => {
				tracing::error!(d_tag = announcement.d_tag, error = %err, "Room event was not published.");

				report.publish_failures += 1;
			},
		}

		Ok(())
	}

	async fn publish(
		&self,
		announcement: &RoomAnnouncement<'_>,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> Result<bool> {
		let event = self.keys.sign(formatter::room_event(announcement, now))?;
		let report = self.broadcaster.broadcast(&event, &self.settings.relays, cancel).await?;

		if report.is_success() {
			tracing::info!(
				d_tag = announcement.d_tag,
				status = announcement.status,
				event_id = %event.id,
				succeeded = report.succeeded.len(),
				"Room event published."
			);
		} else {
			tracing::warn!(
				d_tag = announcement.d_tag,
				status = announcement.status,
				detail = %report.describe(),
				"Room event was not accepted by any relay."
			);
		}

		Ok(report.is_success())
	}
}

/// Ten characters from `[a-z0-9]`.
pub fn generate_d_tag() -> String {
	let mut rng = rand::thread_rng();

	(0..D_TAG_LEN)
		.map(|_| D_TAG_CHARSET[rng.gen_range(0..D_TAG_CHARSET.len())] as char)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn d_tags_use_lowercase_alphanumerics() {
		let tag = generate_d_tag();

		assert_eq!(tag.len(), D_TAG_LEN);
		assert!(tag.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
	}

	#[test]
	fn service_url_escapes_the_room_name() {
		let settings = RoomPollerSettings {
			service_base_url: "https://honey.hivetalk.org/meet/".to_string(),
			..Default::default()
		};

		assert_eq!(
			settings.service_url("Rust Hour"),
			"https://honey.hivetalk.org/meet/Rust%20Hour"
		);
	}
}
