use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use herald_domain::non_empty;

#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
	pub id: Uuid,
	pub profile_id: Option<String>,
	pub name: String,
	pub description: Option<String>,
	pub image_url: Option<String>,
	pub start_time: OffsetDateTime,
	pub end_time: OffsetDateTime,
	pub room_name: Option<String>,
	pub identifier: Option<String>,
	pub naddr_id: Option<String>,
	pub nostr_pubkey: Option<String>,
	pub status: Option<String>,
	pub status_detail: Option<String>,
	pub nostr_status: Option<String>,
}

/// A scheduled event with blank optional text already mapped to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
	pub id: Uuid,
	pub profile_id: Option<String>,
	pub name: String,
	pub description: Option<String>,
	pub image_url: Option<String>,
	pub start_time: OffsetDateTime,
	pub end_time: OffsetDateTime,
	pub room_name: Option<String>,
	pub identifier: Option<String>,
	pub naddr_id: Option<String>,
	pub nostr_pubkey: Option<String>,
	pub status: Option<String>,
	pub status_detail: Option<String>,
	pub nostr_status: Option<String>,
}
impl From<EventRow> for EventRecord {
	fn from(row: EventRow) -> Self {
		Self {
			id: row.id,
			profile_id: non_empty(row.profile_id),
			name: row.name,
			description: non_empty(row.description),
			image_url: non_empty(row.image_url),
			start_time: row.start_time,
			end_time: row.end_time,
			room_name: non_empty(row.room_name),
			identifier: non_empty(row.identifier),
			naddr_id: non_empty(row.naddr_id),
			nostr_pubkey: non_empty(row.nostr_pubkey),
			status: non_empty(row.status),
			status_detail: non_empty(row.status_detail),
			nostr_status: non_empty(row.nostr_status),
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomKeys {
	pub room_name: String,
	pub room_npub: Option<String>,
	pub room_nsec: Option<String>,
	pub room_relay_url: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct NoteRow {
	pub id: Uuid,
	pub profile_id: String,
	pub content: String,
	pub scheduled_for: OffsetDateTime,
	pub status: String,
	pub relay_urls: Option<Vec<String>>,
	pub event_id: Option<String>,
	pub error_message: Option<String>,
	pub signed_event: Option<String>,
}

/// A note whose event was signed ahead of time by its author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
	pub id: Uuid,
	pub profile_id: String,
	pub content: String,
	pub scheduled_for: OffsetDateTime,
	pub status: String,
	pub relay_urls: Vec<String>,
	pub event_id: Option<String>,
	pub error_message: Option<String>,
	pub signed_event: Option<String>,
}
impl From<NoteRow> for NoteRecord {
	fn from(row: NoteRow) -> Self {
		Self {
			id: row.id,
			profile_id: row.profile_id,
			content: row.content,
			scheduled_for: row.scheduled_for,
			status: row.status,
			relay_urls: row
				.relay_urls
				.unwrap_or_default()
				.into_iter()
				.filter(|relay| !relay.trim().is_empty())
				.collect(),
			event_id: non_empty(row.event_id),
			error_message: non_empty(row.error_message),
			signed_event: non_empty(row.signed_event),
		}
	}
}

/// Association between an upstream room and the `d` tag it is announced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
	pub d_tag: String,
	pub room_name: String,
	pub status: String,
	/// Unix seconds of the last poll that saw the room.
	pub last_seen: i64,
}
