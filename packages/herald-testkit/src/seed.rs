//! Row fixtures. The schema must already be in place.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::Result;

#[derive(Debug, Clone)]
pub struct EventSeed {
	pub name: String,
	pub description: Option<String>,
	pub start_time: OffsetDateTime,
	pub end_time: OffsetDateTime,
	pub room_name: Option<String>,
	pub identifier: Option<String>,
	pub naddr_id: Option<String>,
	pub status: Option<String>,
	pub nostr_status: Option<String>,
}
impl EventSeed {
	/// A one hour event in room `rust-hour` starting at `start_time`.
	pub fn starting_at(start_time: OffsetDateTime) -> Self {
		Self {
			name: "Rust Hour".to_string(),
			description: Some(String::new()),
			start_time,
			end_time: start_time + Duration::hours(1),
			room_name: Some("rust-hour".to_string()),
			identifier: Some("rust-hour-1".to_string()),
			naddr_id: None,
			status: None,
			nostr_status: None,
		}
	}

	pub fn with_status(mut self, status: &str) -> Self {
		self.status = Some(status.to_string());

		self
	}
}

#[derive(Debug, Clone)]
pub struct NoteSeed {
	pub profile_id: String,
	pub content: String,
	pub scheduled_for: OffsetDateTime,
	pub status: String,
	pub relay_urls: Vec<String>,
	pub signed_event: Option<String>,
}
impl NoteSeed {
	pub fn pending_at(scheduled_for: OffsetDateTime) -> Self {
		Self {
			profile_id: "profile-1".to_string(),
			content: "hello".to_string(),
			scheduled_for,
			status: "pending".to_string(),
			relay_urls: Vec::new(),
			signed_event: Some("{}".to_string()),
		}
	}

	pub fn with_status(mut self, status: &str) -> Self {
		self.status = status.to_string();

		self
	}
}

pub async fn insert_event(pool: &PgPool, seed: &EventSeed) -> Result<Uuid> {
	let id = sqlx::query_scalar(
		"\
INSERT INTO events (
	name, description, start_time, end_time, room_name, identifier, naddr_id, status, nostr_status
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
RETURNING id",
	)
	.bind(&seed.name)
	.bind(seed.description.as_deref())
	.bind(seed.start_time)
	.bind(seed.end_time)
	.bind(seed.room_name.as_deref())
	.bind(seed.identifier.as_deref())
	.bind(seed.naddr_id.as_deref())
	.bind(seed.status.as_deref())
	.bind(seed.nostr_status.as_deref())
	.fetch_one(pool)
	.await?;

	Ok(id)
}

pub async fn insert_room(
	pool: &PgPool,
	room_name: &str,
	room_nsec: Option<&str>,
	room_relay_url: Option<&str>,
) -> Result<()> {
	sqlx::query("INSERT INTO room_info (room_name, room_nsec, room_relay_url) VALUES ($1, $2, $3)")
		.bind(room_name)
		.bind(room_nsec)
		.bind(room_relay_url)
		.execute(pool)
		.await?;

	Ok(())
}

pub async fn insert_note(pool: &PgPool, seed: &NoteSeed) -> Result<Uuid> {
	let id = sqlx::query_scalar(
		"\
INSERT INTO scheduled_notes (profile_id, content, scheduled_for, status, relay_urls, signed_event)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id",
	)
	.bind(&seed.profile_id)
	.bind(&seed.content)
	.bind(seed.scheduled_for)
	.bind(&seed.status)
	.bind(&seed.relay_urls)
	.bind(seed.signed_event.as_deref())
	.fetch_one(pool)
	.await?;

	Ok(id)
}
