//! Maps records onto Nostr event bodies.

use time::OffsetDateTime;

use herald_domain::{Action, locator};
use herald_nostr::{
	Event, EventTemplate, KIND_INTERACTIVE_ROOM, KIND_LIVE_ACTIVITY, Tag, event::tag,
};
use herald_storage::models::{EventRecord, NoteRecord};

use crate::{Error, Result};

/// What the formatter hands to the signing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
	/// Needs the delivery target's keys.
	Unsigned(EventTemplate),
	/// Already signed by its author; only verified before publishing.
	Presigned(Event),
}

pub trait Formatter<R>
where
	Self: Send + Sync,
{
	fn format(&self, record: &R, action: &Action, now: OffsetDateTime) -> Result<Draft>;
}

/// Kind 30311 live activity for a scheduled event. The action name is the announced status.
#[derive(Debug, Clone)]
pub struct LiveActivityFormatter {
	base_url: String,
}
impl LiveActivityFormatter {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self { base_url: base_url.into() }
	}

	pub fn template(
		&self,
		record: &EventRecord,
		status: &str,
		now: OffsetDateTime,
	) -> EventTemplate {
		let record_id = record.id.to_string();
		let identifier = record.identifier.as_deref().unwrap_or(&record_id);
		let slug = locator::room_slug(record.room_name.as_deref(), identifier);
		let mut tags = vec![
			tag(["d", identifier]),
			tag(["title", &record.name]),
			tag(["starts", &record.start_time.unix_timestamp().to_string()]),
			tag(["ends", &record.end_time.unix_timestamp().to_string()]),
			tag(["status", status]),
			tag(["streaming", &locator::join_url(&self.base_url, slug)]),
			tag(["t", "nostr"]),
			tag(["t", "hivetalk"]),
			tag(["t", "livestream"]),
		];

		if let Some(summary) = record.description.as_deref() {
			tags.push(tag(["summary", summary]));
		}
		if let Some(image) = record.image_url.as_deref() {
			tags.push(tag(["image", image]));
		}

		EventTemplate {
			created_at: now.unix_timestamp(),
			kind: KIND_LIVE_ACTIVITY,
			tags,
			content: String::new(),
		}
	}
}
impl Formatter<EventRecord> for LiveActivityFormatter {
	fn format(&self, record: &EventRecord, action: &Action, now: OffsetDateTime) -> Result<Draft> {
		Ok(Draft::Unsigned(self.template(record, action.name(), now)))
	}
}

/// Scheduled notes carry the author's signed event verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresignedNoteFormatter;
impl Formatter<NoteRecord> for PresignedNoteFormatter {
	fn format(&self, record: &NoteRecord, _action: &Action, _now: OffsetDateTime) -> Result<Draft> {
		let Some(raw) = record.signed_event.as_deref() else {
			return Err(Error::InvalidRecord { message: "Signed event is null.".to_string() });
		};
		let event = Event::from_json(raw).map_err(|err| Error::InvalidRecord {
			message: format!("Failed to decode signed event: {err}"),
		})?;

		Ok(Draft::Presigned(event))
	}
}

/// Everything announced about an interactive room.
#[derive(Debug, Clone)]
pub struct RoomAnnouncement<'a> {
	pub d_tag: &'a str,
	pub room_name: &'a str,
	pub summary: &'a str,
	pub status: &'a str,
	pub image: Option<&'a str>,
	pub service_url: &'a str,
	pub owner: Option<&'a str>,
	pub topics: &'a [String],
	pub relays: &'a [String],
}

/// Kind 30312 interactive room event.
pub fn room_event(announcement: &RoomAnnouncement<'_>, now: OffsetDateTime) -> EventTemplate {
	let mut tags = vec![
		tag(["d", announcement.d_tag]),
		tag(["room", announcement.room_name]),
		tag(["summary", announcement.summary]),
		tag(["status", announcement.status]),
	];

	if let Some(image) = announcement.image {
		tags.push(tag(["image", image]));
	}

	tags.push(tag(["service", announcement.service_url]));

	if let Some(owner) = announcement.owner {
		tags.push(tag(["p", owner, "", "owner"]));
	}
	for topic in announcement.topics {
		tags.push(tag(["t", topic]));
	}

	let mut relays: Tag = vec!["relays".to_string()];

	relays.extend(announcement.relays.iter().cloned());
	tags.push(relays);

	EventTemplate {
		created_at: now.unix_timestamp(),
		kind: KIND_INTERACTIVE_ROOM,
		tags,
		content: String::new(),
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;
	use uuid::Uuid;

	use super::*;

	fn record() -> EventRecord {
		EventRecord {
			id: Uuid::nil(),
			profile_id: Some("profile-1".to_string()),
			name: "Rust Hour".to_string(),
			description: None,
			image_url: Some("https://img.example/banner.png".to_string()),
			start_time: datetime!(2025-05-10 18:00 UTC),
			end_time: datetime!(2025-05-10 19:00 UTC),
			room_name: Some("rust-hour".to_string()),
			identifier: Some("rust-hour-1".to_string()),
			naddr_id: None,
			nostr_pubkey: None,
			status: None,
			status_detail: None,
			nostr_status: None,
		}
	}

	#[test]
	fn live_activity_tags_follow_the_fixed_order() {
		let formatter = LiveActivityFormatter::new("https://honey.hivetalk.org");
		let template = formatter.template(&record(), "live", datetime!(2025-05-10 18:01 UTC));
		let names = template.tags.iter().map(|tag| tag[0].as_str()).collect::<Vec<_>>();

		assert_eq!(
			names,
			vec!["d", "title", "starts", "ends", "status", "streaming", "t", "t", "t", "image"]
		);
		assert_eq!(template.tag_value("starts"), Some("1746900000"));
		assert_eq!(template.tag_value("status"), Some("live"));
		assert_eq!(
			template.tag_value("streaming"),
			Some("https://honey.hivetalk.org/join/rust-hour")
		);
		assert_eq!(template.created_at, datetime!(2025-05-10 18:01 UTC).unix_timestamp());
		assert_eq!(template.kind, KIND_LIVE_ACTIVITY);
	}

	#[test]
	fn random_room_streams_under_the_identifier() {
		let mut record = record();

		record.room_name = Some("Random Room".to_string());
		record.identifier = None;

		let template = LiveActivityFormatter::new("https://h.example").template(
			&record,
			"ended",
			datetime!(2025-05-10 19:00 UTC),
		);

		assert_eq!(template.tag_value("d"), Some(Uuid::nil().to_string().as_str()));
		assert_eq!(
			template.tag_value("streaming"),
			Some(format!("https://h.example/join/{}", Uuid::nil()).as_str())
		);
	}

	#[test]
	fn room_event_lists_owner_topics_and_relays() {
		let topics = vec!["hivetalk-honey".to_string(), "interactive room".to_string()];
		let relays = vec!["wss://a".to_string(), "wss://b".to_string()];
		let template = room_event(
			&RoomAnnouncement {
				d_tag: "abc123xyz0",
				room_name: "Rust Hour",
				summary: "Rust Hour is now closed",
				status: "closed",
				image: None,
				service_url: "https://honey.hivetalk.org/meet/Rust%20Hour",
				owner: Some("bb"),
				topics: &topics,
				relays: &relays,
			},
			datetime!(2025-05-10 19:00 UTC),
		);

		assert_eq!(template.kind, KIND_INTERACTIVE_ROOM);
		assert_eq!(template.tags[4], vec!["service", "https://honey.hivetalk.org/meet/Rust%20Hour"]);
		assert_eq!(template.tags[5], vec!["p", "bb", "", "owner"]);
		assert_eq!(template.tags[6], vec!["t", "hivetalk-honey"]);
		assert_eq!(template.tags.last(), Some(&vec![
			"relays".to_string(),
			"wss://a".to_string(),
			"wss://b".to_string()
		]));
	}
}
