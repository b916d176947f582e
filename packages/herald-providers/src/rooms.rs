//! Upstream source of currently active rooms.

use std::time::Duration;

use reqwest::{
	Client,
	header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Deserialize;

use crate::{Error, Result};

pub const STATUS_OPEN: &str = "open";
pub const STATUS_CLOSED: &str = "closed";

/// A room as reported by the upstream service, normalized across payload shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoom {
	pub id: String,
	pub name: String,
	pub participants: u32,
	pub description: Option<String>,
	pub picture_url: Option<String>,
	pub status: Option<String>,
	/// Hex pubkey of the presenter who owns the room.
	pub owner: Option<String>,
}
impl ActiveRoom {
	/// Explicit upstream status wins; otherwise an empty room is closed.
	pub fn effective_status(&self) -> &str {
		match self.status.as_deref() {
			Some(status) => status,
			None if self.participants == 0 => STATUS_CLOSED,
			None => STATUS_OPEN,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomsPayload {
	Meetings { meetings: Vec<Meeting> },
	Rooms(Vec<ListedRoom>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedRoom {
	name: String,
	sid: String,
	#[serde(default)]
	num_participants: u32,
	description: Option<String>,
	picture_url: Option<String>,
	status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meeting {
	room_id: String,
	#[serde(default)]
	peers: Vec<Peer>,
}

#[derive(Debug, Deserialize)]
struct Peer {
	#[serde(default)]
	presenter: bool,
	pubkey: Option<String>,
}

pub struct HttpRoomSource {
	client: Client,
	url: String,
}
impl HttpRoomSource {
	pub fn new(cfg: &herald_config::Rooms) -> Result<Self> {
		let mut headers = HeaderMap::new();

		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		if let Some(api_key) = cfg.api_key.as_deref() {
			let mut value = HeaderValue::from_str(api_key)?;

			value.set_sensitive(true);
			headers.insert(AUTHORIZATION, value);
		}

		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.request_timeout_ms))
			.default_headers(headers)
			.build()?;

		Ok(Self { client, url: cfg.source_url.clone() })
	}

	pub async fn fetch(&self) -> Result<Vec<ActiveRoom>> {
		let res = self.client.get(&self.url).send().await?;
		let body = res.error_for_status()?.bytes().await?;

		parse_rooms(&body)
	}
}

pub fn parse_rooms(body: &[u8]) -> Result<Vec<ActiveRoom>> {
	let payload: RoomsPayload = serde_json::from_slice(body).map_err(|err| {
		Error::InvalidResponse { message: format!("Unrecognized rooms payload: {err}.") }
	})?;
	let rooms = match payload {
		RoomsPayload::Rooms(rooms) => rooms
			.into_iter()
			.map(|room| ActiveRoom {
				id: room.sid,
				name: room.name,
				participants: room.num_participants,
				description: non_blank(room.description),
				picture_url: non_blank(room.picture_url),
				status: non_blank(room.status),
				owner: None,
			})
			.collect(),
		RoomsPayload::Meetings { meetings } => meetings
			.into_iter()
			.filter_map(|meeting| {
				let owner = meeting
					.peers
					.iter()
					.filter(|peer| peer.presenter)
					.find_map(|peer| non_blank(peer.pubkey.clone()));
				let Some(owner) = owner else {
					tracing::info!(room_id = %meeting.room_id, "Skipping room without a presenter pubkey.");

					return None;
				};

				Some(ActiveRoom {
					name: meeting.room_id.clone(),
					participants: meeting.peers.len() as u32,
					id: meeting.room_id,
					description: None,
					picture_url: None,
					status: Some(STATUS_OPEN.to_string()),
					owner: Some(owner),
				})
			})
			.collect(),
	};

	Ok(rooms)
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.trim().is_empty())
}
