use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

pub type Tag = Vec<String>;

/// Builds a tag from string slices.
pub fn tag<const N: usize>(parts: [&str; N]) -> Tag {
	parts.iter().map(|part| part.to_string()).collect()
}

/// Everything an event carries before an author is attached and it is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
	pub created_at: i64,
	pub kind: u16,
	pub tags: Vec<Tag>,
	pub content: String,
}
impl EventTemplate {
	pub fn tag_value(&self, name: &str) -> Option<&str> {
		find_tag(&self.tags, name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	pub id: String,
	pub pubkey: String,
	pub created_at: i64,
	pub kind: u16,
	pub tags: Vec<Tag>,
	pub content: String,
	pub sig: String,
}
impl Event {
	pub fn from_json(raw: &str) -> Result<Self> {
		let event: Self = serde_json::from_str(raw)?;

		if event.id.len() != 64 || event.pubkey.len() != 64 || event.sig.len() != 128 {
			return Err(Error::InvalidEvent(
				"id, pubkey and sig must be lowercase hex of the expected length.".to_string(),
			));
		}

		Ok(event)
	}

	pub fn tag_value(&self, name: &str) -> Option<&str> {
		find_tag(&self.tags, name)
	}
}

/// NIP-01 event id: sha256 over `[0, pubkey, created_at, kind, tags, content]`.
pub fn compute_id(
	pubkey: &str,
	created_at: i64,
	kind: u16,
	tags: &[Tag],
	content: &str,
) -> Result<[u8; 32]> {
	let canonical = serde_json::to_string(&json!([0, pubkey, created_at, kind, tags, content]))?;

	Ok(Sha256::digest(canonical.as_bytes()).into())
}

fn find_tag<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
	tags.iter()
		.find(|tag| tag.first().map(String::as_str) == Some(name))
		.and_then(|tag| tag.get(1))
		.map(String::as_str)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_matches_canonical_serialization() {
		let id = compute_id(
			"79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
			1_700_000_000,
			1,
			&[tag(["t", "nostr"])],
			"hello \"world\"\n",
		)
		.expect("Failed to compute id.");

		assert_eq!(
			hex::encode(id),
			"81458dc346f6fc850dffb2df62c0694c2a5a96e78ed308310e7f9982a2dbdac4"
		);
	}

	#[test]
	fn tag_lookup_returns_first_value() {
		let template = EventTemplate {
			created_at: 0,
			kind: 1,
			tags: vec![tag(["t", "nostr"]), tag(["t", "hivetalk"]), tag(["d"])],
			content: String::new(),
		};

		assert_eq!(template.tag_value("t"), Some("nostr"));
		assert_eq!(template.tag_value("d"), None);
		assert_eq!(template.tag_value("missing"), None);
	}
}
