/// Room name that the event form assigns when the host did not pick one.
pub const RANDOM_ROOM_SENTINEL: &str = "Random Room";

/// Picks the path segment of the join link: the room name, unless it is missing or the random
/// sentinel, in which case the record identifier is used.
pub fn room_slug<'a>(room_name: Option<&'a str>, record_id: &'a str) -> &'a str {
	match room_name.map(str::trim) {
		Some(name) if !name.is_empty() && name != RANDOM_ROOM_SENTINEL => name,
		_ => record_id,
	}
}

pub fn join_url(base_url: &str, slug: &str) -> String {
	format!("{}/join/{slug}", base_url.trim_end_matches('/'))
}
