use time::{Duration, macros::datetime};

use herald_domain::{
	Action, SelectionWindow,
	locator::{self, RANDOM_ROOM_SENTINEL},
	non_empty,
};

#[test]
fn minute_polls_see_a_record_at_least_four_times() {
	let at = datetime!(2025-05-10 18:00 UTC);
	let half_width = Duration::seconds(120);
	let runs = (-10..=10)
		.map(|offset| at + Duration::minutes(offset))
		.filter(|now| SelectionWindow::around(*now, half_width).contains(at))
		.count();

	assert!(runs >= 4, "record was visible to only {runs} runs");
}

#[test]
fn sent_records_are_never_candidates_again() {
	let live = Action::suffixed("live");
	let ended = Action::suffixed("ended");

	assert!(!live.is_candidate(Some("live:sent")));
	assert!(!ended.is_candidate(Some("ended:sent")));
	assert!(ended.is_candidate(Some("live:sent")));
}

#[test]
fn failed_records_stay_eligible() {
	let published = Action::with_statuses("published", "published", "failed");

	assert!(published.is_candidate(Some("failed")));
	assert!(published.is_candidate(Some("pending")));
	assert!(!published.is_candidate(Some("published")));
}

#[test]
fn random_room_falls_back_to_record_id() {
	assert_eq!(locator::room_slug(Some(RANDOM_ROOM_SENTINEL), "evt-1"), "evt-1");
	assert_eq!(locator::room_slug(Some("  "), "evt-1"), "evt-1");
	assert_eq!(locator::room_slug(None, "evt-1"), "evt-1");
	assert_eq!(locator::room_slug(Some("rust-meetup"), "evt-1"), "rust-meetup");
	assert_eq!(
		locator::join_url("https://honey.hivetalk.org/", "rust-meetup"),
		"https://honey.hivetalk.org/join/rust-meetup"
	);
}

#[test]
fn blank_text_is_treated_as_missing() {
	assert_eq!(non_empty(Some("  ".to_string())), None);
	assert_eq!(non_empty(Some("banner.png".to_string())), Some("banner.png".to_string()));
	assert_eq!(non_empty(None), None);
}
