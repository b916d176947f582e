//! Announces scheduled events as live when they start and as ended when they finish.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use herald_config::Config;
use herald_domain::{Action, Outcome, SelectionWindow, relays::merge_relays};
use herald_nostr::Keys;
use herald_storage::{
	UpdateOutcome,
	db::Db,
	events::{self, WindowEdge},
	models::EventRecord,
};

use crate::{
	BoxFuture, Delivery, DeliveryJob, DeliveryTarget, Error, RecordStore, Result, Selection,
	formatter::LiveActivityFormatter,
};

pub const JOB_NAME: &str = "live-events";
pub const ACTION_LIVE: &str = "live";
pub const ACTION_ENDED: &str = "ended";

pub struct LiveEventStore {
	db: Arc<Db>,
	relays: Vec<String>,
	half_width: Duration,
}
impl LiveEventStore {
	pub fn new(db: Arc<Db>, relays: Vec<String>, half_width: Duration) -> Self {
		Self { db, relays, half_width }
	}

	async fn target(&self, record: &EventRecord) -> Result<DeliveryTarget> {
		let Some(room_name) = record.room_name.as_deref() else {
			return Err(Error::InvalidRecord { message: "Event has no room name.".to_string() });
		};
		let room = events::fetch_room_keys(&self.db, room_name)
			.await?
			.ok_or_else(|| Error::MissingRoomKeys { room_name: room_name.to_string() })?;
		let Some(nsec) = room.room_nsec.as_deref().filter(|nsec| !nsec.trim().is_empty()) else {
			return Err(Error::MissingRoomKeys { room_name: room_name.to_string() });
		};
		let keys = Keys::parse(nsec)?;
		let relays = merge_relays(&self.relays, room.room_relay_url.as_deref());

		Ok(DeliveryTarget { relays, keys: Some(keys) })
	}
}
impl RecordStore for LiveEventStore {
	type Key = WindowEdge;
	type Record = EventRecord;

	fn select<'a>(
		&'a self,
		key: &'a WindowEdge,
		action: &'a Action,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<EventRecord>>> {
		Box::pin(async move {
			let window = SelectionWindow::around(now, self.half_width);

			Ok(events::select_in_window(&self.db, *key, &window, &action.excluded_statuses()).await?)
		})
	}

	fn record_id(&self, record: &EventRecord) -> String {
		record.id.to_string()
	}

	fn resolve_target<'a>(
		&'a self,
		record: &'a EventRecord,
	) -> BoxFuture<'a, Result<DeliveryTarget>> {
		Box::pin(self.target(record))
	}

	fn update_status<'a>(
		&'a self,
		record: &'a EventRecord,
		action: &'a Action,
		delivery: &'a Delivery,
	) -> BoxFuture<'a, Result<UpdateOutcome>> {
		Box::pin(async move {
			let event_id = match delivery.outcome {
				Outcome::Sent => delivery.event_id.as_deref(),
				Outcome::Failed => None,
			};

			Ok(events::update_status(
				&self.db,
				record.id,
				action.status_for(delivery.outcome),
				delivery.detail.as_deref(),
				event_id,
				&action.superseding_statuses(),
				delivery.at,
			)
			.await?)
		})
	}
}

/// An event that starts and ends inside one window is seen by both selections, so `live` never
/// selects or overwrites an event the `ended` selection already reached.
pub fn selections() -> Vec<Selection<WindowEdge>> {
	let ended = Action::suffixed(ACTION_ENDED);
	let live = Action::suffixed(ACTION_LIVE)
		.superseded_by(ended.sent_status())
		.superseded_by(ended.failed_status());

	vec![
		Selection { action: live, key: WindowEdge::Start },
		Selection { action: ended, key: WindowEdge::End },
	]
}

pub fn job(db: Arc<Db>, cfg: &Config) -> Result<DeliveryJob<LiveEventStore, LiveActivityFormatter>> {
	let base_url = cfg.require_locator_base_url()?;
	let relays = cfg.require_relays()?.to_vec();
	let store =
		LiveEventStore::new(db, relays, Duration::seconds(cfg.delivery.window_seconds));

	Ok(DeliveryJob {
		name: JOB_NAME.to_string(),
		store,
		formatter: LiveActivityFormatter::new(base_url),
		selections: selections(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn start_and_end_edges_use_separate_vocabularies() {
		let selections = selections();

		assert_eq!(selections[0].key, WindowEdge::Start);
		assert_eq!(selections[0].action.sent_status(), "live:sent");
		assert_eq!(selections[1].key, WindowEdge::End);
		assert_eq!(selections[1].action.failed_status(), "ended:failed");
	}

	#[test]
	fn live_never_follows_ended() {
		let selections = selections();
		let live = &selections[0].action;

		assert!(!live.is_candidate(Some("ended:sent")));
		assert!(!live.is_candidate(Some("ended:failed")));
		assert!(!live.may_overwrite(Some("ended:sent")));
		assert!(live.may_overwrite(Some("live:failed")));
		assert!(selections[1].action.is_candidate(Some("live:sent")));
		assert!(selections[1].action.is_candidate(Some("ended:failed")));
	}
}
