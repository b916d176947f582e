//! Re-announces edited events as `planned` under the service identity.

use std::sync::Arc;

use time::OffsetDateTime;

use herald_config::Config;
use herald_domain::{Action, Outcome};
use herald_nostr::Keys;
use herald_storage::{UpdateOutcome, db::Db, events, models::EventRecord};

use crate::{
	BoxFuture, Delivery, DeliveryJob, DeliveryTarget, RecordStore, Result, Selection,
	formatter::LiveActivityFormatter,
};

pub const JOB_NAME: &str = "event-updates";
pub const ACTION_PLANNED: &str = "planned";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSED: &str = "processed";
pub const STATUS_FAILED: &str = "failed";

const SELECTION_LIMIT: i64 = 100;

pub struct EventUpdateStore {
	db: Arc<Db>,
	relays: Vec<String>,
	keys: Keys,
}
impl EventUpdateStore {
	pub fn new(db: Arc<Db>, relays: Vec<String>, keys: Keys) -> Self {
		Self { db, relays, keys }
	}
}
impl RecordStore for EventUpdateStore {
	type Key = ();
	type Record = EventRecord;

	fn select<'a>(
		&'a self,
		_key: &'a (),
		_action: &'a Action,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<EventRecord>>> {
		Box::pin(async move {
			Ok(events::select_pending_updates(
				&self.db,
				&[STATUS_PENDING, STATUS_FAILED],
				SELECTION_LIMIT,
			)
			.await?)
		})
	}

	fn record_id(&self, record: &EventRecord) -> String {
		record.id.to_string()
	}

	fn resolve_target<'a>(
		&'a self,
		_record: &'a EventRecord,
	) -> BoxFuture<'a, Result<DeliveryTarget>> {
		Box::pin(async move {
			Ok(DeliveryTarget { relays: self.relays.clone(), keys: Some(self.keys.clone()) })
		})
	}

	fn update_status<'a>(
		&'a self,
		record: &'a EventRecord,
		action: &'a Action,
		delivery: &'a Delivery,
	) -> BoxFuture<'a, Result<UpdateOutcome>> {
		Box::pin(async move {
			let processed_at = match delivery.outcome {
				Outcome::Sent => Some(delivery.at),
				Outcome::Failed => None,
			};
			let error = match delivery.outcome {
				Outcome::Sent => None,
				Outcome::Failed => delivery.detail.as_deref(),
			};

			Ok(events::update_nostr_status(
				&self.db,
				record.id,
				action.status_for(delivery.outcome),
				error,
				processed_at,
				delivery.at,
			)
			.await?)
		})
	}
}

pub fn action() -> Action {
	Action::with_statuses(ACTION_PLANNED, STATUS_PROCESSED, STATUS_FAILED)
}

pub fn job(db: Arc<Db>, cfg: &Config) -> Result<DeliveryJob<EventUpdateStore, LiveActivityFormatter>> {
	let base_url = cfg.require_locator_base_url()?;
	let relays = cfg.require_relays()?.to_vec();
	let keys = Keys::parse(cfg.require_secret_key()?)?;

	Ok(DeliveryJob {
		name: JOB_NAME.to_string(),
		store: EventUpdateStore::new(db, relays, keys),
		formatter: LiveActivityFormatter::new(base_url),
		selections: vec![Selection { action: action(), key: () }],
	})
}
