//! Publishes author-signed notes once their scheduled time has passed.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use herald_config::Config;
use herald_domain::{Action, Outcome, SelectionWindow, relays::merge_relays};
use herald_storage::{UpdateOutcome, db::Db, models::NoteRecord, notes};

use crate::{
	BoxFuture, Delivery, DeliveryJob, DeliveryTarget, RecordStore, Result, Selection,
	formatter::PresignedNoteFormatter,
};

pub const JOB_NAME: &str = "scheduled-notes";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_FAILED: &str = "failed";

pub struct ScheduledNoteStore {
	db: Arc<Db>,
	relays: Vec<String>,
	retry_horizon: Duration,
	limit: i64,
}
impl ScheduledNoteStore {
	pub fn new(db: Arc<Db>, relays: Vec<String>, retry_horizon: Duration, limit: i64) -> Self {
		Self { db, relays, retry_horizon, limit }
	}
}
impl RecordStore for ScheduledNoteStore {
	type Key = ();
	type Record = NoteRecord;

	fn select<'a>(
		&'a self,
		_key: &'a (),
		_action: &'a Action,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<NoteRecord>>> {
		Box::pin(async move {
			let window = SelectionWindow::trailing(now, self.retry_horizon);

			Ok(notes::select_due(&self.db, &window, STATUS_PENDING, STATUS_FAILED, Some(self.limit))
				.await?)
		})
	}

	fn record_id(&self, record: &NoteRecord) -> String {
		record.id.to_string()
	}

	fn resolve_target<'a>(
		&'a self,
		record: &'a NoteRecord,
	) -> BoxFuture<'a, Result<DeliveryTarget>> {
		Box::pin(async move {
			let relays = merge_relays(&self.relays, record.relay_urls.iter().map(String::as_str));

			Ok(DeliveryTarget { relays, keys: None })
		})
	}

	fn update_status<'a>(
		&'a self,
		record: &'a NoteRecord,
		action: &'a Action,
		delivery: &'a Delivery,
	) -> BoxFuture<'a, Result<UpdateOutcome>> {
		Box::pin(async move {
			let event_id = match delivery.outcome {
				Outcome::Sent => delivery.event_id.as_deref(),
				Outcome::Failed => None,
			};

			Ok(notes::update_status(
				&self.db,
				record.id,
				action.status_for(delivery.outcome),
				delivery.detail.as_deref(),
				event_id,
				delivery.at,
			)
			.await?)
		})
	}
}

pub fn action() -> Action {
	Action::with_statuses(STATUS_PUBLISHED, STATUS_PUBLISHED, STATUS_FAILED)
}

/// Notes carry their own relays, so the global list may be empty here.
pub fn job(db: Arc<Db>, cfg: &Config) -> DeliveryJob<ScheduledNoteStore, PresignedNoteFormatter> {
	let store = ScheduledNoteStore::new(
		db,
		cfg.nostr.relays.clone(),
		Duration::seconds(cfg.notes.retry_horizon_seconds),
		cfg.delivery.batch_size as i64,
	);

	DeliveryJob {
		name: JOB_NAME.to_string(),
		store,
		formatter: PresignedNoteFormatter,
		selections: vec![Selection { action: action(), key: () }],
	}
}
