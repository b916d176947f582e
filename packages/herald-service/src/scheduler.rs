//! Batch select, fan-out publish and status reconciliation shared by every delivery job.
//!
//! One invocation runs each [`Selection`] of a [`DeliveryJob`] concurrently. A selection's
//! records are split into fixed-size batches processed one after another; inside a batch a
//! semaphore caps how many records are in flight. A batch with any failed record stops its
//! selection, but records already reconciled keep their status. A store error while resolving or
//! persisting a record aborts the selection without recording a status for that record.

use std::fmt;

use futures::future;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use herald_domain::{Action, Outcome, detail::sanitize_detail};
use herald_nostr::{Broadcaster, Event, Keys};
use herald_storage::UpdateOutcome;

use crate::{BoxFuture, Draft, Error, Formatter, Result};

/// Where and as whom a record is published.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTarget {
	pub relays: Vec<String>,
	pub keys: Option<Keys>,
}

/// The outcome handed back to the store for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
	pub outcome: Outcome,
	pub event_id: Option<String>,
	pub detail: Option<String>,
	pub at: OffsetDateTime,
}

pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Distinguishes the selections of one job, for example start versus end window.
	type Key: fmt::Debug + Send + Sync;
	type Record: Send + Sync;

	fn select<'a>(
		&'a self,
		key: &'a Self::Key,
		action: &'a Action,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<Self::Record>>>;

	fn record_id(&self, record: &Self::Record) -> String;

	fn resolve_target<'a>(
		&'a self,
		record: &'a Self::Record,
	) -> BoxFuture<'a, Result<DeliveryTarget>>;

	fn update_status<'a>(
		&'a self,
		record: &'a Self::Record,
		action: &'a Action,
		delivery: &'a Delivery,
	) -> BoxFuture<'a, Result<UpdateOutcome>>;
}

#[derive(Debug, Clone)]
pub struct Selection<K> {
	pub action: Action,
	pub key: K,
}

/// A store, a formatter and the selections that make up one job.
pub struct DeliveryJob<S, F>
where
	S: RecordStore,
{
	pub name: String,
	pub store: S,
	pub formatter: F,
	pub selections: Vec<Selection<S::Key>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
	pub batch_size: usize,
	pub max_workers: usize,
}
impl Default for SchedulerSettings {
	fn default() -> Self {
		Self { batch_size: 25, max_workers: 2 }
	}
}
impl From<&herald_config::Delivery> for SchedulerSettings {
	fn from(cfg: &herald_config::Delivery) -> Self {
		Self { batch_size: cfg.batch_size, max_workers: cfg.max_workers }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
	pub action: String,
	pub selected: usize,
	pub delivered: usize,
	pub failed: usize,
	pub skipped_batches: usize,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationReport {
	pub job: String,
	pub selections: Vec<SelectionReport>,
}
impl InvocationReport {
	pub fn is_success(&self) -> bool {
		self.selections.iter().all(|selection| selection.error.is_none())
	}

	pub fn delivered(&self) -> usize {
		self.selections.iter().map(|selection| selection.delivered).sum()
	}

	pub fn failed(&self) -> usize {
		self.selections.iter().map(|selection| selection.failed).sum()
	}

	pub fn errors(&self) -> Vec<String> {
		self.selections
			.iter()
			.filter_map(|selection| {
				selection.error.as_ref().map(|err| format!("{}: {err}", selection.action))
			})
			.collect()
	}
}

enum RecordResult {
	Delivered,
	Failed,
	Cancelled,
	Aborted(String),
}

pub struct Scheduler {
	settings: SchedulerSettings,
	broadcaster: Broadcaster,
}
impl Scheduler {
	pub fn new(settings: SchedulerSettings, broadcaster: Broadcaster) -> Self {
		let settings = SchedulerSettings {
			batch_size: settings.batch_size.max(1),
			max_workers: settings.max_workers.max(1),
		};

		Self { settings, broadcaster }
	}

	pub async fn run<S, F>(
		&self,
		job: &DeliveryJob<S, F>,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> InvocationReport
	where
		S: RecordStore,
		F: Formatter<S::Record>,
	{
		let selections = job
			.selections
			.iter()
			.map(|selection| self.run_selection(job, selection, now, cancel));
		let selections = future::join_all(selections).await;
		let report = InvocationReport { job: job.name.clone(), selections };

		for selection in &report.selections {
			tracing::info!(
				job = %report.job,
				action = %selection.action,
				selected = selection.selected,
				delivered = selection.delivered,
				failed = selection.failed,
				skipped_batches = selection.skipped_batches,
				error = selection.error.as_deref().unwrap_or(""),
				"Selection finished."
			);
		}

		report
	}

	async fn run_selection<S, F>(
		&self,
		job: &DeliveryJob<S, F>,
		selection: &Selection<S::Key>,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> SelectionReport
	where
		S: RecordStore,
		F: Formatter<S::Record>,
	{
		let action = &selection.action;
		let mut report = SelectionReport { action: action.name().to_string(), ..Default::default() };
		let records = tokio::select! {
			biased;

			_ = cancel.cancelled() => Err(Error::Cancelled),
			records = job.store.select(&selection.key, action, now) => records,
		};
		let records = match records {
			Ok(records) => records,
			Err(err) => {
				tracing::error!(error = %err, action = %action, key = ?selection.key, "Selection query failed.");

				report.error = Some(err.to_string());

				return report;
			},
		};

		report.selected = records.len();

		tracing::info!(action = %action, key = ?selection.key, selected = records.len(), "Records selected.");

		let batches = records.chunks(self.settings.batch_size).collect::<Vec<_>>();
		let workers = Semaphore::new(self.settings.max_workers);
		let workers = &workers;

		for (index, batch) in batches.iter().enumerate() {
			if cancel.is_cancelled() {
				report.skipped_batches = batches.len() - index;
				report.error = Some(Error::Cancelled.to_string());

				break;
			}

			let results = future::join_all(batch.iter().map(|record| async move {
				let Ok(_permit) = workers.acquire().await else {
					return RecordResult::Cancelled;
				};

				self.process_record(job, record, action, now, cancel).await
			}))
			.await;
			let mut batch_failed = 0;
			let mut batch_cancelled = false;
			let mut store_error = None;

			for result in results {
				match result {
					RecordResult::Delivered => report.delivered += 1,
					RecordResult::Failed => batch_failed += 1,
					RecordResult::Cancelled => batch_cancelled = true,
					RecordResult::Aborted(message) => store_error = Some(message),
				}
			}

			report.failed += batch_failed;

			if let Some(message) = store_error {
				report.skipped_batches = batches.len() - index - 1;
				report.error = Some(format!(
					"Store error in batch {} of {}: {message}",
					index + 1,
					batches.len()
				));

				break;
			}
			if batch_cancelled {
				report.skipped_batches = batches.len() - index - 1;
				report.error = Some(Error::Cancelled.to_string());

				break;
			}
			if batch_failed > 0 {
				report.skipped_batches = batches.len() - index - 1;
				report.error = Some(format!(
					"Batch {} of {} had {batch_failed} failed records.",
					index + 1,
					batches.len()
				));

				break;
			}
		}

		report
	}

	async fn process_record<S, F>(
		&self,
		job: &DeliveryJob<S, F>,
		record: &S::Record,
		action: &Action,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> RecordResult
	where
		S: RecordStore,
		F: Formatter<S::Record>,
	{
		let record_id = job.store.record_id(record);
		let delivery = match self.deliver(job, record, action, now, cancel).await {
			Ok(delivery) => delivery,
			Err(Error::Cancelled) | Err(Error::Nostr(herald_nostr::Error::Cancelled)) => {
				tracing::warn!(record_id = %record_id, action = %action, "Delivery cancelled. Status left unchanged.");

				return RecordResult::Cancelled;
			},
			Err(Error::Storage(err)) => {
				tracing::error!(record_id = %record_id, action = %action, error = %err, "Store error before broadcast. Aborting selection.");

				return RecordResult::Aborted(err.to_string());
			},
			Err(err) => {
				tracing::error!(record_id = %record_id, action = %action, error = %err, "Delivery failed before broadcast.");

				Delivery {
					outcome: Outcome::Failed,
					event_id: None,
					detail: Some(sanitize_detail(&err.to_string())),
					at: now,
				}
			},
		};
		let status = action.status_for(delivery.outcome);

		match job.store.update_status(record, action, &delivery).await {
			Ok(UpdateOutcome::Updated) => {
				tracing::info!(record_id = %record_id, action = %action, status, "Record status persisted.");
			},
			Ok(UpdateOutcome::Unchanged) => {
				tracing::info!(record_id = %record_id, action = %action, status, "Record already carried this status.");
			},
			Ok(UpdateOutcome::NotFound) => {
				tracing::warn!(record_id = %record_id, action = %action, status, "Record vanished before its status was persisted.");
			},
			Err(err) => {
				tracing::error!(record_id = %record_id, action = %action, status, error = %err, "Failed to persist record status. Aborting selection.");

				return RecordResult::Aborted(err.to_string());
			},
		}

		match delivery.outcome {
			Outcome::Sent => RecordResult::Delivered,
			Outcome::Failed => RecordResult::Failed,
		}
	}

	async fn deliver<S, F>(
		&self,
		job: &DeliveryJob<S, F>,
		record: &S::Record,
		action: &Action,
		now: OffsetDateTime,
		cancel: &CancellationToken,
	) -> Result<Delivery>
	where
		S: RecordStore,
		F: Formatter<S::Record>,
	{
		let record_id = job.store.record_id(record);
		let target = job.store.resolve_target(record).await?;
		let draft = job.formatter.format(record, action, now)?;

		tracing::debug!(record_id = %record_id, action = %action, relays = target.relays.len(), "Record formatted.");

		let event = sign(draft, target.keys.as_ref())?;

		tracing::debug!(record_id = %record_id, event_id = %event.id, "Event signed.");

		let report = self.broadcaster.broadcast(&event, &target.relays, cancel).await?;

		tracing::info!(
			record_id = %record_id,
			action = %action,
			event_id = %event.id,
			succeeded = report.succeeded.len(),
			failed = report.failed.len(),
			"Broadcast finished."
		);

		let outcome = if report.is_success() { Outcome::Sent } else { Outcome::Failed };
		let detail = (!report.failed.is_empty() || !report.is_success())
			.then(|| sanitize_detail(&report.describe()));

		Ok(Delivery { outcome, event_id: Some(event.id), detail, at: now })
	}
}

fn sign(draft: Draft, keys: Option<&Keys>) -> Result<Event> {
	match draft {
		Draft::Unsigned(template) => {
			let Some(keys) = keys else {
				return Err(Error::InvalidRecord {
					message: "No signing key for an unsigned event.".to_string(),
				});
			};

			Ok(keys.sign(template)?)
		},
		Draft::Presigned(event) => {
			herald_nostr::verify(&event)?;

			Ok(event)
		},
	}
}
