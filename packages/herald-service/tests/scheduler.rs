use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use time::{OffsetDateTime, macros::datetime};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use herald_domain::{Action, Outcome};
use herald_nostr::{BoxFuture, Broadcaster, Event, EventTemplate, Keys, RelayClient, event::tag};
use herald_service::{
	Delivery, DeliveryJob, DeliveryTarget, Draft, Error, Formatter, RecordStore, Result,
	Scheduler, SchedulerSettings, Selection,
};
use herald_service::jobs::live_events;
use herald_storage::{UpdateOutcome, events::WindowEdge};

const GOOD_RELAY: &str = "wss://good.example";
const BAD_RELAY: &str = "wss://bad.example";
const HANGING_RELAY: &str = "wss://hang.example";

fn now() -> OffsetDateTime {
	datetime!(2025-05-10 18:00 UTC)
}

#[derive(Clone, Default)]
struct TestRecord {
	id: String,
	relays: Vec<String>,
	keys: Option<Keys>,
	presigned: Option<Event>,
	unformattable: bool,
	unresolvable: bool,
}

fn record(id: &str, relay: &str) -> TestRecord {
	TestRecord {
		id: id.to_string(),
		relays: vec![relay.to_string()],
		keys: Some(Keys::generate()),
		..Default::default()
	}
}

#[derive(Default)]
struct MemoryRecords {
	records: Vec<TestRecord>,
	statuses: Mutex<HashMap<String, Delivery>>,
	status_names: Mutex<HashMap<String, String>>,
	barrier: Option<Arc<Barrier>>,
}
impl MemoryRecords {
	fn new(records: Vec<TestRecord>) -> Self {
		Self { records, ..Default::default() }
	}

	fn status(&self, id: &str) -> Option<String> {
		self.status_names.lock().expect("Status lock poisoned.").get(id).cloned()
	}

	fn delivery(&self, id: &str) -> Option<Delivery> {
		self.statuses.lock().expect("Status lock poisoned.").get(id).cloned()
	}
}
impl RecordStore for MemoryRecords {
	type Key = &'static str;
	type Record = TestRecord;

	fn select<'a>(
		&'a self,
		_key: &'a &'static str,
		action: &'a Action,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<TestRecord>>> {
		Box::pin(async move {
			if let Some(barrier) = self.barrier.as_ref() {
				barrier.wait().await;
			}

			let statuses = self.status_names.lock().expect("Status lock poisoned.");

			Ok(self
				.records
				.iter()
				.filter(|record| action.is_candidate(statuses.get(&record.id).map(String::as_str)))
				.cloned()
				.collect())
		})
	}

	fn record_id(&self, record: &TestRecord) -> String {
		record.id.clone()
	}

	fn resolve_target<'a>(
		&'a self,
		record: &'a TestRecord,
	) -> BoxFuture<'a, Result<DeliveryTarget>> {
		Box::pin(async move {
			if record.unresolvable {
				return Err(Error::Storage(herald_storage::Error::InvalidArgument(
					"room lookup failed".to_string(),
				)));
			}

			Ok(DeliveryTarget { relays: record.relays.clone(), keys: record.keys.clone() })
		})
	}

	fn update_status<'a>(
		&'a self,
		record: &'a TestRecord,
		action: &'a Action,
		delivery: &'a Delivery,
	) -> BoxFuture<'a, Result<UpdateOutcome>> {
		Box::pin(async move {
			let status = action.status_for(delivery.outcome).to_string();
			let mut names = self.status_names.lock().expect("Status lock poisoned.");
			let current = names.get(&record.id).map(String::as_str);

			if current == Some(status.as_str()) || !action.may_overwrite(current) {
				return Ok(UpdateOutcome::Unchanged);
			}

			names.insert(record.id.clone(), status);
			self.statuses
				.lock()
				.expect("Status lock poisoned.")
				.insert(record.id.clone(), delivery.clone());

			Ok(UpdateOutcome::Updated)
		})
	}
}

struct TestFormatter;
impl Formatter<TestRecord> for TestFormatter {
	fn format(&self, record: &TestRecord, action: &Action, now: OffsetDateTime) -> Result<Draft> {
		if record.unformattable {
			return Err(Error::InvalidRecord { message: "Event has no room name.".to_string() });
		}
		if let Some(event) = record.presigned.clone() {
			return Ok(Draft::Presigned(event));
		}

		Ok(Draft::Unsigned(EventTemplate {
			created_at: now.unix_timestamp(),
			kind: 1,
			tags: vec![tag(["d", &record.id]), tag(["status", action.name()])],
			content: String::new(),
		}))
	}
}

#[derive(Default)]
struct StubRelay {
	delay: Duration,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	published: Mutex<Vec<Event>>,
}
impl RelayClient for StubRelay {
	fn publish<'a>(
		&'a self,
		relay: &'a str,
		event: &'a Event,
	) -> BoxFuture<'a, herald_nostr::Result<()>> {
		Box::pin(async move {
			let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_in_flight.fetch_max(current, Ordering::SeqCst);

			if relay == HANGING_RELAY {
				std::future::pending::<()>().await;
			}

			tokio::time::sleep(self.delay).await;
			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			if relay == BAD_RELAY {
				return Err(herald_nostr::Error::Rejected {
					relay: relay.to_string(),
					message: "blocked: test relay".to_string(),
				});
			}

			self.published.lock().expect("Publish lock poisoned.").push(event.clone());

			Ok(())
		})
	}
}

fn scheduler(relay: Arc<StubRelay>, batch_size: usize, max_workers: usize) -> Scheduler {
	Scheduler::new(
		SchedulerSettings { batch_size, max_workers },
		Broadcaster::new(relay, Duration::from_secs(5)),
	)
}

fn job(
	store: MemoryRecords,
	selections: Vec<Selection<&'static str>>,
) -> DeliveryJob<MemoryRecords, TestFormatter> {
	DeliveryJob { name: "test".to_string(), store, formatter: TestFormatter, selections }
}

fn live() -> Vec<Selection<&'static str>> {
	vec![Selection { action: Action::suffixed("live"), key: "start" }]
}

#[tokio::test]
async fn failed_batch_keeps_earlier_results_and_skips_the_rest() {
	let relay = Arc::new(StubRelay::default());
	let store = MemoryRecords::new(vec![
		record("a", GOOD_RELAY),
		record("b", BAD_RELAY),
		record("c", GOOD_RELAY),
		record("d", GOOD_RELAY),
		record("e", GOOD_RELAY),
	]);
	let job = job(store, live());
	let report = scheduler(relay, 2, 2).run(&job, now(), &CancellationToken::new()).await;
	let selection = &report.selections[0];

	assert!(!report.is_success());
	assert_eq!(selection.selected, 5);
	assert_eq!(selection.delivered, 1);
	assert_eq!(selection.failed, 1);
	assert_eq!(selection.skipped_batches, 2);
	assert_eq!(selection.error.as_deref(), Some("Batch 1 of 3 had 1 failed records."));
	assert_eq!(job.store.status("a").as_deref(), Some("live:sent"));
	assert_eq!(job.store.status("b").as_deref(), Some("live:failed"));
	assert_eq!(job.store.status("c"), None);

	let failed = job.store.delivery("b").expect("Failed record should be persisted.");

	assert_eq!(failed.outcome, Outcome::Failed);
	assert!(
		failed
			.detail
			.as_deref()
			.is_some_and(|detail| detail.starts_with("Failed to publish to any relay."))
	);

	let sent = job.store.delivery("a").expect("Sent record should be persisted.");

	assert_eq!(sent.event_id.as_ref().map(String::len), Some(64));
	assert_eq!(sent.detail, None);
}

#[tokio::test]
async fn partial_relay_success_counts_as_sent_with_detail() {
	let relay = Arc::new(StubRelay::default());
	let mut partial = record("a", GOOD_RELAY);

	partial.relays.push(BAD_RELAY.to_string());

	let job = job(MemoryRecords::new(vec![partial]), live());
	let report = scheduler(relay, 10, 2).run(&job, now(), &CancellationToken::new()).await;

	assert!(report.is_success());
	assert_eq!(job.store.status("a").as_deref(), Some("live:sent"));
	assert!(
		job.store
			.delivery("a")
			.and_then(|delivery| delivery.detail)
			.is_some_and(|detail| detail.starts_with("Partially published (1/2 relays)."))
	);
}

#[tokio::test]
async fn workers_never_exceed_the_cap() {
	let relay = Arc::new(StubRelay { delay: Duration::from_millis(30), ..Default::default() });
	let records = (0..8).map(|i| record(&format!("r{i}"), GOOD_RELAY)).collect();
	let job = job(MemoryRecords::new(records), live());
	let report = scheduler(relay.clone(), 10, 3).run(&job, now(), &CancellationToken::new()).await;

	assert!(report.is_success());
	assert_eq!(report.delivered(), 8);
	assert_eq!(relay.max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn selections_run_concurrently() {
	let relay = Arc::new(StubRelay::default());
	let store = MemoryRecords {
		barrier: Some(Arc::new(Barrier::new(2))),
		..MemoryRecords::new(vec![record("a", GOOD_RELAY)])
	};
	let selections = vec![
		Selection { action: Action::suffixed("live"), key: "start" },
		Selection { action: Action::suffixed("ended"), key: "end" },
	];
	let job = job(store, selections);
	let report = tokio::time::timeout(
		Duration::from_secs(5),
		scheduler(relay, 10, 2).run(&job, now(), &CancellationToken::new()),
	)
	.await
	.expect("Selections should not wait on each other.");

	assert_eq!(report.selections.len(), 2);
	assert_eq!(report.delivered(), 2);
}

#[tokio::test]
async fn sent_records_are_not_selected_again() {
	let relay = Arc::new(StubRelay::default());
	let job = job(MemoryRecords::new(vec![record("a", GOOD_RELAY), record("b", BAD_RELAY)]), live());
	let scheduler = scheduler(relay.clone(), 10, 2);
	let first = scheduler.run(&job, now(), &CancellationToken::new()).await;

	assert_eq!(first.delivered(), 1);
	assert_eq!(first.failed(), 1);

	let second = scheduler.run(&job, now(), &CancellationToken::new()).await;

	// Only the failed record is eligible for a retry.
	assert_eq!(second.selections[0].selected, 1);
	assert_eq!(job.store.status("b").as_deref(), Some("live:failed"));
	assert_eq!(relay.published.lock().expect("Publish lock poisoned.").len(), 1);
}

#[tokio::test]
async fn cancelled_deliveries_are_not_persisted() {
	let relay = Arc::new(StubRelay::default());
	let job = job(MemoryRecords::new(vec![record("a", HANGING_RELAY)]), live());
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		trigger.cancel();
	});

	let report = scheduler(relay, 10, 2).run(&job, now(), &cancel).await;

	assert!(!report.is_success());
	assert_eq!(report.selections[0].error.as_deref(), Some(Error::Cancelled.to_string().as_str()));
	assert_eq!(job.store.status("a"), None);
}

#[tokio::test]
async fn a_record_that_cannot_be_signed_does_not_block_its_batch() {
	let relay = Arc::new(StubRelay::default());
	let mut keyless = record("b", GOOD_RELAY);

	keyless.keys = None;

	let records = vec![record("a", GOOD_RELAY), keyless, record("c", GOOD_RELAY)];
	let job = job(MemoryRecords::new(records), live());
	let report = scheduler(relay.clone(), 10, 2).run(&job, now(), &CancellationToken::new()).await;

	assert_eq!(report.failed(), 1);
	assert_eq!(report.delivered(), 2);
	assert_eq!(job.store.status("a").as_deref(), Some("live:sent"));
	assert_eq!(job.store.status("b").as_deref(), Some("live:failed"));
	assert_eq!(job.store.status("c").as_deref(), Some("live:sent"));
	assert_eq!(relay.published.lock().expect("Publish lock poisoned.").len(), 2);
	assert!(
		job.store
			.delivery("b")
			.and_then(|delivery| delivery.detail)
			.is_some_and(|detail| detail.contains("No signing key"))
	);
}

#[tokio::test]
async fn tampered_presigned_events_are_rejected_before_broadcast() {
	let relay = Arc::new(StubRelay::default());
	let keys = Keys::generate();
	let mut event = keys
		.sign(EventTemplate {
			created_at: now().unix_timestamp(),
			kind: 1,
			tags: Vec::new(),
			content: "scheduled hello".to_string(),
		})
		.expect("Signing should succeed.");

	event.content = "tampered".to_string();

	let mut note = record("note", GOOD_RELAY);

	note.keys = None;
	note.presigned = Some(event);

	let job = job(MemoryRecords::new(vec![note]), live());
	let report = scheduler(relay.clone(), 10, 2).run(&job, now(), &CancellationToken::new()).await;

	assert_eq!(report.failed(), 1);
	assert!(relay.published.lock().expect("Publish lock poisoned.").is_empty());
	assert!(job.store.delivery("note").and_then(|delivery| delivery.detail).is_some());
}

#[tokio::test]
async fn valid_presigned_events_are_published_verbatim() {
	let relay = Arc::new(StubRelay::default());
	let event = Keys::generate()
		.sign(EventTemplate {
			created_at: now().unix_timestamp(),
			kind: 1,
			tags: Vec::new(),
			content: "scheduled hello".to_string(),
		})
		.expect("Signing should succeed.");
	let mut note = record("note", GOOD_RELAY);

	note.keys = None;
	note.presigned = Some(event.clone());

	let job = job(MemoryRecords::new(vec![note]), live());
	let report = scheduler(relay.clone(), 10, 2).run(&job, now(), &CancellationToken::new()).await;

	assert!(report.is_success());
	assert_eq!(relay.published.lock().expect("Publish lock poisoned.").as_slice(), &[event.clone()]);
	assert_eq!(job.store.delivery("note").and_then(|delivery| delivery.event_id), Some(event.id));
}

#[tokio::test]
async fn short_events_are_announced_live_and_ended_exactly_once() {
	let relay = Arc::new(StubRelay::default());
	let selections = live_events::selections()
		.into_iter()
		.map(|selection| Selection {
			action: selection.action,
			key: match selection.key {
				WindowEdge::Start => "start",
				WindowEdge::End => "end",
			},
		})
		.collect();
	let job = job(MemoryRecords::new(vec![record("short", GOOD_RELAY)]), selections);
	let scheduler = scheduler(relay.clone(), 10, 2);
	let first = scheduler.run(&job, now(), &CancellationToken::new()).await;

	assert_eq!(first.delivered(), 2);
	assert_eq!(job.store.status("short").as_deref(), Some("ended:sent"));

	for _ in 0..2 {
		let again = scheduler.run(&job, now(), &CancellationToken::new()).await;

		assert!(again.is_success());
		assert_eq!(again.delivered(), 0);
		assert!(again.selections.iter().all(|selection| selection.selected == 0));
		assert_eq!(job.store.status("short").as_deref(), Some("ended:sent"));
	}

	assert_eq!(relay.published.lock().expect("Publish lock poisoned.").len(), 2);
}

#[tokio::test]
async fn a_record_that_cannot_be_formatted_does_not_block_its_batch() {
	let relay = Arc::new(StubRelay::default());
	let mut broken = record("b", GOOD_RELAY);

	broken.unformattable = true;

	let records = vec![record("a", GOOD_RELAY), broken, record("c", GOOD_RELAY)];
	let job = job(MemoryRecords::new(records), live());
	let report = scheduler(relay.clone(), 10, 2).run(&job, now(), &CancellationToken::new()).await;

	assert_eq!(report.delivered(), 2);
	assert_eq!(report.failed(), 1);
	assert_eq!(job.store.status("a").as_deref(), Some("live:sent"));
	assert_eq!(job.store.status("b").as_deref(), Some("live:failed"));
	assert_eq!(job.store.status("c").as_deref(), Some("live:sent"));
	assert!(
		job.store
			.delivery("b")
			.and_then(|delivery| delivery.detail)
			.is_some_and(|detail| detail.contains("Event has no room name."))
	);
}

#[tokio::test]
async fn store_errors_abort_the_selection_without_a_status() {
	let relay = Arc::new(StubRelay::default());
	let mut lookup_fails = record("b", GOOD_RELAY);

	lookup_fails.unresolvable = true;

	let records = vec![record("a", GOOD_RELAY), lookup_fails, record("c", GOOD_RELAY)];
	let job = job(MemoryRecords::new(records), live());
	let report = scheduler(relay, 2, 2).run(&job, now(), &CancellationToken::new()).await;
	let selection = &report.selections[0];

	assert!(!report.is_success());
	assert_eq!(selection.failed, 0);
	assert_eq!(selection.skipped_batches, 1);
	assert!(
		selection
			.error
			.as_deref()
			.is_some_and(|error| error.starts_with("Store error in batch 1 of 2:"))
	);
	assert_eq!(job.store.status("a").as_deref(), Some("live:sent"));
	assert_eq!(job.store.status("b"), None);
	assert_eq!(job.store.status("c"), None);
}
