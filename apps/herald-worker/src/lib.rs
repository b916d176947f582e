pub mod driver;
pub mod shutdown;

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use herald_cli::PassArgs;
use herald_nostr::{Broadcaster, Keys};
use herald_providers::{rooms::HttpRoomSource, webhook::WebhookNotifier};
use herald_service::{
	ActivityListener, DeliveryJob, Formatter, InvocationReport, ListenerSettings, RecordStore,
	RoomPoller, RoomPollerSettings, Scheduler, SchedulerSettings,
	jobs::{event_updates, live_events, scheduled_notes},
};
use herald_storage::{db::Db, kv::JsonFileStore, models::RoomEntry};

use crate::driver::Driver;

#[derive(Debug, Parser)]
#[command(
	version = herald_cli::VERSION,
	rename_all = "kebab",
	styles = herald_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Announce events whose start or end falls inside the current window.
	LiveEvents(PassArgs),
	/// Re-announce edited events as planned.
	EventUpdates(PassArgs),
	/// Publish author-signed notes that are due.
	ScheduledNotes(PassArgs),
	/// Mirror active rooms from the upstream source.
	Rooms(PassArgs),
	/// Forward live activity and room events seen on a relay to the webhook. Runs until shutdown.
	Listen,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = herald_config::load(&args.config)?;

	init_tracing(&config)?;

	// Both rustls backends can end up linked in; pick one before any TLS handshake.
	let _ = rustls::crypto::ring::default_provider().install_default();

	let driver = Driver::new(shutdown::install(), &config.delivery);
	let broadcaster =
		Broadcaster::websocket(Duration::from_millis(config.nostr.publish_timeout_ms));

	match args.command {
		Command::LiveEvents(pass) => {
			let db = connect(&config).await?;
			let job = live_events::job(db, &config)?;
			let scheduler = Scheduler::new(SchedulerSettings::from(&config.delivery), broadcaster);

			run_job(&driver, pass.looping(false), &scheduler, &job).await
		},
		Command::EventUpdates(pass) => {
			let db = connect(&config).await?;
			let job = event_updates::job(db, &config)?;
			let scheduler = Scheduler::new(SchedulerSettings::from(&config.delivery), broadcaster);

			run_job(&driver, pass.looping(false), &scheduler, &job).await
		},
		Command::ScheduledNotes(pass) => {
			let db = connect(&config).await?;
			let job = scheduled_notes::job(db, &config);
			let scheduler = Scheduler::new(SchedulerSettings::from(&config.delivery), broadcaster);

			run_job(&driver, pass.looping(true), &scheduler, &job).await
		},
		Command::Rooms(pass) => {
			let poller = room_poller(&config, broadcaster)?;
			let poller = &poller;

			driver
				.drive("rooms", pass.looping(true), |cancel| async move {
					poller.poll_once(OffsetDateTime::now_utc(), &cancel).await?;

					Ok(())
				})
				.await
		},
		Command::Listen => {
			let notifier = WebhookNotifier::new(config.require_webhook()?)?;
			let listener =
				ActivityListener::new(ListenerSettings::from_config(&config)?, Arc::new(notifier));

			listener.run(driver.shutdown()).await;

			Ok(())
		},
	}
}

fn init_tracing(config: &herald_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}

async fn connect(config: &herald_config::Config) -> color_eyre::Result<Arc<Db>> {
	let db = Db::connect(config.require_postgres()?).await?;

	db.ensure_schema().await?;

	Ok(Arc::new(db))
}

async fn run_job<S, F>(
	driver: &Driver,
	looping: bool,
	scheduler: &Scheduler,
	job: &DeliveryJob<S, F>,
) -> color_eyre::Result<()>
where
	S: RecordStore,
	F: Formatter<S::Record>,
{
	driver
		.drive(&job.name, looping, |cancel| async move {
			let report = scheduler.run(job, OffsetDateTime::now_utc(), &cancel).await;

			summarize(&report)
		})
		.await
}

fn summarize(report: &InvocationReport) -> color_eyre::Result<()> {
	tracing::info!(
		job = %report.job,
		delivered = report.delivered(),
		failed = report.failed(),
		"Job summary."
	);

	if report.is_success() {
		return Ok(());
	}

	Err(eyre::eyre!("Job {} finished with errors: {}", report.job, report.errors().join("; ")))
}

fn room_poller(
	config: &herald_config::Config,
	broadcaster: Broadcaster,
) -> color_eyre::Result<RoomPoller> {
	let rooms = config.require_rooms()?;
	let relays = config.require_relays()?;
	let keys = Keys::parse(config.require_secret_key()?)?;
	let source = Arc::new(HttpRoomSource::new(rooms)?);
	let state = Arc::new(JsonFileStore::<RoomEntry>::open(rooms.state_path.clone())?);
	let settings = RoomPollerSettings::from_config(rooms, relays);
	let mut poller = RoomPoller::new(source, state, keys, broadcaster, settings);

	if let Some(webhook) = config.webhook() {
		poller = poller.with_notifier(Arc::new(WebhookNotifier::new(webhook)?));
	} else {
		tracing::info!("No webhook configured. Room changes will not be forwarded.");
	}

	Ok(poller)
}
