use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use herald_nostr::{
	Event, EventTemplate, KIND_INTERACTIVE_ROOM, KIND_LIVE_ACTIVITY, Keys, event::tag,
};
use herald_service::{
	ActivityListener, BoxFuture, Error, ListenerSettings, Result, SessionReport,
	listener::MessageSink,
};

#[derive(Default)]
struct RecordingSink {
	messages: Mutex<Vec<String>>,
	failures_left: AtomicUsize,
}
impl RecordingSink {
	fn failing_once() -> Self {
		Self { failures_left: AtomicUsize::new(1), ..Default::default() }
	}

	fn messages(&self) -> Vec<String> {
		self.messages.lock().expect("Messages lock poisoned.").clone()
	}
}
impl MessageSink for RecordingSink {
	fn deliver<'a>(&'a self, content: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if self
				.failures_left
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
				.is_ok()
			{
				return Err(Error::InvalidRecord { message: "webhook unavailable".to_string() });
			}

			self.messages.lock().expect("Messages lock poisoned.").push(content.to_string());

			Ok(())
		})
	}
}

/// Local relay. Every connection reports its `REQ` frame, receives `events` followed by `EOSE`,
/// and is then closed unless `hold_open` is set.
async fn spawn_relay(
	events: Vec<Event>,
	hold_open: bool,
) -> (String, mpsc::UnboundedReceiver<Value>, Arc<AtomicUsize>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind relay.");
	let addr = listener.local_addr().expect("Failed to read relay address.");
	let (req_tx, req_rx) = mpsc::unbounded_channel();
	let connections = Arc::new(AtomicUsize::new(0));
	let counter = connections.clone();

	tokio::spawn(async move {
		while let Ok((socket, _)) = listener.accept().await {
			let events = events.clone();
			let req_tx = req_tx.clone();

			counter.fetch_add(1, Ordering::SeqCst);
			tokio::spawn(async move {
				let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
					return;
				};
				let Some(Ok(Message::Text(text))) = ws.next().await else {
					return;
				};
				let req: Value = serde_json::from_str(text.as_str()).expect("Relay got bad JSON.");
				let sub_id = req[1].clone();
				let _ = req_tx.send(req);

				for event in events {
					let frame = json!(["EVENT", sub_id, event]).to_string();
					let _ = ws.send(Message::text(frame)).await;
				}

				let _ = ws.send(Message::text(json!(["EOSE", sub_id]).to_string())).await;

				if hold_open {
					while let Some(Ok(_)) = ws.next().await {}
				} else {
					let _ = ws.close(None).await;
				}
			});
		}
	});

	(format!("ws://{addr}"), req_rx, connections)
}

async fn closed_port() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind.");
	let addr = listener.local_addr().expect("Failed to read address.");

	drop(listener);

	format!("ws://{addr}")
}

fn signed(keys: &Keys, kind: u16, d: &str) -> Event {
	keys.sign(EventTemplate {
		created_at: 1_746_900_000,
		kind,
		tags: vec![tag(["d", d]), tag(["title", d]), tag(["status", "live"])],
		content: String::new(),
	})
	.expect("Failed to sign event.")
}

fn settings(relay_url: String) -> ListenerSettings {
	ListenerSettings {
		relay_url,
		lookback: time::Duration::days(7),
		reconnect_delay: Duration::from_millis(20),
	}
}

async fn wait_for_connections(connections: &AtomicUsize, at_least: usize) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while connections.load(Ordering::SeqCst) < at_least {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("Listener did not reconnect in time.");
}

#[tokio::test]
async fn forwards_verified_events_once_and_subscribes_with_a_lookback() {
	let keys = Keys::generate();
	let live = signed(&keys, KIND_LIVE_ACTIVITY, "rust-hour");
	let room = signed(&keys, KIND_INTERACTIVE_ROOM, "lobby");
	let mut tampered = signed(&keys, KIND_LIVE_ACTIVITY, "forged");

	tampered.content = "changed after signing".to_string();

	let (relay, mut reqs, _) =
		spawn_relay(vec![live.clone(), tampered, live.clone(), room], false).await;
	let sink = Arc::new(RecordingSink::default());
	let listener = ActivityListener::new(settings(relay), sink.clone());
	let now = OffsetDateTime::now_utc();
	let report = listener.listen_once(now, &CancellationToken::new()).await.expect("Session failed.");

	assert_eq!(
		report,
		SessionReport { received: 4, forwarded: 2, dropped: 0, invalid: 1, duplicates: 1 }
	);

	let req = reqs.recv().await.expect("Relay saw no REQ.");

	assert_eq!(req[0], "REQ");
	assert_eq!(req[2]["kinds"], json!([30_311, 30_312, 30_313]));
	assert_eq!(req[2]["since"], json!((now - time::Duration::days(7)).unix_timestamp()));

	let messages = sink.messages();

	assert_eq!(messages.len(), 2);
	assert!(messages[0].contains("📌 **Title:** rust-hour\n"));
	assert!(messages[1].contains("🔢 **Kind:** 30312 - Interactive Room\n"));
	assert!(messages.iter().all(|msg| !msg.contains("forged")));
}

#[tokio::test]
async fn reconnects_without_forwarding_the_same_event_twice() {
	let live = signed(&Keys::generate(), KIND_LIVE_ACTIVITY, "rust-hour");
	let (relay, _reqs, connections) = spawn_relay(vec![live], false).await;
	let sink = Arc::new(RecordingSink::default());
	let listener = Arc::new(ActivityListener::new(settings(relay), sink.clone()));
	let cancel = CancellationToken::new();
	let task = tokio::spawn({
		let listener = listener.clone();
		let cancel = cancel.clone();

		async move { listener.run(&cancel).await }
	});

	wait_for_connections(&connections, 3).await;
	cancel.cancel();
	tokio::time::timeout(Duration::from_secs(5), task)
		.await
		.expect("Listener did not stop.")
		.expect("Listener task panicked.");

	assert_eq!(sink.messages().len(), 1);
}

#[tokio::test]
async fn undelivered_events_are_retried_after_a_reconnect() {
	let live = signed(&Keys::generate(), KIND_LIVE_ACTIVITY, "rust-hour");
	let (relay, _reqs, _) = spawn_relay(vec![live], false).await;
	let sink = Arc::new(RecordingSink::failing_once());
	let listener = ActivityListener::new(settings(relay), sink.clone());
	let cancel = CancellationToken::new();
	let first = listener.listen_once(OffsetDateTime::now_utc(), &cancel).await.expect("Session failed.");
	let second =
		listener.listen_once(OffsetDateTime::now_utc(), &cancel).await.expect("Session failed.");

	assert_eq!(first.dropped, 1);
	assert_eq!(second.forwarded, 1);
	assert_eq!(sink.messages().len(), 1);
}

#[tokio::test]
async fn cancellation_ends_a_quiet_session() {
	let (relay, mut reqs, _) = spawn_relay(Vec::new(), true).await;
	let listener = ActivityListener::new(settings(relay), Arc::new(RecordingSink::default()));
	let cancel = CancellationToken::new();
	let session = listener.listen_once(OffsetDateTime::now_utc(), &cancel);
	let stop = async {
		reqs.recv().await.expect("Relay saw no REQ.");
		cancel.cancel();
	};
	let (report, ()) = tokio::time::timeout(Duration::from_secs(5), futures::future::join(session, stop))
		.await
		.expect("Session did not stop.");

	assert_eq!(report.expect("Session failed."), SessionReport::default());
}

#[tokio::test]
async fn unreachable_relays_fail_the_session() {
	let listener =
		ActivityListener::new(settings(closed_port().await), Arc::new(RecordingSink::default()));
	let result = listener.listen_once(OffsetDateTime::now_utc(), &CancellationToken::new()).await;

	assert!(matches!(result, Err(Error::Nostr(herald_nostr::Error::Relay { .. }))));
}
