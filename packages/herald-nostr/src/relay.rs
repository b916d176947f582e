use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{BoxFuture, Error, Event, Result};

/// Publishes one event to one relay and resolves once the relay acknowledged it.
pub trait RelayClient
where
	Self: Send + Sync,
{
	fn publish<'a>(&'a self, relay: &'a str, event: &'a Event) -> BoxFuture<'a, Result<()>>;
}

/// Opens a fresh WebSocket per publish, sends `["EVENT", ...]` and waits for the matching `OK`.
/// Callers bound the wait with their own timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketRelay;
impl RelayClient for WebSocketRelay {
	fn publish<'a>(&'a self, relay: &'a str, event: &'a Event) -> BoxFuture<'a, Result<()>> {
		Box::pin(publish_over_websocket(relay, event))
	}
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RelayReply {
	Accepted,
	Rejected(String),
	Notice(String),
	Other,
}

async fn publish_over_websocket(relay: &str, event: &Event) -> Result<()> {
	let relay_error = |message: String| Error::Relay { relay: relay.to_string(), message };
	let (mut stream, _) =
		connect_async(relay).await.map_err(|err| relay_error(format!("connect failed: {err}.")))?;
	let frame = json!(["EVENT", event]).to_string();

	stream
		.send(Message::text(frame))
		.await
		.map_err(|err| relay_error(format!("send failed: {err}.")))?;

	let outcome = loop {
		let Some(message) = stream.next().await else {
			break Err(relay_error("connection closed before OK.".to_string()));
		};
		let message = match message {
			Ok(message) => message,
			Err(err) => break Err(relay_error(format!("read failed: {err}."))),
		};

		match message {
			Message::Text(text) => match parse_reply(text.as_str(), &event.id) {
				RelayReply::Accepted => break Ok(()),
				RelayReply::Rejected(reason) =>
					break Err(Error::Rejected { relay: relay.to_string(), message: reason }),
				RelayReply::Notice(notice) => {
					tracing::debug!(relay, notice = %notice, "Relay notice.");
				},
				RelayReply::Other => {},
			},
			Message::Close(_) => break Err(relay_error("connection closed before OK.".to_string())),
			_ => {},
		}
	};
	let _ = stream.close(None).await;

	outcome
}

pub(crate) fn parse_reply(text: &str, event_id: &str) -> RelayReply {
	let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
		return RelayReply::Other;
	};

	match items.first().and_then(Value::as_str) {
		Some("OK") if items.get(1).and_then(Value::as_str) == Some(event_id) => {
			let message = items.get(3).and_then(Value::as_str).unwrap_or_default().to_string();

			if items.get(2).and_then(Value::as_bool) == Some(true) {
				RelayReply::Accepted
			} else {
				RelayReply::Rejected(message)
			}
		},
		Some("NOTICE") => RelayReply::Notice(
			items.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
		),
		_ => RelayReply::Other,
	}
}
