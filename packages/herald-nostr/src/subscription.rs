//! Long-lived `REQ` subscriptions over one relay connection.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{Error, Event, Result};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// NIP-01 filter. Only the fields the listener needs are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub kinds: Vec<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub since: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SubscriptionFrame {
	Event(Box<Event>),
	EndOfStored,
	Closed(String),
	Notice(String),
	Other,
}

pub struct Subscription {
	relay: String,
	id: String,
	stream: RelayStream,
}
impl Subscription {
	pub async fn open(relay: &str, id: &str, filter: &Filter) -> Result<Self> {
		let (mut stream, _) = connect_async(relay)
			.await
			.map_err(|err| relay_error(relay, format!("connect failed: {err}.")))?;
		let frame = json!(["REQ", id, filter]).to_string();

		stream
			.send(Message::text(frame))
			.await
			.map_err(|err| relay_error(relay, format!("send failed: {err}.")))?;

		tracing::info!(relay, subscription = id, kinds = ?filter.kinds, since = ?filter.since, "Subscribed.");

		Ok(Self { relay: relay.to_string(), id: id.to_string(), stream })
	}

	pub fn relay(&self) -> &str {
		&self.relay
	}

	/// Waits for the next event of this subscription. `Ok(None)` means the relay closed the
	/// subscription or the connection.
	pub async fn next_event(&mut self) -> Result<Option<Event>> {
		loop {
			let Some(message) = self.stream.next().await else {
				return Ok(None);
			};
			let message =
				message.map_err(|err| relay_error(&self.relay, format!("read failed: {err}.")))?;
			let text = match message {
				Message::Text(text) => text,
				Message::Close(_) => return Ok(None),
				_ => continue,
			};

			match parse_frame(text.as_str(), &self.id) {
				SubscriptionFrame::Event(event) => return Ok(Some(*event)),
				SubscriptionFrame::EndOfStored => {
					tracing::debug!(relay = %self.relay, subscription = %self.id, "Stored events delivered.");
				},
				SubscriptionFrame::Closed(reason) => {
					tracing::warn!(relay = %self.relay, subscription = %self.id, reason = %reason, "Relay closed the subscription.");

					return Ok(None);
				},
				SubscriptionFrame::Notice(notice) => {
					tracing::debug!(relay = %self.relay, notice = %notice, "Relay notice.");
				},
				SubscriptionFrame::Other => {},
			}
		}
	}

	/// Sends `CLOSE` and shuts the socket. Errors are ignored since the relay may be gone.
	pub async fn close(mut self) {
		let _ = self.stream.send(Message::text(json!(["CLOSE", self.id]).to_string())).await;
		let _ = self.stream.close(None).await;
	}
}

fn relay_error(relay: &str, message: String) -> Error {
	Error::Relay { relay: relay.to_string(), message }
}

pub(crate) fn parse_frame(text: &str, subscription_id: &str) -> SubscriptionFrame {
	let Ok(Value::Array(mut items)) = serde_json::from_str::<Value>(text) else {
		return SubscriptionFrame::Other;
	};
	let for_us = items.get(1).and_then(Value::as_str) == Some(subscription_id);

	match items.first().and_then(Value::as_str) {
		Some("EVENT") if for_us && items.len() >= 3 => {
			match serde_json::from_value::<Event>(items.swap_remove(2)) {
				Ok(event) => SubscriptionFrame::Event(Box::new(event)),
				Err(_) => SubscriptionFrame::Other,
			}
		},
		Some("EOSE") if for_us => SubscriptionFrame::EndOfStored,
		Some("CLOSED") if for_us => SubscriptionFrame::Closed(
			items.get(2).and_then(Value::as_str).unwrap_or_default().to_string(),
		),
		Some("NOTICE") => SubscriptionFrame::Notice(
			items.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
		),
		_ => SubscriptionFrame::Other,
	}
}
