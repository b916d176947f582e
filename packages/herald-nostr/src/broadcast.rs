use std::{sync::Arc, time::Duration};

use futures::future;
use tokio_util::sync::CancellationToken;

use crate::{Error, Event, RelayClient, Result, WebSocketRelay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
	pub relay: String,
	pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
	pub succeeded: Vec<String>,
	pub failed: Vec<RelayFailure>,
}
impl BroadcastReport {
	/// At least one relay accepted the event.
	pub fn is_success(&self) -> bool {
		!self.succeeded.is_empty()
	}

	pub fn attempted(&self) -> usize {
		self.succeeded.len() + self.failed.len()
	}

	pub fn last_error(&self) -> Option<&str> {
		self.failed.last().map(|failure| failure.reason.as_str())
	}

	/// Human readable account of the outcome, suitable for a status detail column.
	pub fn describe(&self) -> String {
		match (self.succeeded.len(), self.last_error()) {
			(_, None) if self.attempted() == 0 => "No relays configured.".to_string(),
			(0, Some(err)) => format!("Failed to publish to any relay. Last error: {err}"),
			(ok, Some(err)) => format!(
				"Partially published ({ok}/{total} relays). Last error: {err}",
				total = self.attempted()
			),
			(ok, None) => format!("Published to {ok} relays."),
		}
	}
}

/// Fans one signed event out to many relays. Each relay is attempted once, concurrently, and
/// bounded by the same timeout.
#[derive(Clone)]
pub struct Broadcaster {
	client: Arc<dyn RelayClient>,
	timeout: Duration,
}
impl Broadcaster {
	pub fn new(client: Arc<dyn RelayClient>, timeout: Duration) -> Self {
		Self { client, timeout }
	}

	pub fn websocket(timeout: Duration) -> Self {
		Self::new(Arc::new(WebSocketRelay), timeout)
	}

	pub async fn broadcast(
		&self,
		event: &Event,
		relays: &[String],
		cancel: &CancellationToken,
	) -> Result<BroadcastReport> {
		let attempts = relays.iter().map(|relay| async move {
			let outcome = tokio::time::timeout(self.timeout, self.client.publish(relay, event)).await;

			(relay, outcome)
		});
		let outcomes = tokio::select! {
			biased;

			_ = cancel.cancelled() => return Err(Error::Cancelled),
			outcomes = future::join_all(attempts) => outcomes,
		};
		let mut report = BroadcastReport::default();

		for (relay, outcome) in outcomes {
			match outcome {
				Ok(Ok(())) => {
					tracing::debug!(event_id = %event.id, relay = %relay, "Relay accepted event.");

					report.succeeded.push(relay.clone());
				},
				Ok(Err(err)) => {
					tracing::warn!(event_id = %event.id, relay = %relay, error = %err, "Relay publish failed.");

					report.failed.push(RelayFailure { relay: relay.clone(), reason: err.to_string() });
				},
				Err(_) => {
					tracing::warn!(event_id = %event.id, relay = %relay, "Relay publish timed out.");

					report.failed.push(RelayFailure {
						relay: relay.clone(),
						reason: format!(
							"Relay {relay} timed out after {} ms.",
							self.timeout.as_millis()
						),
					});
				},
			}
		}

		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn describes_partial_and_total_failure() {
		let partial = BroadcastReport {
			succeeded: vec!["wss://a".to_string()],
			failed: vec![RelayFailure { relay: "wss://b".to_string(), reason: "boom".to_string() }],
		};
		let total = BroadcastReport { succeeded: Vec::new(), failed: partial.failed.clone() };

		assert!(partial.is_success());
		assert_eq!(partial.describe(), "Partially published (1/2 relays). Last error: boom");
		assert!(!total.is_success());
		assert_eq!(total.describe(), "Failed to publish to any relay. Last error: boom");
		assert!(!BroadcastReport::default().is_success());
	}
}
