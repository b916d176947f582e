//! Runs a job pass once or on an interval, each pass under its own deadline.

use std::{future::Future, time::Duration};

use color_eyre::Result;
use tokio::time;
use tokio_util::sync::CancellationToken;

pub struct Driver {
	shutdown: CancellationToken,
	invocation_timeout: Duration,
	poll_interval: Duration,
}
impl Driver {
	pub fn new(shutdown: CancellationToken, cfg: &herald_config::Delivery) -> Self {
		Self {
			shutdown,
			invocation_timeout: Duration::from_millis(cfg.invocation_timeout_ms),
			poll_interval: Duration::from_secs(cfg.poll_interval_seconds),
		}
	}

	pub fn shutdown(&self) -> &CancellationToken {
		&self.shutdown
	}

	/// Single pass mode returns the pass error. Loop mode logs it and waits for the next tick;
	/// it returns once shutdown is requested.
	pub async fn drive<F, Fut>(&self, job: &str, looping: bool, mut pass: F) -> Result<()>
	where
		F: FnMut(CancellationToken) -> Fut,
		Fut: Future<Output = Result<()>>,
	{
		loop {
			let cancel = self.shutdown.child_token();
			let deadline = tokio::spawn(expire(cancel.clone(), self.invocation_timeout));

			tracing::info!(job, "Invocation started.");

			let result = pass(cancel.clone()).await;

			deadline.abort();

			match result {
				Ok(()) => tracing::info!(job, "Invocation finished."),
				Err(err) if looping => tracing::error!(job, error = %err, "Invocation failed."),
				Err(err) => return Err(err),
			}

			if !looping || self.shutdown.is_cancelled() {
				return Ok(());
			}

			tokio::select! {
				_ = self.shutdown.cancelled() => return Ok(()),
				_ = time::sleep(self.poll_interval) => {},
			}
		}
	}
}

async fn expire(cancel: CancellationToken, timeout: Duration) {
	tokio::select! {
		_ = cancel.cancelled() => {},
		_ = time::sleep(timeout) => {
			tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Invocation timed out. Cancelling.");

			cancel.cancel();
		},
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	use color_eyre::eyre;

	use super::*;

	fn driver(shutdown: CancellationToken, timeout: Duration) -> Driver {
		Driver { shutdown, invocation_timeout: timeout, poll_interval: Duration::from_millis(10) }
	}

	#[tokio::test]
	async fn single_pass_surfaces_the_error() {
		let driver = driver(CancellationToken::new(), Duration::from_secs(5));
		let result = driver.drive("test", false, |_| async { Err(eyre::eyre!("boom")) }).await;

		assert!(result.is_err());
	}

	#[tokio::test]
	async fn passes_are_cancelled_at_the_deadline() {
		let driver = driver(CancellationToken::new(), Duration::from_millis(20));
		let result = driver
			.drive("test", false, |cancel| async move {
				cancel.cancelled().await;

				Ok(())
			})
			.await;

		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn loop_mode_stops_on_shutdown() {
		let shutdown = CancellationToken::new();
		let driver = driver(shutdown.clone(), Duration::from_secs(5));
		let passes = Arc::new(AtomicUsize::new(0));
		let counter = passes.clone();
		let result = driver
			.drive("test", true, move |_| {
				let counter = counter.clone();
				let shutdown = shutdown.clone();

				async move {
					if counter.fetch_add(1, Ordering::SeqCst) == 2 {
						shutdown.cancel();
					}

					Err(eyre::eyre!("logged, not returned"))
				}
			})
			.await;

		assert!(result.is_ok());
		assert_eq!(passes.load(Ordering::SeqCst), 3);
	}
}
