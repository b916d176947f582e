//! SIGINT/SIGTERM handling.

use tokio_util::sync::CancellationToken;

/// Returns a token cancelled on the first SIGINT or SIGTERM. Every invocation token is a child
/// of it, so in-flight work stops at the next await point.
pub fn install() -> CancellationToken {
	let token = CancellationToken::new();
	let trigger = token.clone();

	tokio::spawn(async move {
		wait_for_signal().await;

		trigger.cancel();
	});

	token
}

#[cfg(unix)]
async fn wait_for_signal() {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(sigterm) => sigterm,
		Err(err) => {
			tracing::warn!(error = %err, "Failed to install SIGTERM handler. Listening for Ctrl+C only.");

			let _ = tokio::signal::ctrl_c().await;

			tracing::info!("Received SIGINT. Shutting down.");

			return;
		},
	};

	tokio::select! {
		_ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT. Shutting down."),
		_ = sigterm.recv() => tracing::info!("Received SIGTERM. Shutting down."),
	}
}

#[cfg(not(unix))]
async fn wait_for_signal() {
	let _ = tokio::signal::ctrl_c().await;

	tracing::info!("Received Ctrl+C. Shutting down.");
}
