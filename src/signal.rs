use std::error::Error;
use std::io;

use tokio::signal::ctrl_c;

/// Resolves once the OS asks us to shut down.
pub(crate) async fn shutdown()
{
	let signal = tokio::select! {
		result = ctrl_c() => result.map(|()| "SIGINT"),
		result = terminate() => result.map(|()| "SIGTERM"),
	};

	match signal {
		Ok(signal) => tracing::info!(signal, "shutting down"),
		Err(err) => {
			tracing::error!(error = &err as &dyn Error, "failed listening for signals; shutting down");
		},
	}
}

#[cfg(unix)]
async fn terminate() -> io::Result<()>
{
	use tokio::signal::unix::{SignalKind, signal};

	let mut signal = signal(SignalKind::terminate())?;

	if signal.recv().await.is_none() {
		tracing::warn!("cannot receive more SIGTERM signals");
		std::future::pending::<()>().await;
	}

	Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> io::Result<()>
{
	std::future::pending().await
}
