//! host-sessions - a demo server for host-scoped session cookies.
//! Copyright (C) 2024  AlphaKeks <alphakeks@dawn>
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program. If not, see https://www.gnu.org/licenses.

use std::time::Duration;

use color_eyre::eyre::{self, WrapErr};
use tokio::net::TcpListener;
use tower_host_sessions::MemoryStore;
use tracing::Instrument;

mod cli;
mod config;
mod middleware;
mod routes;
mod signal;
mod telemetry;

use self::config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()>
{
	color_eyre::install()?;

	match dotenvy::dotenv() {
		Ok(_) => {},
		Err(error) if error.not_found() => {},
		Err(error) => return Err(error).wrap_err("failed to load `.env` file"),
	}

	let args = cli::args();
	let mut config = Config::load_from_file(&args.config_path)?;
	args.apply_to_config(&mut config);

	let _guard = telemetry::init(&config.tracing).wrap_err("failed to initialize tracing")?;
	let runtime_span = tracing::info_span!("runtime");

	run(config).instrument(runtime_span).await
}

async fn run(config: Config) -> eyre::Result<()>
{
	let session_config = config
		.session
		.build()
		.wrap_err("invalid session configuration")?;

	tracing::debug!(rules = session_config.domains().rules().len(), "compiled domain rules");

	let store = MemoryStore::new();
	let purge_task = tokio::spawn(purge_expired_sessions(store.clone(), config.session.purge_interval));
	let router = routes::router(session_config, store, config.tracing.include_http_headers);

	let listener = TcpListener::bind(config.http.socket_addr())
		.await
		.wrap_err_with(|| format!("failed to bind {}", config.http.socket_addr()))?;

	tracing::info!(addr = %listener.local_addr()?, "listening for requests");

	axum::serve(listener, router)
		.with_graceful_shutdown(signal::shutdown())
		.await
		.wrap_err("failed to run http server")?;

	purge_task.abort();
	tracing::info!("shut down");

	Ok(())
}

/// Drops expired sessions from the store every `interval`.
async fn purge_expired_sessions(store: MemoryStore, interval: Duration)
{
	let mut interval = tokio::time::interval(interval.max(Duration::from_secs(1)));

	loop {
		interval.tick().await;
		store.purge_expired();
		tracing::trace!(sessions = store.len(), "purged expired sessions");
	}
}
