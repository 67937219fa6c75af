use std::fs;

use color_eyre::eyre::{self, WrapErr};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::TracingConfig;

/// Keeps the log file writer alive. Dropping it flushes buffered logs.
#[derive(Debug)]
#[must_use = "logs are lost once the guard is dropped"]
pub(crate) struct Guard
{
	_files_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub(crate) fn init(config: &TracingConfig) -> eyre::Result<Guard>
{
	let stderr_layer = config.stderr.enable.then(|| {
		tracing_subscriber::fmt::layer()
			.pretty()
			.with_ansi(config.stderr.ansi)
			.with_writer(std::io::stderr)
			.with_timer(UtcTime::rfc_3339())
	});

	let (files_layer, files_guard) = config
		.files
		.enable
		.then(|| -> eyre::Result<_> {
			fs::create_dir_all(&*config.files.directory).wrap_err_with(|| {
				format!("failed to create log directory at {:?}", config.files.directory)
			})?;

			let (writer, guard) = tracing_appender::rolling::Builder::default()
				.rotation(tracing_appender::rolling::Rotation::DAILY)
				.filename_prefix("host-sessions")
				.filename_suffix("log")
				.build(&*config.files.directory)
				.map(tracing_appender::non_blocking)
				.wrap_err("failed to install logfile thread")?;

			let layer = tracing_subscriber::fmt::layer()
				.json()
				.with_file(false)
				.with_line_number(false)
				.with_span_list(true)
				.with_writer(writer)
				.with_timer(UtcTime::rfc_3339());

			Ok((layer, guard))
		})
		.transpose()?
		.unzip();

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(Layer::and_then(stderr_layer, files_layer).with_filter(filter))
		.try_init()
		.wrap_err("failed to install global subscriber")?;

	Ok(Guard { _files_guard: files_guard })
}
