#![allow(missing_copy_implementations, reason = "configs won't be copied around")]

mod http;
mod session;
pub(crate) mod tracing;

use std::fs;
use std::path::Path;

use color_eyre::Section;
use color_eyre::eyre::{self, WrapErr};
use serde::Deserialize;

pub(crate) use self::http::HttpConfig;
pub(crate) use self::session::SessionConfig;
pub(crate) use self::tracing::TracingConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct Config
{
	pub http: HttpConfig,
	pub tracing: TracingConfig,
	pub session: SessionConfig,
}

impl Config
{
	pub(crate) fn load_from_file(path: impl AsRef<Path>) -> eyre::Result<Self>
	{
		let file = fs::read_to_string(path.as_ref())
			.wrap_err_with(|| format!("failed to read configuration file at {:?}", path.as_ref()))
			.suggestion("create the file or run with `--config` to specify an alternative path")?;

		toml::from_str(&file).wrap_err("failed to parse configuration file")
	}
}
