use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct TracingConfig
{
	/// Record request and response headers on the per-request span.
	///
	/// Headers include the session cookie, so keep this off outside of development.
	pub include_http_headers: bool,
	pub stderr: StderrConfig,
	pub files: FilesConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct StderrConfig
{
	pub enable: bool,
	pub ansi: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct FilesConfig
{
	pub enable: bool,
	pub directory: Box<Path>,
}

impl Default for StderrConfig
{
	fn default() -> Self
	{
		Self { enable: true, ansi: true }
	}
}

impl Default for FilesConfig
{
	fn default() -> Self
	{
		Self { enable: false, directory: PathBuf::from("./logs").into_boxed_path() }
	}
}
