use std::net::IpAddr;
use std::path::Path;

use crate::config::Config;

pub(crate) fn args() -> Args
{
	<Args as clap::Parser>::parse()
}

/// Serves a small demo application behind host-scoped session cookies.
#[derive(Debug, clap::Parser)]
pub(crate) struct Args
{
	/// Path to the configuration file
	#[arg(long = "config", env = "HOST_SESSIONS_CONFIG", default_value = "./host-sessions.toml")]
	pub config_path: Box<Path>,

	/// The IP address the server should listen on
	#[arg(long = "ip")]
	pub ip_addr: Option<IpAddr>,

	/// The port the server should listen on
	#[arg(long)]
	pub port: Option<u16>,
}

impl Args
{
	/// Overrides values from the configuration file with the ones passed on the command line.
	pub(crate) fn apply_to_config(&self, config: &mut Config)
	{
		if let Some(ip_addr) = self.ip_addr {
			config.http.ip_addr = ip_addr;
		}

		if let Some(port) = self.port {
			config.http.port = port;
		}
	}
}
