use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct HttpConfig
{
	pub ip_addr: IpAddr,
	pub port: u16,
}

impl HttpConfig
{
	pub(crate) fn socket_addr(&self) -> SocketAddr
	{
		SocketAddr::new(self.ip_addr, self.port)
	}
}

impl Default for HttpConfig
{
	fn default() -> Self
	{
		Self { ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST), port: 8000 }
	}
}
