use std::time::Duration;

use derive_more::Debug;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tower_host_sessions::{CookieOptions, DomainResolver, InvalidDomainPattern, SameSite};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct SessionConfig
{
	/// Name of the session cookie.
	pub cookie_name: Box<str>,

	/// The [`Path`] attribute of the session cookie.
	///
	/// [`Path`]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Set-Cookie#pathpath-value
	pub path: Box<str>,

	pub secure: bool,
	pub http_only: bool,
	pub same_site: SameSitePolicy,

	/// The [`Domain`] attribute used when no rule matches the request's host.
	///
	/// If this is omitted, such requests get host-only cookies.
	///
	/// [`Domain`]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Set-Cookie#domaindomain-value
	pub default_domain: Option<Box<str>>,

	/// `(domain, pattern)` rules, checked in order.
	pub domains: Vec<DomainEntry>,

	pub save_every_request: bool,

	/// Session lifetime in seconds.
	#[debug("{cookie_age}")]
	#[serde(deserialize_with = "deserialize_seconds")]
	pub cookie_age: time::Duration,

	pub expire_at_browser_close: bool,

	/// How often expired sessions are dropped from the store, in seconds.
	#[serde(deserialize_with = "deserialize_duration")]
	pub purge_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct DomainEntry
{
	pub domain: Box<str>,
	pub pattern: Box<str>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SameSitePolicy
{
	Strict,
	Lax,
	None,
}

/// Returned by [`SessionConfig::build()`].
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub(crate) enum InvalidSessionConfig
{
	#[display("invalid domain pattern")]
	Pattern(#[error(source)] InvalidDomainPattern),

	#[from(ignore)]
	#[display("`{field}` cannot be sent in a `Set-Cookie` header: {value:?}")]
	CookieAttribute
	{
		field: &'static str,
		value: Box<str>,
	},
}

impl SessionConfig
{
	/// Checks the cookie attributes, compiles the domain rules and builds the middleware's
	/// configuration.
	pub(crate) fn build(&self) -> Result<tower_host_sessions::SessionConfig, InvalidSessionConfig>
	{
		check_cookie_attribute("cookie-name", &self.cookie_name, b"=;,")?;
		check_cookie_attribute("path", &self.path, b";")?;

		if let Some(domain) = self.default_domain.as_deref() {
			check_cookie_attribute("default-domain", domain, b";,")?;
		}

		for entry in &self.domains {
			check_cookie_attribute("domains.domain", &entry.domain, b";,")?;
		}

		let cookie = CookieOptions::new(String::from(&*self.cookie_name), String::from(&*self.path))
			.secure(self.secure)
			.http_only(self.http_only)
			.same_site(self.same_site.into());

		let domains = DomainResolver::from_rules(
			self.default_domain.clone(),
			self.domains
				.iter()
				.map(|entry| (entry.domain.clone(), entry.pattern.clone())),
		)?;

		Ok(tower_host_sessions::SessionConfig::new(cookie, domains)
			.save_every_request(self.save_every_request)
			.cookie_age(self.cookie_age)
			.expire_at_browser_close(self.expire_at_browser_close))
	}
}

impl Default for SessionConfig
{
	fn default() -> Self
	{
		Self {
			cookie_name: Box::from(CookieOptions::DEFAULT_NAME),
			path: Box::from("/"),
			secure: true,
			http_only: true,
			same_site: SameSitePolicy::Lax,
			default_domain: None,
			domains: Vec::new(),
			save_every_request: false,
			cookie_age: time::Duration::WEEK * 2,
			expire_at_browser_close: false,
			purge_interval: Duration::from_secs(300),
		}
	}
}

impl From<SameSitePolicy> for SameSite
{
	fn from(policy: SameSitePolicy) -> Self
	{
		match policy {
			SameSitePolicy::Strict => SameSite::Strict,
			SameSitePolicy::Lax => SameSite::Lax,
			SameSitePolicy::None => SameSite::None,
		}
	}
}

/// Rejects values that would break the `Set-Cookie` header.
fn check_cookie_attribute(
	field: &'static str,
	value: &str,
	forbidden: &[u8],
) -> Result<(), InvalidSessionConfig>
{
	let valid = !value.is_empty()
		&& value
			.bytes()
			.all(|byte| byte.is_ascii_graphic() && !forbidden.contains(&byte));

	if valid {
		Ok(())
	} else {
		Err(InvalidSessionConfig::CookieAttribute { field, value: Box::from(value) })
	}
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<time::Duration, D::Error>
where
	D: Deserializer<'de>,
{
	i64::deserialize(deserializer).map(time::Duration::seconds)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	f64::deserialize(deserializer)
		.and_then(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
}
