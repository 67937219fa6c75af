use cookie::SameSite;
use time::Duration;

use crate::expiry::ExpiryDefaults;
use crate::{CookieOptions, DomainResolver};

/// Everything the [`SessionManager`] needs to know about session cookies.
///
/// This is built once at startup and shared between all requests.
///
/// [`SessionManager`]: crate::SessionManager
#[derive(Debug, Clone, Default)]
pub struct SessionConfig
{
	pub(crate) cookie: CookieOptions,
	pub(crate) domains: DomainResolver,
	pub(crate) save_every_request: bool,
	pub(crate) expiry: ExpiryDefaults,
}

impl SessionConfig
{
	/// Creates a new [`SessionConfig`].
	pub fn new(cookie: CookieOptions, domains: DomainResolver) -> Self
	{
		Self {
			cookie,
			domains,
			save_every_request: false,
			expiry: ExpiryDefaults::default(),
		}
	}

	/// Save the session (and refresh the cookie) on every request, not only when the
	/// session was modified.
	///
	/// This is `false` by default.
	pub fn save_every_request(mut self, save_every_request: bool) -> Self
	{
		self.save_every_request = save_every_request;
		self
	}

	/// How long sessions live if they don't set their own [`Expiry`].
	///
	/// This is two weeks by default.
	///
	/// [`Expiry`]: crate::Expiry
	pub fn cookie_age(mut self, cookie_age: Duration) -> Self
	{
		self.expiry.cookie_age = cookie_age;
		self
	}

	/// Issue cookies without `Max-Age` / `Expires` unless a session sets its own
	/// [`Expiry`].
	///
	/// This is `false` by default.
	///
	/// [`Expiry`]: crate::Expiry
	pub fn expire_at_browser_close(mut self, expire_at_browser_close: bool) -> Self
	{
		self.expiry.expire_at_browser_close = expire_at_browser_close;
		self
	}

	/// The cookie attributes.
	pub fn cookie(&self) -> &CookieOptions
	{
		&self.cookie
	}

	/// The domain rules.
	pub fn domains(&self) -> &DomainResolver
	{
		&self.domains
	}

	/// The cookie name.
	pub fn cookie_name(&self) -> &str
	{
		self.cookie.name()
	}

	/// The configured `SameSite` policy.
	pub fn same_site(&self) -> SameSite
	{
		self.cookie.same_site
	}

	/// Whether every request saves the session.
	pub fn saves_every_request(&self) -> bool
	{
		self.save_every_request
	}
}
