use time::{Duration, OffsetDateTime};

/// A per-session override of the configured expiry.
///
/// Set with [`Session::set_expiry()`]. Sessions without an override follow the
/// [`SessionConfig`].
///
/// [`Session::set_expiry()`]: crate::Session::set_expiry()
/// [`SessionConfig`]: crate::SessionConfig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry
{
	/// The cookie carries no expiry and is discarded when the browser closes.
	OnBrowserClose,

	/// The session expires after this much inactivity.
	OnInactivity(Duration),

	/// The session expires at a fixed point in time.
	AtDateTime(OffsetDateTime),
}

/// How the session cookie should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy
{
	/// No `Max-Age` and no `Expires`.
	BrowserClose,

	/// `Max-Age` set to the given duration, `Expires` set relative to now.
	MaxAge(Duration),
}

/// The fallback expiry settings for sessions without an [`Expiry`] override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpiryDefaults
{
	pub(crate) cookie_age: Duration,
	pub(crate) expire_at_browser_close: bool,
}

impl ExpiryDefaults
{
	/// Two weeks.
	pub(crate) const DEFAULT_COOKIE_AGE: Duration = Duration::seconds(1_209_600);

	/// How long a session with the given override lives, measured from `now`.
	///
	/// Sessions that expire on browser close still get a server-side lifetime of
	/// `cookie_age`.
	pub(crate) fn age(&self, expiry: Option<Expiry>, now: OffsetDateTime) -> Duration
	{
		match expiry {
			None | Some(Expiry::OnBrowserClose) => self.cookie_age,
			Some(Expiry::OnInactivity(age)) => age,
			Some(Expiry::AtDateTime(at)) => Duration::seconds((at - now).whole_seconds().max(0)),
		}
	}

	pub(crate) fn at_browser_close(&self, expiry: Option<Expiry>) -> bool
	{
		match expiry {
			None => self.expire_at_browser_close,
			Some(Expiry::OnBrowserClose) => true,
			Some(Expiry::OnInactivity(_) | Expiry::AtDateTime(_)) => false,
		}
	}
}

impl Default for ExpiryDefaults
{
	fn default() -> Self
	{
		Self { cookie_age: Self::DEFAULT_COOKIE_AGE, expire_at_browser_close: false }
	}
}
