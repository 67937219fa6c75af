use std::borrow::Cow;

use cookie::SameSite;

/// Attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions
{
	pub(crate) name: Cow<'static, str>,
	pub(crate) path: Cow<'static, str>,
	pub(crate) secure: bool,
	pub(crate) http_only: bool,
	pub(crate) same_site: SameSite,
}

impl CookieOptions
{
	/// The default cookie name.
	pub const DEFAULT_NAME: &'static str = "sessionid";

	/// Creates new [`CookieOptions`].
	pub fn new(name: impl Into<Cow<'static, str>>, path: impl Into<Cow<'static, str>>) -> Self
	{
		Self {
			name: name.into(),
			path: path.into(),
			secure: true,
			http_only: true,
			same_site: SameSite::Lax,
		}
	}

	/// Dictates the value of the `Secure` field.
	///
	/// This is `true` by default.
	pub fn secure(mut self, secure: bool) -> Self
	{
		self.secure = secure;
		self
	}

	/// Dictates the value of the `HttpOnly` field.
	///
	/// This is `true` by default.
	pub fn http_only(mut self, http_only: bool) -> Self
	{
		self.http_only = http_only;
		self
	}

	/// Dictates the value of the `SameSite` field.
	///
	/// This is `Lax` by default.
	pub fn same_site(mut self, same_site: SameSite) -> Self
	{
		self.same_site = same_site;
		self
	}

	/// The cookie name.
	pub fn name(&self) -> &str
	{
		&self.name
	}

	/// The cookie path.
	pub fn path(&self) -> &str
	{
		&self.path
	}

	/// Whether removal cookies need the `Secure` attribute.
	///
	/// Browsers refuse to overwrite `__Secure-` / `__Host-` cookies and `SameSite=None`
	/// cookies without it.
	pub(crate) fn secure_removal(&self) -> bool
	{
		self.name.starts_with("__Secure-")
			|| self.name.starts_with("__Host-")
			|| self.same_site == SameSite::None
	}
}

impl Default for CookieOptions
{
	fn default() -> Self
	{
		Self::new(Self::DEFAULT_NAME, "/")
	}
}
