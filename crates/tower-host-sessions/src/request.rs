use cookie::Cookie;
use http::header;

use crate::SessionKey;

/// What the middleware remembers about a request after handing it to the inner service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo
{
	host: Option<Box<str>>,
	session_cookie: Option<Box<str>>,
}

impl RequestInfo
{
	/// Creates a [`RequestInfo`] from its parts.
	pub fn new(host: Option<&str>, session_cookie: Option<&str>) -> Self
	{
		Self { host: host.map(Box::from), session_cookie: session_cookie.map(Box::from) }
	}

	/// Extracts the host and the value of the `cookie_name` cookie from a request.
	pub fn from_request<B>(request: &http::Request<B>, cookie_name: &str) -> Self
	{
		let host = request
			.headers()
			.get(header::HOST)
			.and_then(|value| value.to_str().ok())
			.or_else(|| request.uri().authority().map(|authority| authority.as_str()))
			.map(Box::from);

		Self { host, session_cookie: find_cookie(request.headers(), cookie_name) }
	}

	/// The request's host, including the port if there was one.
	pub fn host(&self) -> Option<&str>
	{
		self.host.as_deref()
	}

	/// Whether the request carried the session cookie at all, valid or not.
	pub fn has_session_cookie(&self) -> bool
	{
		self.session_cookie.is_some()
	}

	/// The session key from the cookie, if it is well-formed.
	pub fn session_key(&self) -> Option<SessionKey>
	{
		let value = self.session_cookie.as_deref()?;

		match value.parse::<SessionKey>() {
			Ok(key) => Some(key),
			Err(error) => {
				tracing::debug!(%error, "ignoring malformed session cookie");
				None
			},
		}
	}
}

/// Finds the value of the last `name` cookie across all `Cookie` headers.
///
/// Browsers send a host-only cookie and a domain cookie of the same name side by side; the
/// later one wins.
fn find_cookie(headers: &http::HeaderMap, name: &str) -> Option<Box<str>>
{
	headers
		.get_all(header::COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(Cookie::split_parse_encoded)
		.filter_map(Result::ok)
		.filter(|cookie| cookie.name() == name)
		.last()
		.map(|cookie| Box::from(cookie.value()))
}
