//! What happens to the session cookie once the inner service produced a response.
//!
//! The decision is made in two steps. [`evaluate()`] looks at the session flags and the status
//! code and picks an [`Action`]. [`process_response()`] then carries it out: it saves the
//! session if necessary, builds the [`CookieDecision`], and only then touches the response, so
//! a failed save leaves the response exactly as the handler returned it.

use cookie::{Cookie, CookieBuilder};
use http::{HeaderValue, StatusCode, header};
use time::{Duration, OffsetDateTime};

use crate::store::{SaveError, SessionStore};
use crate::{CookieOptions, ExpiryPolicy, RequestInfo, Session, SessionConfig, SessionError, SessionKey, SessionState};

/// What should happen to the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action
{
	/// Remove the cookie from the client.
	Delete,

	/// Save the session and send a fresh cookie.
	Refresh,

	/// Leave the cookie alone.
	NoOp,
}

/// The outcome of [`evaluate()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict
{
	/// Whether `Cookie` has to be added to the response's `Vary` header.
	pub vary_on_cookie: bool,

	/// What to do with the cookie.
	pub action: Action,
}

/// Decides what to do with the session cookie.
///
/// - A request that brought a session cookie but left an empty session gets its cookie
///   deleted. Nothing else is considered in that case.
/// - Otherwise an accessed session makes the response vary on `Cookie`, and a modified (or,
///   with `save_every_request`, any) non-empty session is saved and its cookie refreshed,
///   unless the response is a `500`.
pub fn evaluate(
	had_cookie: bool,
	state: SessionState,
	save_every_request: bool,
	status: StatusCode,
) -> Verdict
{
	if had_cookie && state.is_empty {
		return Verdict { vary_on_cookie: false, action: Action::Delete };
	}

	let wants_save = (state.modified || save_every_request) && !state.is_empty;
	let action = if wants_save && status != StatusCode::INTERNAL_SERVER_ERROR {
		Action::Refresh
	} else {
		Action::NoOp
	};

	Verdict { vary_on_cookie: state.accessed, action }
}

/// The cookie instruction for a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDecision
{
	/// Send a removal cookie scoped to `domain`.
	Delete
	{
		/// The resolved cookie domain.
		domain: Option<String>,
	},

	/// Send a cookie carrying `session_key`.
	Refresh
	{
		/// The (possibly new) session key.
		session_key: SessionKey,

		/// `None` for cookies that expire when the browser closes.
		max_age: Option<Duration>,

		/// `None` for cookies that expire when the browser closes.
		expires: Option<OffsetDateTime>,

		/// The resolved cookie domain.
		domain: Option<String>,
	},

	/// Don't send a cookie.
	NoOp,
}

impl CookieDecision
{
	/// Builds a [`CookieDecision::Refresh`], deriving `Max-Age` and `Expires` from `policy`.
	pub fn refresh(
		session_key: SessionKey,
		policy: ExpiryPolicy,
		now: OffsetDateTime,
		domain: Option<&str>,
	) -> Self
	{
		let (max_age, expires) = match policy {
			ExpiryPolicy::BrowserClose => (None, None),
			ExpiryPolicy::MaxAge(max_age) => (Some(max_age), Some(now + max_age)),
		};

		Self::Refresh { session_key, max_age, expires, domain: domain.map(ToOwned::to_owned) }
	}

	/// Builds the `Set-Cookie` cookie for this decision, if there is one.
	pub fn to_cookie(&self, options: &CookieOptions) -> Option<Cookie<'static>>
	{
		match self {
			Self::NoOp => None,
			Self::Delete { domain } => {
				let builder = CookieBuilder::new(options.name.clone(), "")
					.path(options.path.clone())
					.same_site(options.same_site)
					.secure(options.secure_removal())
					.max_age(Duration::ZERO)
					.expires(OffsetDateTime::UNIX_EPOCH);

				Some(with_domain(builder, domain.as_deref()).build())
			},
			Self::Refresh { session_key, max_age, expires, domain } => {
				let mut builder = CookieBuilder::new(options.name.clone(), session_key.to_string())
					.path(options.path.clone())
					.same_site(options.same_site)
					.secure(options.secure)
					.http_only(options.http_only);

				if let Some(max_age) = *max_age {
					builder = builder.max_age(max_age);
				}

				if let Some(expires) = *expires {
					builder = builder.expires(expires);
				}

				Some(with_domain(builder, domain.as_deref()).build())
			},
		}
	}
}

/// Sets the `Domain` attribute.
///
/// `cookie` drops a leading `.` when rendering, so `.example.com` is sent as
/// `Domain=example.com`. Browsers treat both the same (RFC 6265, section 5.2.3).
fn with_domain(builder: CookieBuilder<'static>, domain: Option<&str>) -> CookieBuilder<'static>
{
	match domain {
		Some(domain) => builder.domain(domain.to_owned()),
		None => builder,
	}
}

/// Runs the response half of the session lifecycle.
///
/// `session` is `None` when no session was attached to the request, in which case the
/// response is left alone. On error the response is not modified.
pub async fn process_response<S, B>(
	config: &SessionConfig,
	store: &mut S,
	request: &RequestInfo,
	session: Option<&Session>,
	response: &mut http::Response<B>,
) -> Result<CookieDecision, SessionError<S::Error>>
where
	S: SessionStore,
{
	let Some(session) = session else {
		return Ok(CookieDecision::NoOp);
	};

	for key in session.take_stale_keys() {
		store.delete(&key).await.map_err(SessionError::DeleteSession)?;
	}

	let domain = request.host().map_or_else(
		|| config.domains.default_domain(),
		|host| config.domains.resolve(host),
	);
	let verdict = evaluate(
		request.has_session_cookie(),
		session.state(),
		config.save_every_request,
		response.status(),
	);

	let decision = match verdict.action {
		Action::NoOp => CookieDecision::NoOp,
		Action::Delete => CookieDecision::Delete { domain: domain.map(ToOwned::to_owned) },
		Action::Refresh => {
			let now = OffsetDateTime::now_utc();
			let policy = session.expiry_policy(now);
			let session_key = session.save(store).await.map_err(|error| match error {
				SaveError::Deleted => SessionError::ConcurrentDeletion,
				error => SessionError::SaveSession(error),
			})?;

			CookieDecision::refresh(session_key, policy, now, domain)
		},
	};

	let set_cookie = decision
		.to_cookie(&config.cookie)
		.map(|cookie| HeaderValue::try_from(cookie.encoded().to_string()))
		.transpose()?;

	tracing::debug!(?decision, vary_on_cookie = verdict.vary_on_cookie, "processed session");

	if verdict.vary_on_cookie {
		vary_on_cookie(response.headers_mut());
	}

	if let Some(set_cookie) = set_cookie {
		response.headers_mut().append(header::SET_COOKIE, set_cookie);
	}

	Ok(decision)
}

/// Adds `Cookie` to the `Vary` header.
///
/// Existing entries are kept; nothing happens if `Vary` already lists `Cookie` (in any case)
/// or `*`.
pub fn vary_on_cookie(headers: &mut http::HeaderMap)
{
	let existing = headers
		.get_all(header::VARY)
		.iter()
		.map(|value| value.to_str().map(ToOwned::to_owned))
		.collect::<Result<Vec<_>, _>>();

	let Ok(existing) = existing else {
		headers.append(header::VARY, HeaderValue::from_static("Cookie"));
		return;
	};

	let mut entries = existing
		.iter()
		.flat_map(|value| value.split(','))
		.map(str::trim)
		.filter(|entry| !entry.is_empty())
		.collect::<Vec<_>>();

	if entries
		.iter()
		.any(|&entry| entry == "*" || entry.eq_ignore_ascii_case("cookie"))
	{
		return;
	}

	entries.push("Cookie");

	match HeaderValue::try_from(entries.join(", ")) {
		Ok(value) => {
			headers.insert(header::VARY, value);
		},
		Err(_) => {
			headers.append(header::VARY, HeaderValue::from_static("Cookie"));
		},
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn states() -> impl Iterator<Item = SessionState>
	{
		(0_u8..8).map(|bits| SessionState {
			accessed: bits & 1 != 0,
			modified: bits & 2 != 0,
			is_empty: bits & 4 != 0,
		})
	}

	fn domain<'a>(cookie: &'a Cookie<'_>) -> Option<&'a str>
	{
		cookie.domain().map(|domain| domain.trim_start_matches('.'))
	}

	#[test]
	fn empty_session_with_cookie_is_always_deleted()
	{
		for state in states().filter(|state| state.is_empty) {
			for save_every_request in [false, true] {
				let verdict = evaluate(true, state, save_every_request, StatusCode::OK);

				assert_eq!(verdict.action, Action::Delete, "{state:?}");
				assert!(!verdict.vary_on_cookie, "deletion skips the vary header");
			}
		}
	}

	#[test]
	fn server_errors_never_refresh()
	{
		for state in states() {
			for had_cookie in [false, true] {
				let verdict = evaluate(had_cookie, state, true, StatusCode::INTERNAL_SERVER_ERROR);

				assert_ne!(verdict.action, Action::Refresh, "{state:?}");
			}
		}
	}

	#[test]
	fn other_error_statuses_still_refresh()
	{
		let state = SessionState { accessed: true, modified: true, is_empty: false };

		assert_eq!(evaluate(false, state, false, StatusCode::NOT_FOUND).action, Action::Refresh);
		assert_eq!(evaluate(false, state, false, StatusCode::BAD_GATEWAY).action, Action::Refresh);
	}

	#[test]
	fn accessed_sessions_vary_on_cookie()
	{
		for state in states().filter(|state| state.accessed) {
			for status in [StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR] {
				assert!(
					evaluate(false, state, false, status).vary_on_cookie,
					"{state:?} {status}",
				);
			}
		}
	}

	#[test]
	fn save_every_request_refreshes_unmodified_sessions()
	{
		let state = SessionState { accessed: false, modified: false, is_empty: false };

		assert_eq!(evaluate(true, state, false, StatusCode::OK).action, Action::NoOp);
		assert_eq!(evaluate(true, state, true, StatusCode::OK).action, Action::Refresh);
	}

	#[test]
	fn empty_sessions_without_cookie_are_left_alone()
	{
		let state = SessionState { accessed: true, modified: true, is_empty: true };

		assert_eq!(evaluate(false, state, true, StatusCode::OK), Verdict {
			vary_on_cookie: true,
			action: Action::NoOp,
		});
	}

	#[test]
	fn browser_close_cookies_have_no_expiry()
	{
		let decision = CookieDecision::refresh(
			SessionKey::generate(),
			ExpiryPolicy::BrowserClose,
			OffsetDateTime::now_utc(),
			Some(".example.com"),
		);
		let cookie = decision.to_cookie(&CookieOptions::default()).unwrap();

		assert_eq!(cookie.max_age(), None);
		assert_eq!(cookie.expires(), None);
		assert_eq!(domain(&cookie), Some("example.com"));
	}

	#[test]
	fn max_age_cookies_expire_relative_to_now()
	{
		let now = OffsetDateTime::now_utc();
		let decision = CookieDecision::refresh(
			SessionKey::generate(),
			ExpiryPolicy::MaxAge(Duration::seconds(1_209_600)),
			now,
			None,
		);
		let cookie = decision.to_cookie(&CookieOptions::default()).unwrap();

		assert_eq!(cookie.max_age(), Some(Duration::seconds(1_209_600)));
		assert_eq!(cookie.expires_datetime(), Some(now + Duration::seconds(1_209_600)));
		assert_eq!(domain(&cookie), None);
		assert_eq!(cookie.secure(), Some(true));
		assert_eq!(cookie.http_only(), Some(true));
	}

	#[test]
	fn removal_cookies_expire_immediately()
	{
		let options = CookieOptions::new("sessionid", "/app").same_site(cookie::SameSite::Strict);
		let decision = CookieDecision::Delete { domain: Some(String::from(".example.com")) };
		let cookie = decision.to_cookie(&options).unwrap();

		assert_eq!(cookie.name(), "sessionid");
		assert_eq!(cookie.value(), "");
		assert_eq!(cookie.path(), Some("/app"));
		assert_eq!(domain(&cookie), Some("example.com"));
		assert_eq!(cookie.same_site(), Some(cookie::SameSite::Strict));
		assert_eq!(cookie.max_age(), Some(Duration::ZERO));
		assert_eq!(cookie.expires_datetime(), Some(OffsetDateTime::UNIX_EPOCH));
		assert_eq!(cookie.secure(), Some(false));
	}

	#[test]
	fn removal_cookies_keep_prefixed_names_secure()
	{
		let decision = CookieDecision::Delete { domain: None };

		for options in [
			CookieOptions::new("__Host-session", "/"),
			CookieOptions::new("__Secure-session", "/"),
			CookieOptions::new("sessionid", "/").same_site(cookie::SameSite::None),
		] {
			let cookie = decision.to_cookie(&options).unwrap();
			assert_eq!(cookie.secure(), Some(true), "{}", options.name());
		}
	}

	#[test]
	fn vary_is_added_once()
	{
		let mut headers = http::HeaderMap::new();
		headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));

		vary_on_cookie(&mut headers);
		vary_on_cookie(&mut headers);

		assert_eq!(headers.get(header::VARY).unwrap(), "Accept-Encoding, Cookie");
	}

	#[test]
	fn vary_respects_existing_entries()
	{
		for existing in ["*", "cookie", "Accept, COOKIE"] {
			let mut headers = http::HeaderMap::new();
			headers.insert(header::VARY, HeaderValue::from_static(existing));

			vary_on_cookie(&mut headers);

			assert_eq!(headers.get(header::VARY).unwrap(), existing);
		}
	}

	#[test]
	fn vary_on_empty_headers()
	{
		let mut headers = http::HeaderMap::new();

		vary_on_cookie(&mut headers);

		assert_eq!(headers.get(header::VARY).unwrap(), "Cookie");
	}
}
