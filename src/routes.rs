//! A tiny application showing off the session middleware.

use axum::body::Body;
use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_host_sessions::{MemoryStore, Session, SessionConfig, SessionManagerLayer};

use crate::middleware::{self, InfallibleLayer};

/// The session key under which we count visits.
const VISITS: &str = "visits";

/// The session key under which we store the logged in user's name.
const USER: &str = "user";

pub(crate) fn router(config: SessionConfig, store: MemoryStore, include_headers: bool) -> Router
{
	let sessions = ServiceBuilder::new()
		.layer(InfallibleLayer::new())
		.layer(SessionManagerLayer::new(config, store));

	Router::new()
		.route("/", routing::get(count_visits))
		.route("/whoami", routing::get(whoami))
		.route("/login/{name}", routing::post(login))
		.route("/logout", routing::post(logout))
		.layer(sessions)
		.layer(middleware::trace::layer::<Body, Body>(include_headers))
}

#[derive(Debug, Serialize)]
struct Visits
{
	visits: u64,
}

#[derive(Debug, Serialize)]
struct WhoAmI
{
	user: Option<String>,
}

/// Session data that doesn't have the shape we expect.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
#[display("malformed session data: {_0}")]
struct MalformedSession(serde_json::Error);

impl IntoResponse for MalformedSession
{
	fn into_response(self) -> Response
	{
		tracing::error!(error = &self as &dyn std::error::Error, "failed to handle session data");
		(StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
	}
}

/// Counts how often this session has visited us. Modifies the session every time.
async fn count_visits(session: Session) -> Result<Json<Visits>, MalformedSession>
{
	let visits = session.get::<u64>(VISITS)?.unwrap_or_default() + 1;
	session.insert(VISITS, visits)?;

	Ok(Json(Visits { visits }))
}

/// Only reads the session.
async fn whoami(session: Session) -> Result<Json<WhoAmI>, MalformedSession>
{
	Ok(Json(WhoAmI { user: session.get(USER)? }))
}

async fn login(session: Session, Path(name): Path<String>) -> Result<Json<WhoAmI>, MalformedSession>
{
	// A fresh key on privilege changes prevents session fixation.
	session.cycle_key();
	session.insert(USER, &name)?;

	Ok(Json(WhoAmI { user: Some(name) }))
}

async fn logout(session: Session) -> StatusCode
{
	session.flush();
	StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests
{
	use cookie::Cookie;
	use http::{Method, Request, header};
	use tower::ServiceExt;
	use tower_host_sessions::{CookieOptions, DomainResolver};

	use super::*;

	fn app(store: &MemoryStore) -> Router
	{
		let domains = DomainResolver::from_rules(Some(".fallback.org"), [
			(".example.com", r"[a-zA-Z0-9\-_.:]*\.example\.com"),
			(".domain.com", r"[a-zA-Z0-9\-_.:]*\.domain\.com"),
		])
		.unwrap();

		router(SessionConfig::new(CookieOptions::default(), domains), store.clone(), false)
	}

	fn request(method: Method, uri: &str, host: &str, cookie: Option<&str>) -> Request<Body>
	{
		let mut builder = Request::builder().method(method).uri(uri).header(header::HOST, host);

		if let Some(value) = cookie {
			builder = builder.header(header::COOKIE, format!("sessionid={value}"));
		}

		builder.body(Body::empty()).unwrap()
	}

	fn session_cookie(response: &Response) -> Option<Cookie<'static>>
	{
		response
			.headers()
			.get_all(header::SET_COOKIE)
			.iter()
			.map(|value| Cookie::parse(value.to_str().unwrap().to_owned()).unwrap())
			.find(|cookie| cookie.name() == "sessionid")
	}

	async fn json(response: Response) -> serde_json::Value
	{
		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&body).unwrap()
	}

	#[tokio::test]
	async fn visits_are_counted_per_session()
	{
		let store = MemoryStore::new();
		let app = app(&store);

		let response = app
			.clone()
			.oneshot(request(Method::GET, "/", "www.example.com", None))
			.await
			.unwrap();

		let cookie = session_cookie(&response).unwrap();
		assert_eq!(cookie.domain().map(|domain| domain.trim_start_matches('.')), Some("example.com"));
		assert_eq!(json(response).await["visits"], 1);

		let response = app
			.oneshot(request(Method::GET, "/", "www.example.com", Some(cookie.value())))
			.await
			.unwrap();

		assert_eq!(json(response).await["visits"], 2);
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn reading_does_not_issue_a_cookie()
	{
		let store = MemoryStore::new();
		let response = app(&store)
			.oneshot(request(Method::GET, "/whoami", "shop.domain.com", None))
			.await
			.unwrap();

		assert!(session_cookie(&response).is_none(), "nothing to persist");
		assert_eq!(response.headers().get(header::VARY).unwrap(), "Cookie");
		assert!(store.is_empty(), "no session saved");
	}

	#[tokio::test]
	async fn login_cycles_the_key_and_logout_deletes_the_cookie()
	{
		let store = MemoryStore::new();
		let app = app(&store);

		let response = app
			.clone()
			.oneshot(request(Method::GET, "/", "localhost:8000", None))
			.await
			.unwrap();
		let anonymous = session_cookie(&response).unwrap();
		assert_eq!(anonymous.domain().map(|domain| domain.trim_start_matches('.')), Some("fallback.org"));

		let response = app
			.clone()
			.oneshot(request(Method::POST, "/login/alice", "localhost:8000", Some(anonymous.value())))
			.await
			.unwrap();
		let logged_in = session_cookie(&response).unwrap();
		assert_ne!(logged_in.value(), anonymous.value());
		assert_eq!(store.len(), 1);

		let response = app
			.oneshot(request(Method::POST, "/logout", "localhost:8000", Some(logged_in.value())))
			.await
			.unwrap();
		let removal = session_cookie(&response).unwrap();

		assert_eq!(response.status(), StatusCode::NO_CONTENT);
		assert_eq!(removal.value(), "");
		assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
		assert!(store.is_empty(), "logged out sessions are gone");
	}
}
