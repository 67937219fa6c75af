use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower_service::Service;
use tracing::Instrument;

use crate::lifecycle::process_response;
use crate::{RequestInfo, Session, SessionConfig, SessionError, SessionManagerError, SessionStore};

/// A middleware that loads sessions before, and manages the session cookie after, the inner
/// service.
///
/// Before calling the inner service, the session cookie is read from the request, its session
/// loaded from the store, and a [`Session`] inserted into the [request extensions]. A missing,
/// malformed, unknown or expired key results in a fresh, empty session.
///
/// Afterwards, the session cookie is deleted, refreshed, or left alone, scoped to the domain
/// the request's host resolves to. See [`lifecycle`] for the rules.
///
/// [request extensions]: http::Request::extensions
/// [`lifecycle`]: crate::lifecycle
#[derive(Debug, Clone)]
pub struct SessionManager<Inner, Store>
where
	Store: SessionStore,
{
	/// Cookie attributes, domain rules, expiry defaults.
	config: Arc<SessionConfig>,

	/// The session store.
	store: Store,

	/// The inner service.
	inner: Inner,
}

impl<Inner, Store> SessionManager<Inner, Store>
where
	Store: SessionStore,
{
	/// Constructs a new [`SessionManager`].
	pub fn new(config: impl Into<Arc<SessionConfig>>, store: Store, inner: Inner) -> Self
	{
		Self { config: config.into(), store, inner }
	}

	/// Get a reference to the inner service.
	pub fn get_ref(&self) -> &Inner
	{
		&self.inner
	}

	/// Get a mutable reference to the inner service.
	pub fn get_mut(&mut self) -> &mut Inner
	{
		&mut self.inner
	}

	/// Consume the middleware and return the inner service.
	pub fn into_inner(self) -> Inner
	{
		self.inner
	}
}

async fn call_impl<Inner, Store, ReqBody, ResBody>(
	config: Arc<SessionConfig>,
	mut store: Store,
	mut inner: Inner,
	mut request: http::Request<ReqBody>,
) -> Result<http::Response<ResBody>, SessionManagerError<Store::Error, Inner::Error>>
where
	Inner: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
	Inner::Error: std::error::Error + 'static,
	Store: SessionStore,
{
	let info = RequestInfo::from_request(&request, config.cookie_name());
	let record = match info.session_key() {
		None => None,
		Some(key) => store
			.load(&key)
			.await
			.map_err(SessionError::LoadSession)?,
	};

	let session = match record {
		Some(record) => Session::from_record(record, config.expiry),
		None => Session::new(config.expiry),
	};

	request.extensions_mut().insert(session.clone());

	let mut response = inner
		.call(request)
		.await
		.map_err(SessionManagerError::Service)?;

	match process_response(&config, &mut store, &info, Some(&session), &mut response).await {
		Ok(_) => Ok(response),
		Err(error @ SessionError::ConcurrentDeletion) => {
			tracing::warn!(%error, "rejecting response");
			Err(error.into())
		},
		Err(error) => {
			tracing::error!(error = &error as &dyn std::error::Error, "failed to process session");
			Err(error.into())
		},
	}
}

impl<Inner, Store, ReqBody, ResBody> Service<http::Request<ReqBody>> for SessionManager<Inner, Store>
where
	Inner: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
		+ Clone
		+ Send
		+ 'static,
	Inner::Error: std::error::Error + Send + 'static,
	Inner::Future: Send,
	Store: SessionStore + Clone,
	ReqBody: Send + 'static,
	ResBody: Send + 'static,
{
	type Response = http::Response<ResBody>;
	type Error = SessionManagerError<Store::Error, Inner::Error>;
	type Future =
		Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>
	{
		self.inner.poll_ready(cx).map_err(SessionManagerError::Service)
	}

	fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future
	{
		// The clone might not be ready yet, so we keep it and hand the ready one to the future.
		let clone = self.inner.clone();
		let inner = mem::replace(&mut self.inner, clone);
		let span = tracing::debug_span!("session_manager", uri = %request.uri());

		Box::pin(
			call_impl(Arc::clone(&self.config), self.store.clone(), inner, request)
				.instrument(span),
		)
	}
}

#[cfg(test)]
mod tests
{
	use std::convert::Infallible;

	use cookie::Cookie;
	use http::{HeaderValue, StatusCode, header};
	use time::{Duration, OffsetDateTime};
	use tower::{ServiceBuilder, ServiceExt as _};

	use super::*;
	use crate::{CookieOptions, DomainResolver, MemoryStore, SessionKey, SessionManagerLayer};

	type Request = http::Request<()>;
	type Response = http::Response<()>;

	fn config() -> SessionConfig
	{
		let domains = DomainResolver::from_rules(Some(".fallback.org"), [
			(".example.com", r"[a-zA-Z0-9\-_.:]*\.example\.com"),
			(".domain.com", r"[a-zA-Z0-9\-_.:]*\.domain\.com"),
		])
		.unwrap();

		SessionConfig::new(CookieOptions::default(), domains)
	}

	fn request(host: &str, session_cookie: Option<&SessionKey>) -> Request
	{
		let mut builder = http::Request::builder().uri("/").header(header::HOST, host);

		if let Some(key) = session_cookie {
			builder = builder.header(header::COOKIE, format!("theme=dark; sessionid={key}"));
		}

		builder.body(()).unwrap()
	}

	fn session(request: &Request) -> Session
	{
		request.extensions().get::<Session>().cloned().unwrap()
	}

	fn set_cookies(response: &Response) -> Vec<Cookie<'static>>
	{
		response
			.headers()
			.get_all(header::SET_COOKIE)
			.iter()
			.map(|value| Cookie::parse_encoded(value.to_str().unwrap()).unwrap().into_owned())
			.collect()
	}

	fn domain<'a>(cookie: &'a Cookie<'_>) -> Option<&'a str>
	{
		cookie.domain().map(|domain| domain.trim_start_matches('.'))
	}

	async fn stored_session(store: &MemoryStore) -> SessionKey
	{
		let mut store = store.clone();
		let session = Session::new(config().expiry);
		session.insert("user", "alice").unwrap();
		session.save(&mut store).await.unwrap()
	}

	#[tokio::test]
	async fn modified_session_gets_a_cookie()
	{
		let store = MemoryStore::new();
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				session(&request).insert("visits", 1_u32).unwrap();
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", None)).await.unwrap();
		let cookies = set_cookies(&response);

		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].name(), "sessionid");
		assert_eq!(domain(&cookies[0]), Some("example.com"));
		assert_eq!(cookies[0].path(), Some("/"));
		assert_eq!(cookies[0].max_age(), Some(Duration::seconds(1_209_600)));

		let expected = OffsetDateTime::now_utc() + Duration::seconds(1_209_600);
		let expires = cookies[0].expires_datetime().unwrap();
		assert!((expires - expected).abs() <= Duration::seconds(5), "expires {expires}");

		let key = cookies[0].value().parse::<SessionKey>().unwrap();
		assert!(store.get(&key).is_some(), "session should be persisted");
		assert_eq!(
			response.headers().get(header::VARY),
			Some(&HeaderValue::from_static("Cookie")),
		);
	}

	#[tokio::test]
	async fn emptied_session_gets_its_cookie_deleted()
	{
		let store = MemoryStore::new();
		let key = stored_session(&store).await;
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				session(&request).flush();
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", Some(&key))).await.unwrap();
		let cookies = set_cookies(&response);

		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].name(), "sessionid");
		assert_eq!(cookies[0].value(), "");
		assert_eq!(domain(&cookies[0]), Some("example.com"));
		assert_eq!(cookies[0].path(), Some("/"));
		assert_eq!(cookies[0].max_age(), Some(Duration::ZERO));
		assert!(store.get(&key).is_none(), "flushed session should be deleted from the store");
		assert!(response.headers().get(header::VARY).is_none(), "deletion does not vary");
	}

	#[tokio::test]
	async fn unknown_key_with_untouched_session_is_deleted()
	{
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), MemoryStore::new()))
			.service_fn(|_: Request| async { Ok::<_, Infallible>(Response::new(())) });

		let stale = SessionKey::generate();
		let response = service.oneshot(request("shop.domain.com", Some(&stale))).await.unwrap();
		let cookies = set_cookies(&response);

		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].value(), "");
		assert_eq!(domain(&cookies[0]), Some("domain.com"));
	}

	#[tokio::test]
	async fn server_errors_are_not_saved()
	{
		let store = MemoryStore::new();
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				session(&request).insert("visits", 1_u32).unwrap();

				let mut response = Response::new(());
				*response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
				Ok::<_, Infallible>(response)
			});

		let response = service.oneshot(request("app.example.com", None)).await.unwrap();

		assert!(set_cookies(&response).is_empty(), "no cookie on 500");
		assert!(store.is_empty(), "no save on 500");
		assert!(response.headers().get(header::VARY).is_some(), "still accessed");
	}

	#[tokio::test]
	async fn reading_only_varies()
	{
		let store = MemoryStore::new();
		let key = stored_session(&store).await;
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				let user = session(&request).get::<String>("user").unwrap();
				assert_eq!(user.as_deref(), Some("alice"));
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", Some(&key))).await.unwrap();

		assert!(set_cookies(&response).is_empty(), "unmodified session keeps its cookie");
		assert_eq!(response.headers().get(header::VARY).unwrap(), "Cookie");
	}

	#[tokio::test]
	async fn save_every_request_refreshes_existing_sessions()
	{
		let store = MemoryStore::new();
		let key = stored_session(&store).await;
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(
				config().save_every_request(true),
				store.clone(),
			))
			.service_fn(|_: Request| async { Ok::<_, Infallible>(Response::new(())) });

		let response = service.oneshot(request("unknown.host", Some(&key))).await.unwrap();
		let cookies = set_cookies(&response);

		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].value(), key.as_str());
		assert_eq!(domain(&cookies[0]), Some("fallback.org"));
		assert!(response.headers().get(header::VARY).is_none(), "never accessed");
	}

	#[tokio::test]
	async fn browser_close_cookies_have_no_expiry()
	{
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(
				config().expire_at_browser_close(true),
				MemoryStore::new(),
			))
			.service_fn(|request: Request| async move {
				session(&request).insert("visits", 1_u32).unwrap();
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", None)).await.unwrap();
		let cookies = set_cookies(&response);

		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].max_age(), None);
		assert_eq!(cookies[0].expires(), None);
	}

	#[tokio::test]
	async fn concurrent_deletion_is_rejected()
	{
		let store = MemoryStore::new();
		let key = stored_session(&store).await;
		let handler_store = store.clone();
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(move |request: Request| {
				let mut store = handler_store.clone();

				async move {
					let session = session(&request);
					session.insert("visits", 2_u32).unwrap();

					// Another request logs the user out while this one is still running.
					if let Some(key) = session.key() {
						store.delete(&key).await.unwrap();
					}

					Ok::<_, Infallible>(Response::new(()))
				}
			});

		let error = service.oneshot(request("app.example.com", Some(&key))).await.unwrap_err();

		assert!(
			matches!(error, SessionManagerError::Session(SessionError::ConcurrentDeletion)),
			"{error:?}",
		);
		assert!(error.is_client_error(), "concurrent deletion is the client's problem");
		assert!(store.is_empty(), "the deleted session must not be resurrected");
	}

	#[tokio::test]
	async fn requests_without_cookie_and_untouched_session_are_left_alone()
	{
		let store = MemoryStore::new();
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|_: Request| async { Ok::<_, Infallible>(Response::new(())) });

		let response = service.oneshot(request("app.example.com", None)).await.unwrap();

		assert!(response.headers().is_empty(), "{:?}", response.headers());
		assert!(store.is_empty(), "nothing to save");
	}

	#[tokio::test]
	async fn cycling_the_key_replaces_the_record()
	{
		let store = MemoryStore::new();
		let old = stored_session(&store).await;
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				session(&request).cycle_key();
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", Some(&old))).await.unwrap();
		let cookies = set_cookies(&response);
		let new = cookies[0].value().parse::<SessionKey>().unwrap();

		assert_ne!(new, old);
		assert!(store.get(&old).is_none(), "old record should be gone");
		assert_eq!(
			store.get(&new).and_then(|record| record.data.get("user").cloned()),
			Some(serde_json::Value::from("alice")),
		);
	}

	#[tokio::test]
	async fn stale_duplicate_cookie_does_not_log_the_user_out()
	{
		let store = MemoryStore::new();
		let key = stored_session(&store).await;
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), store.clone()))
			.service_fn(|request: Request| async move {
				let user = session(&request).get::<String>("user").unwrap();
				assert_eq!(user.as_deref(), Some("alice"));
				Ok::<_, Infallible>(Response::new(()))
			});

		let request = http::Request::builder()
			.uri("/")
			.header(header::HOST, "app.example.com")
			.header(header::COOKIE, format!("sessionid={}; sessionid={key}", SessionKey::generate()))
			.body(())
			.unwrap();

		let response = service.oneshot(request).await.unwrap();

		assert!(set_cookies(&response).is_empty(), "the valid session cookie must survive");
		assert!(store.get(&key).is_some(), "session is still stored");
	}

	#[tokio::test]
	async fn domain_attribute_is_rendered_without_leading_dot()
	{
		let service = ServiceBuilder::new()
			.layer(SessionManagerLayer::new(config(), MemoryStore::new()))
			.service_fn(|request: Request| async move {
				session(&request).insert("visits", 1_u32).unwrap();
				Ok::<_, Infallible>(Response::new(()))
			});

		let response = service.oneshot(request("app.example.com", None)).await.unwrap();
		let header = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();

		assert!(header.contains("; Domain=example.com"), "{header}");
		assert!(!header.contains("Domain=.example.com"), "{header}");
	}
}
