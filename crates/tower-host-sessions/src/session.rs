use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use crate::expiry::ExpiryDefaults;
use crate::store::{CreateError, Record, SaveError, SessionStore};
use crate::{Expiry, ExpiryPolicy, SessionKey};

/// How many fresh keys we try before giving up on creating a session.
const MAX_CREATE_ATTEMPTS: usize = 8;

/// A session.
///
/// The [`SessionManager`] inserts one of these into the [request extensions] of every request.
/// Clones share their state, so changes made by a handler are visible to the middleware once
/// the handler returns.
///
/// Reading the session marks it as *accessed*; writing marks it as *accessed* and *modified*.
/// Those flags decide what happens to the session cookie on the way out.
///
/// [`SessionManager`]: crate::SessionManager
/// [request extensions]: http::Request::extensions
#[derive(Clone)]
pub struct Session
{
	inner: Arc<Mutex<Inner>>,
	defaults: ExpiryDefaults,
}

#[derive(Debug, Default)]
struct Inner
{
	/// `None` until the session is saved for the first time.
	key: Option<SessionKey>,
	data: Map<String, Value>,
	expiry: Option<Expiry>,
	accessed: bool,
	modified: bool,

	/// Keys that were given up by [`Session::flush()`] / [`Session::cycle_key()`] and still
	/// have to be deleted from the store.
	stale_keys: Vec<SessionKey>,
}

/// A snapshot of the flags the response-side decision is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState
{
	/// Whether the session was read or written during the request.
	pub accessed: bool,

	/// Whether the session was written during the request.
	pub modified: bool,

	/// Whether the session has neither a key nor any data.
	pub is_empty: bool,
}

impl Session
{
	pub(crate) fn new(defaults: ExpiryDefaults) -> Self
	{
		Self { inner: Arc::default(), defaults }
	}

	pub(crate) fn from_record(record: Record, defaults: ExpiryDefaults) -> Self
	{
		let inner = Inner {
			key: Some(record.key),
			data: record.data,
			expiry: record.expiry,
			..Inner::default()
		};

		Self { inner: Arc::new(Mutex::new(inner)), defaults }
	}

	fn lock(&self) -> MutexGuard<'_, Inner>
	{
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Returns the session key, if the session was ever saved.
	pub fn key(&self) -> Option<SessionKey>
	{
		self.lock().key.clone()
	}

	/// Returns the value stored under `key`, deserialized as `T`.
	pub fn get<T>(&self, key: &str) -> Result<Option<T>, serde_json::Error>
	where
		T: DeserializeOwned,
	{
		self.get_value(key).map(serde_json::from_value).transpose()
	}

	/// Returns the raw value stored under `key`.
	pub fn get_value(&self, key: &str) -> Option<Value>
	{
		let mut inner = self.lock();
		inner.accessed = true;
		inner.data.get(key).cloned()
	}

	/// Whether there is a value stored under `key`.
	pub fn contains_key(&self, key: &str) -> bool
	{
		let mut inner = self.lock();
		inner.accessed = true;
		inner.data.contains_key(key)
	}

	/// The number of stored values.
	pub fn len(&self) -> usize
	{
		let mut inner = self.lock();
		inner.accessed = true;
		inner.data.len()
	}

	/// Stores `value` under `key`, returning the previous value.
	pub fn insert<T>(&self, key: impl Into<String>, value: T) -> Result<Option<Value>, serde_json::Error>
	where
		T: Serialize,
	{
		serde_json::to_value(value).map(|value| self.insert_value(key, value))
	}

	/// Stores a raw value under `key`, returning the previous value.
	pub fn insert_value(&self, key: impl Into<String>, value: Value) -> Option<Value>
	{
		let mut inner = self.lock();
		inner.accessed = true;
		inner.modified = true;
		inner.data.insert(key.into(), value)
	}

	/// Removes the value stored under `key`.
	///
	/// The session only counts as modified if there was something to remove.
	pub fn remove(&self, key: &str) -> Option<Value>
	{
		let mut inner = self.lock();
		inner.accessed = true;

		let removed = inner.data.remove(key);
		inner.modified |= removed.is_some();
		removed
	}

	/// Removes all data, keeping the key.
	pub fn clear(&self)
	{
		let mut inner = self.lock();
		inner.data.clear();
		inner.accessed = true;
		inner.modified = true;
	}

	/// Removes all data and gives up the key.
	///
	/// The stored record is deleted once the request is done, and the client's cookie is
	/// removed. Use this on logout.
	pub fn flush(&self)
	{
		let mut inner = self.lock();
		inner.data.clear();
		inner.expiry = None;
		inner.accessed = true;
		inner.modified = true;

		if let Some(key) = inner.key.take() {
			inner.stale_keys.push(key);
		}
	}

	/// Keeps the data but moves it to a new key.
	///
	/// The old record is deleted once the request is done. Use this on login, so a key an
	/// attacker may have planted before authentication becomes worthless.
	pub fn cycle_key(&self)
	{
		let mut inner = self.lock();
		inner.accessed = true;
		inner.modified = true;

		if let Some(key) = inner.key.take() {
			inner.stale_keys.push(key);
		}
	}

	/// Overrides the configured expiry for this session.
	///
	/// `None` reverts to the configured behavior.
	pub fn set_expiry(&self, expiry: Option<Expiry>)
	{
		let mut inner = self.lock();
		inner.expiry = expiry;
		inner.accessed = true;
		inner.modified = true;
	}

	/// The expiry override set with [`set_expiry()`], if any.
	///
	/// [`set_expiry()`]: Session::set_expiry()
	pub fn expiry(&self) -> Option<Expiry>
	{
		self.lock().expiry
	}

	/// How long the session has left, counted from now.
	pub fn expiry_age(&self) -> Duration
	{
		self.expiry_age_at(OffsetDateTime::now_utc())
	}

	pub(crate) fn expiry_age_at(&self, now: OffsetDateTime) -> Duration
	{
		self.defaults.age(self.expiry(), now)
	}

	/// When the session expires if it is saved now.
	pub fn expiry_date(&self) -> OffsetDateTime
	{
		let now = OffsetDateTime::now_utc();
		now + self.expiry_age_at(now)
	}

	/// Whether the session cookie should expire when the browser closes.
	pub fn expire_at_browser_close(&self) -> bool
	{
		self.defaults.at_browser_close(self.expiry())
	}

	/// The expiry policy for the session cookie, evaluated at `now`.
	pub fn expiry_policy(&self, now: OffsetDateTime) -> ExpiryPolicy
	{
		if self.expire_at_browser_close() {
			ExpiryPolicy::BrowserClose
		} else {
			ExpiryPolicy::MaxAge(self.expiry_age_at(now))
		}
	}

	/// Whether the session was read or written.
	pub fn accessed(&self) -> bool
	{
		self.lock().accessed
	}

	/// Whether the session was written.
	pub fn modified(&self) -> bool
	{
		self.lock().modified
	}

	/// Whether the session has neither a key nor any data.
	pub fn is_empty(&self) -> bool
	{
		let inner = self.lock();
		inner.key.is_none() && inner.data.is_empty()
	}

	/// Takes a snapshot of the accessed / modified / empty flags.
	pub fn state(&self) -> SessionState
	{
		let inner = self.lock();

		SessionState {
			accessed: inner.accessed,
			modified: inner.modified,
			is_empty: inner.key.is_none() && inner.data.is_empty(),
		}
	}

	pub(crate) fn take_stale_keys(&self) -> Vec<SessionKey>
	{
		mem::take(&mut self.lock().stale_keys)
	}

	/// Persists the session, returning its key.
	///
	/// Sessions without a key are created under a freshly generated one. Sessions with a key
	/// are updated in place, which fails with [`SaveError::Deleted`] if the record disappeared
	/// in the meantime.
	pub async fn save<S>(&self, store: &mut S) -> Result<SessionKey, SaveError<S::Error>>
	where
		S: SessionStore,
	{
		let now = OffsetDateTime::now_utc();
		let (key, data, expiry) = {
			let inner = self.lock();
			(inner.key.clone(), inner.data.clone(), inner.expiry)
		};
		let expires_at = now + self.defaults.age(expiry, now);

		let key = match key {
			Some(key) => {
				let record = Record { key, data, expiry, expires_at };
				store.save(&record).await?;
				record.key
			},
			None => create(store, data, expiry, expires_at).await?,
		};

		self.lock().key = Some(key.clone());

		Ok(key)
	}
}

async fn create<S>(
	store: &mut S,
	data: Map<String, Value>,
	expiry: Option<Expiry>,
	expires_at: OffsetDateTime,
) -> Result<SessionKey, SaveError<S::Error>>
where
	S: SessionStore,
{
	for _ in 0..MAX_CREATE_ATTEMPTS {
		let record = Record { key: SessionKey::generate(), data: data.clone(), expiry, expires_at };

		match store.create(&record).await {
			Ok(()) => return Ok(record.key),
			Err(CreateError::Collision) => {
				tracing::debug!(key = ?record.key, "session key collision");
			},
			Err(CreateError::Store(error)) => return Err(SaveError::Store(error)),
		}
	}

	Err(SaveError::Collision)
}

impl fmt::Debug for Session
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		let inner = self.lock();

		f.debug_struct("Session")
			.field("key", &inner.key)
			.field("accessed", &inner.accessed)
			.field("modified", &inner.modified)
			.field("len", &inner.data.len())
			.finish_non_exhaustive()
	}
}
