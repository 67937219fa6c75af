//! Session persistence.

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{Expiry, SessionKey};

/// A persisted session.
#[derive(Debug, Clone, PartialEq)]
pub struct Record
{
	/// The key the record is stored under.
	pub key: SessionKey,

	/// The session data.
	pub data: Map<String, Value>,

	/// The session's own expiry override, if it set one.
	pub expiry: Option<Expiry>,

	/// When the store may forget this record.
	pub expires_at: OffsetDateTime,
}

impl Record
{
	/// Whether the record is expired at `now`.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool
	{
		self.expires_at <= now
	}
}

/// Returned by [`SessionStore::create()`].
#[derive(Debug, Error)]
pub enum CreateError<E>
where
	E: std::error::Error + 'static,
{
	/// A record with the same key already exists.
	#[error("session key already exists")]
	Collision,

	/// The store failed.
	#[error(transparent)]
	Store(E),
}

/// Returned by [`SessionStore::save()`] and [`Session::save()`].
///
/// [`Session::save()`]: crate::Session::save()
#[derive(Debug, Error)]
pub enum SaveError<E>
where
	E: std::error::Error + 'static,
{
	/// The record was deleted after it was loaded, e.g. by a logout in a concurrent request.
	#[error("session was deleted before it could be saved")]
	Deleted,

	/// No unused key could be generated for a new session.
	#[error("could not allocate a unique session key")]
	Collision,

	/// The store failed.
	#[error(transparent)]
	Store(E),
}

/// A session store.
///
/// This is used by the [`SessionManager`] to load sessions before the inner service runs and
/// to persist them afterwards. Stores are cloned for every request, so they should be cheap to
/// clone and share their state.
///
/// [`SessionManager`]: crate::SessionManager
pub trait SessionStore: Send + Sync + 'static
{
	/// An error type that can be returned from the methods.
	type Error: std::error::Error + Send + Sync + 'static;

	/// Loads a session from the store.
	///
	/// Unknown and expired keys both result in `Ok(None)`.
	fn load(
		&mut self,
		key: &SessionKey,
	) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send;

	/// Stores a new record.
	///
	/// Must fail with [`CreateError::Collision`] if the key is already taken.
	fn create(
		&mut self,
		record: &Record,
	) -> impl Future<Output = Result<(), CreateError<Self::Error>>> + Send;

	/// Updates an existing record.
	///
	/// Must fail with [`SaveError::Deleted`] if there is no record with this key anymore.
	fn save(
		&mut self,
		record: &Record,
	) -> impl Future<Output = Result<(), SaveError<Self::Error>>> + Send;

	/// Deletes a record. Deleting a key that does not exist is not an error.
	fn delete(&mut self, key: &SessionKey) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
