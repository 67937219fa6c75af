use http::header::InvalidHeaderValue;
use thiserror::Error;

use crate::store::SaveError;

/// Errors from the session lifecycle itself.
#[derive(Debug, Error)]
pub enum SessionError<E>
where
	E: std::error::Error + 'static,
{
	/// The session could not be loaded from the store.
	#[error("failed to load session")]
	LoadSession(#[source] E),

	/// The session could not be saved back to the store.
	#[error("failed to save session")]
	SaveSession(#[source] SaveError<E>),

	/// A flushed or cycled session could not be deleted from the store.
	#[error("failed to delete session")]
	DeleteSession(#[source] E),

	/// The session was deleted between loading and saving it.
	///
	/// This usually means the user logged out in a concurrent request. It is reported as a
	/// suspicious operation (`400 Bad Request`), never retried.
	#[error(
		"the request's session was deleted before the request completed; the user may have \
		 logged out in a concurrent request"
	)]
	ConcurrentDeletion,

	/// The session cookie could not be encoded as a header value.
	#[error("failed to encode session cookie")]
	EncodeCookie(#[from] InvalidHeaderValue),
}

/// The error returned by the [`SessionManager`] middleware.
///
/// [`SessionManager`]: crate::SessionManager
#[derive(Debug, Error)]
pub enum SessionManagerError<StoreError, ServiceError>
where
	StoreError: std::error::Error + 'static,
	ServiceError: std::error::Error + 'static,
{
	/// Loading, saving or deleting the session failed.
	#[error(transparent)]
	Session(SessionError<StoreError>),

	/// The inner service returned an error.
	#[error(transparent)]
	Service(ServiceError),
}

impl<StoreError, ServiceError> SessionManagerError<StoreError, ServiceError>
where
	StoreError: std::error::Error + 'static,
	ServiceError: std::error::Error + 'static,
{
	/// Whether the client is to blame, rather than us.
	pub fn is_client_error(&self) -> bool
	{
		matches!(self, Self::Session(SessionError::ConcurrentDeletion))
	}
}

impl<StoreError, ServiceError> From<SessionError<StoreError>>
	for SessionManagerError<StoreError, ServiceError>
where
	StoreError: std::error::Error + 'static,
	ServiceError: std::error::Error + 'static,
{
	fn from(error: SessionError<StoreError>) -> Self
	{
		Self::Session(error)
	}
}
