//! Integration with [`axum`].
//!
//! [`axum`]: https://docs.rs/axum

use axum_core::extract::FromRequestParts;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};

use crate::{Session, SessionError, SessionManagerError};

const PROBLEM_JSON: &str = "application/problem+json";

/// Rejection for extracting a [`Session`] outside of a [`SessionManager`].
///
/// [`SessionManager`]: crate::SessionManager
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("no session in request extensions; is the `SessionManagerLayer` installed?")]
pub struct MissingSession;

impl IntoResponse for MissingSession
{
	fn into_response(self) -> Response
	{
		problem(StatusCode::INTERNAL_SERVER_ERROR, &self)
	}
}

impl<S> FromRequestParts<S> for Session
where
	S: Send + Sync,
{
	type Rejection = MissingSession;

	async fn from_request_parts(
		parts: &mut http::request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection>
	{
		parts.extensions.get::<Session>().cloned().ok_or(MissingSession)
	}
}

impl<StoreError, ServiceError> IntoResponse for SessionManagerError<StoreError, ServiceError>
where
	StoreError: std::error::Error + 'static,
	ServiceError: std::error::Error + IntoResponse + 'static,
{
	fn into_response(self) -> Response
	{
		match self {
			Self::Session(error @ SessionError::ConcurrentDeletion) => {
				problem(StatusCode::BAD_REQUEST, &error)
			},
			Self::Session(error) => problem(StatusCode::INTERNAL_SERVER_ERROR, &error),
			Self::Service(error) => error.into_response(),
		}
	}
}

/// Renders an `application/problem+json` response.
fn problem(status: StatusCode, error: &dyn std::error::Error) -> Response
{
	let body = serde_json::json!({
		"type": "about:blank",
		"status": status.as_u16(),
		"title": status.canonical_reason().unwrap_or("Error"),
		"detail": error.to_string(),
	});

	(status, [(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON))], body.to_string()).into_response()
}

#[cfg(test)]
mod tests
{
	use std::convert::Infallible;

	use http_body_util::BodyExt as _;

	use super::*;

	async fn body(response: Response) -> serde_json::Value
	{
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn concurrent_deletion_is_a_bad_request()
	{
		let error = SessionManagerError::<Infallible, Infallible>::Session(
			SessionError::ConcurrentDeletion,
		);
		let response = error.into_response();

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(response.headers().get(header::CONTENT_TYPE), Some(&HeaderValue::from_static(PROBLEM_JSON)));
		assert_eq!(body(response).await["status"], 400);
	}

	#[tokio::test]
	async fn missing_session_is_a_server_error()
	{
		let (mut parts, ()) = http::Request::new(()).into_parts();
		let rejection = Session::from_request_parts(&mut parts, &()).await.unwrap_err();

		assert_eq!(rejection.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
