//! A middleware that renders another service's errors as responses.
//!
//! [`axum`] only accepts services with `Error = Infallible`, but the session manager fails if
//! the session store does. [`InfallibleLayer`] sits on top of it and turns those errors into
//! `application/problem+json` responses.

use std::convert;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{self, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use derive_more::Constructor;
use pin_project::pin_project;

/// A layer producing the [`Infallible`] service.
#[derive(Debug, Clone, Constructor)]
pub(crate) struct InfallibleLayer {}

impl<S> tower::Layer<S> for InfallibleLayer
{
	type Service = Infallible<S>;

	fn layer(&self, inner: S) -> Self::Service
	{
		Infallible { inner }
	}
}

/// A middleware that converts another service's `Error` to a [`Response`].
#[derive(Debug, Clone)]
pub(crate) struct Infallible<S>
{
	inner: S,
}

impl<S> tower::Service<Request> for Infallible<S>
where
	S: tower::Service<Request, Response = Response>,
	S::Error: IntoResponse + fmt::Display,
{
	type Response = Response;
	type Error = convert::Infallible;
	type Future = InfallibleFuture<S::Future>;

	fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>>
	{
		assert!(task::ready!(self.inner.poll_ready(cx)).is_ok(), "axum routes are always ready");
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, request: Request) -> Self::Future
	{
		InfallibleFuture { inner: self.inner.call(request) }
	}
}

/// Future for `<Infallible<S> as tower::Service>::Future`.
#[pin_project]
pub(crate) struct InfallibleFuture<F>
{
	#[pin]
	inner: F,
}

impl<F, E> Future for InfallibleFuture<F>
where
	F: Future<Output = Result<Response, E>>,
	E: IntoResponse + fmt::Display,
{
	type Output = Result<Response, convert::Infallible>;

	fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output>
	{
		self.project().inner.poll(cx).map(|result| match result {
			Ok(response) => Ok(response),
			Err(error) => {
				tracing::debug!(%error, "rendering error response");
				Ok(error.into_response())
			},
		})
	}
}
