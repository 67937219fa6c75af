//! Per-request spans and logs, built on [`tower_http::trace`].

use std::time::Duration;

use http::{Request, Response, header};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::{
	DefaultOnBodyChunk,
	DefaultOnEos,
	HttpMakeClassifier,
	MakeSpan,
	OnFailure,
	OnRequest,
	OnResponse,
	TraceLayer,
};

pub(crate) fn layer<ReqBody, ResBody>(
	include_headers: bool,
) -> TraceLayer<
	HttpMakeClassifier,
	impl MakeSpan<ReqBody> + Clone,
	impl OnRequest<ReqBody> + Clone,
	impl OnResponse<ResBody> + Clone,
	DefaultOnBodyChunk,
	DefaultOnEos,
	impl OnFailure<ServerErrorsFailureClass> + Clone,
>
{
	TraceLayer::new_for_http()
		.make_span_with(make_span::<ReqBody>)
		.on_request(move |req: &Request<ReqBody>, span: &tracing::Span| {
			on_request(req, span, include_headers)
		})
		.on_response(move |res: &Response<ResBody>, latency: Duration, span: &tracing::Span| {
			on_response(res, latency, span, include_headers)
		})
		.on_failure(on_failure)
}

fn make_span<B>(_: &Request<B>) -> tracing::Span
{
	tracing::info_span!(
		target: "host_sessions::http",
		"request",
		req.method = tracing::field::Empty,
		req.uri = tracing::field::Empty,
		req.host = tracing::field::Empty,
		req.headers = tracing::field::Empty,
		res.status = tracing::field::Empty,
		res.headers = tracing::field::Empty,
	)
}

fn on_request<B>(req: &Request<B>, span: &tracing::Span, include_headers: bool)
{
	span.record("req.method", tracing::field::debug(req.method()));
	span.record("req.uri", tracing::field::display(req.uri()));

	if let Some(host) = req.headers().get(header::HOST).and_then(|host| host.to_str().ok()) {
		span.record("req.host", host);
	}

	if include_headers {
		span.record("req.headers", tracing::field::debug(req.headers()));
	}

	tracing::info!(target: "host_sessions::http", "starting to process request");
}

fn on_response<B>(res: &Response<B>, latency: Duration, span: &tracing::Span, include_headers: bool)
{
	span.record("res.status", res.status().as_u16());

	if include_headers {
		span.record("res.headers", tracing::field::debug(res.headers()));
	}

	tracing::info!(target: "host_sessions::http", ?latency, "finished processing request");
}

fn on_failure(failure_class: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span)
{
	match failure_class {
		ServerErrorsFailureClass::StatusCode(status) => {
			tracing::error!(
				target: "host_sessions::http",
				status = status.as_u16(),
				?latency,
				"failed to handle request",
			);
		},
		ServerErrorsFailureClass::Error(error) => {
			tracing::error!(target: "host_sessions::http", error, ?latency, "failed to handle request");
		},
	}
}
