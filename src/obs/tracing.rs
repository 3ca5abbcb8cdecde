// crates.io
use tracing::{Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::OperationKind};

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	span: Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("oneapi_core.operation", operation = kind.as_str(), stage) }
	}

	/// Creates the per-request span carrying method, URL, and correlation identifier.
	pub fn request(method: &str, url: &str, correlation_id: &str) -> Self {
		Self {
			span: tracing::info_span!(
				"oneapi_core.request",
				operation = OperationKind::Execute.as_str(),
				method,
				url,
				correlation_id,
			),
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OperationSpan::new(OperationKind::TokenRenewal, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[tokio::test]
	async fn request_span_wraps_future() {
		let span = OperationSpan::request("GET", "https://api.zsapi.net/users/7", "corr-1");

		assert_eq!(span.instrument(async { "ok" }).await, "ok");
	}
}
