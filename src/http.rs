//! Transport primitives shared by token exchanges and data requests.
//!
//! The module exposes [`ApiHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can integrate custom HTTP clients
//! without losing the client's instrumentation hooks. Implementations call
//! [`ResponseMetadataSlot::take`] before dispatching a request and
//! [`ResponseMetadataSlot::store`] once an HTTP status or retry hint is known, so the
//! retry controller and error mappers classify failures with consistent metadata.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpResponse,
	http::{HeaderMap, header::RETRY_AFTER},
};
#[cfg(feature = "reqwest")] use oauth2::HttpRequest;
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::{config::ClientConfig, error::ConfigError};

/// Abstraction over HTTP transports capable of executing token exchanges and data
/// requests while publishing response metadata to the client's instrumentation pipeline.
///
/// The trait acts as the client's only dependency on an HTTP stack. Callers provide
/// an implementation and the client requests short-lived [`AsyncHttpClient`] handles
/// that each carry a clone of a [`ResponseMetadataSlot`]. Implementations must be
/// `Send + Sync + 'static` so one transport can back the authenticator, the executor,
/// and the renewal task at once.
pub trait ApiHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	///
	/// The request future returned by [`AsyncHttpClient::call`] must be `Send` so the
	/// executor's futures can hop executors.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once an HTTP response (successful or erroneous) provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<StdDuration>,
}
impl ResponseMetadata {
	/// Extracts status and Retry-After from a received response.
	pub fn from_response(response: &HttpResponse) -> Self {
		Self {
			status: Some(response.status().as_u16()),
			retry_after: parse_retry_after(response.headers()),
		}
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client honoring the configured request timeout and user agent.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(config.request_timeout)
			.user_agent(config.user_agent())
			.build()?;

		Ok(Self(client))
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(feature = "reqwest")]
pub(crate) struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Public handle returned by [`ReqwestHttpClient`] that satisfies [`ApiHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reads a `Retry-After` hint: integer seconds, a duration string such as `1m30s` or
/// `500ms`, or an RFC 2822 HTTP date in the future.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<StdDuration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(StdDuration::from_secs(secs));
	}
	if let Some(duration) = parse_duration_string(raw) {
		return Some(duration);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return StdDuration::try_from(delta).ok();
		}
	}

	None
}

/// Parses a sequence of `<decimal><unit>` pairs (`h`, `m`, `s`, `ms`, `us`/`µs`, `ns`).
pub fn parse_duration_string(raw: &str) -> Option<StdDuration> {
	if raw.is_empty() || raw.starts_with('-') {
		return None;
	}

	let mut rest = raw.strip_prefix('+').unwrap_or(raw);
	let mut total_nanos = 0_f64;

	if rest == "0" {
		return Some(StdDuration::ZERO);
	}

	while !rest.is_empty() {
		let number_len =
			rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());

		if number_len == 0 {
			return None;
		}

		let value = rest[..number_len].parse::<f64>().ok()?;

		rest = &rest[number_len..];

		let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
		let scale = match &rest[..unit_len] {
			"h" => 3_600_000_000_000_f64,
			"m" => 60_000_000_000_f64,
			"s" => 1_000_000_000_f64,
			"ms" => 1_000_000_f64,
			"us" | "µs" | "μs" => 1_000_f64,
			"ns" => 1_f64,
			_ => return None,
		};

		rest = &rest[unit_len..];
		total_nanos += value * scale;
	}

	if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
		return None;
	}

	Some(StdDuration::from_nanos(total_nanos as u64))
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	fn headers(value: &str) -> HeaderMap {
		let mut map = HeaderMap::new();

		map.insert(RETRY_AFTER, HeaderValue::from_str(value).expect("Header value should be valid."));

		map
	}

	#[test]
	fn retry_after_accepts_integer_seconds() {
		assert_eq!(parse_retry_after(&headers("2")), Some(StdDuration::from_secs(2)));
		assert_eq!(parse_retry_after(&headers(" 0 ")), Some(StdDuration::ZERO));
	}

	#[test]
	fn retry_after_accepts_duration_strings() {
		assert_eq!(parse_retry_after(&headers("1m30s")), Some(StdDuration::from_secs(90)));
		assert_eq!(parse_retry_after(&headers("500ms")), Some(StdDuration::from_millis(500)));
		assert_eq!(parse_retry_after(&headers("1.5s")), Some(StdDuration::from_millis(1500)));
		assert_eq!(parse_retry_after(&headers("1h")), Some(StdDuration::from_secs(3600)));
	}

	#[test]
	fn retry_after_accepts_future_http_dates() {
		let future = OffsetDateTime::now_utc() + Duration::minutes(5);
		let rendered = future.format(&Rfc2822).expect("Future instant should format as RFC 2822.");
		let parsed =
			parse_retry_after(&headers(&rendered)).expect("Future HTTP date should yield a delay.");

		assert!(parsed > StdDuration::from_secs(240));
		assert!(parsed <= StdDuration::from_secs(300));
	}

	#[test]
	fn retry_after_rejects_garbage() {
		assert_eq!(parse_retry_after(&headers("soon")), None);
		assert_eq!(parse_retry_after(&headers("-5s")), None);
		assert_eq!(parse_retry_after(&headers("5x")), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}
}
