//! Resilient authenticated request execution for OneAPI-style REST services: token lifecycle,
//! method-class rate budgets, retry/backoff, and coherent response caching in one crate.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod auth;
pub mod authenticator;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod tasks;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderName, HeaderValue, StatusCode},
	};
	// self
	use crate::{
		client::Client,
		config::ClientConfig,
		http::{ApiHttpClient, ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
		oauth::{ReqwestTransportErrorMapper, TransportErrorMapper},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = Client<ReqwestHttpClient, ReqwestTransportErrorMapper>;
	/// Client type alias used by scripted-transport tests.
	pub type ScriptedTestClient = Client<ScriptedHttpClient, ScriptedTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`Client`] backed by the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(config: ClientConfig) -> ReqwestTestClient {
		Client::with_http_client(config, test_reqwest_http_client(), ReqwestTransportErrorMapper)
			.expect("Failed to build reqwest-backed test client.")
	}

	/// Constructs a [`Client`] backed by a scripted in-memory transport.
	pub fn build_scripted_test_client(
		config: ClientConfig,
		transport: ScriptedHttpClient,
	) -> ScriptedTestClient {
		Client::with_http_client(config, transport, ScriptedTransportErrorMapper)
			.expect("Failed to build scripted test client.")
	}

	/// Canned response (or transport failure) replayed by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// HTTP response with status, headers, and body.
		Response {
			/// Status code.
			status: u16,
			/// Response headers.
			headers: Vec<(String, String)>,
			/// Response body.
			body: String,
		},
		/// Simulated connection failure.
		ConnectionReset,
	}
	impl ScriptedReply {
		/// JSON response with the provided status.
		pub fn json(status: u16, body: impl Into<String>) -> Self {
			Self::Response {
				status,
				headers: vec![("content-type".into(), "application/json".into())],
				body: body.into(),
			}
		}

		/// Standard token endpoint success payload.
		pub fn token(access_token: &str, expires_in: u64) -> Self {
			Self::json(
				200,
				format!(
					"{{\"token_type\":\"Bearer\",\"access_token\":\"{access_token}\",\"expires_in\":{expires_in}}}"
				),
			)
		}

		/// Adds a header to a response reply.
		pub fn with_header(mut self, name: &str, value: &str) -> Self {
			if let Self::Response { headers, .. } = &mut self {
				headers.push((name.into(), value.into()));
			}

			self
		}
	}

	/// Request captured by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Full request URI.
		pub uri: String,
		/// Authorization header value, if any.
		pub authorization: Option<String>,
		/// Content-Type header value, if any.
		pub content_type: Option<String>,
		/// Request body decoded as UTF-8.
		pub body: String,
	}

	#[derive(Debug, Default)]
	struct Script {
		token_replies: VecDeque<ScriptedReply>,
		data_replies: VecDeque<ScriptedReply>,
		requests: Vec<RecordedRequest>,
	}

	/// In-memory transport replaying queued replies; token endpoint calls (paths ending in
	/// `/oauth2/v1/token`) draw from a separate queue so data scripts stay readable.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedHttpClient(Arc<Mutex<Script>>);
	impl ScriptedHttpClient {
		/// Queues a token endpoint reply.
		pub fn push_token(&self, reply: ScriptedReply) -> &Self {
			self.0.lock().token_replies.push_back(reply);

			self
		}

		/// Queues a data endpoint reply.
		pub fn push(&self, reply: ScriptedReply) -> &Self {
			self.0.lock().data_replies.push_back(reply);

			self
		}

		/// Returns every recorded request.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.0.lock().requests.clone()
		}

		/// Returns recorded data endpoint requests.
		pub fn data_requests(&self) -> Vec<RecordedRequest> {
			self.requests().into_iter().filter(|r| !is_token_uri(&r.uri)).collect()
		}

		/// Returns recorded token endpoint requests.
		pub fn token_requests(&self) -> Vec<RecordedRequest> {
			self.requests().into_iter().filter(|r| is_token_uri(&r.uri)).collect()
		}

		fn reply(&self, request: &HttpRequest) -> ScriptedReply {
			let uri = request.uri().to_string();
			let header = |name| {
				request.headers().get(name).and_then(|v| v.to_str().ok()).map(ToOwned::to_owned)
			};
			let recorded = RecordedRequest {
				method: request.method().to_string(),
				uri: uri.clone(),
				authorization: header("authorization"),
				content_type: header("content-type"),
				body: String::from_utf8_lossy(request.body()).into_owned(),
			};
			let mut script = self.0.lock();

			script.requests.push(recorded);

			let queue =
				if is_token_uri(&uri) { &mut script.token_replies } else { &mut script.data_replies };

			queue.pop_front().unwrap_or_else(|| ScriptedReply::json(599, "{\"id\":\"script.exhausted\"}"))
		}
	}
	impl ApiHttpClient for ScriptedHttpClient {
		type Handle = ScriptedHandle;
		type TransportError = std::io::Error;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			ScriptedHandle { client: self.clone(), slot }
		}
	}

	/// Handle returned by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct ScriptedHandle {
		client: ScriptedHttpClient,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<std::io::Error>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			Box::pin(async move {
				self.slot.take();
				// Let concurrent callers interleave the way a real network round trip would.
				tokio::task::yield_now().await;

				match self.client.reply(&request) {
					ScriptedReply::Response { status, headers, body } => {
						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() =
							StatusCode::from_u16(status).map_err(|e| HttpClientError::Other(e.to_string()))?;

						for (name, value) in headers {
							let name = HeaderName::from_bytes(name.as_bytes())
								.map_err(|e| HttpClientError::Other(e.to_string()))?;
							let value = HeaderValue::from_str(&value)
								.map_err(|e| HttpClientError::Other(e.to_string()))?;

							response.headers_mut().append(name, value);
						}

						self.slot.store(ResponseMetadata::from_response(&response));

						Ok(response)
					},
					ScriptedReply::ConnectionReset => Err(HttpClientError::Io(std::io::Error::new(
						std::io::ErrorKind::ConnectionReset,
						"scripted connection reset",
					))),
				}
			})
		}
	}

	/// Mapper for the scripted transport's `std::io::Error` failures.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedTransportErrorMapper;
	impl TransportErrorMapper<std::io::Error> for ScriptedTransportErrorMapper {
		fn map_transport_error(
			&self,
			_metadata: Option<&ResponseMetadata>,
			error: HttpClientError<std::io::Error>,
		) -> crate::error::TransportError {
			match error {
				HttpClientError::Reqwest(inner) => crate::error::TransportError::Io(*inner),
				HttpClientError::Io(inner) => crate::error::TransportError::Io(inner),
				HttpClientError::Http(inner) => crate::error::TransportError::request(inner),
				other => crate::error::TransportError::network(std::io::Error::other(other.to_string())),
			}
		}
	}

	fn is_token_uri(uri: &str) -> bool {
		uri.ends_with("/oauth2/v1/token")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
