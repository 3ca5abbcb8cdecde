//! Client-level error types shared by the authenticator, executor, and transport layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Client credentials are missing or malformed.
	#[error(transparent)]
	Credential(#[from] CredentialError),
	/// Token endpoint rejected the exchange or returned an unusable body.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Data endpoint returned a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Successful response body could not be decoded into the destination type.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Caller cancelled the operation.
	#[error("Operation was cancelled by the caller.")]
	Cancelled,
	/// Caller-supplied deadline elapsed before the operation completed.
	#[error("Operation deadline elapsed.")]
	DeadlineExceeded,
}
impl Error {
	/// Returns the HTTP status carried by the error, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(e) => Some(e.status),
			Self::Authentication(AuthenticationError::Rejected { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns the API error payload when the failure came from a data endpoint.
	pub fn as_api(&self) -> Option<&ApiError> {
		match self {
			Self::Api(e) => Some(e),
			_ => None,
		}
	}
}

/// Missing or malformed client credentials; raised before any network call.
#[derive(Clone, Debug, ThisError)]
pub enum CredentialError {
	/// No client identifier was configured.
	#[error("Client identifier is missing.")]
	MissingClientId,
	/// Neither a client secret nor a private key was configured.
	#[error("Neither a client secret nor a private key is configured.")]
	MissingSecret,
	/// Vanity domain is required to derive the token endpoint.
	#[error("Vanity domain is missing.")]
	MissingVanityDomain,
	/// Private key file could not be read.
	#[error("Private key file `{path}` could not be read.")]
	UnreadablePrivateKey {
		/// Path that failed to load.
		path: String,
		/// Underlying I/O failure.
		#[source]
		source: Arc<std::io::Error>,
	},
	/// Private key material is not a valid RSA PEM or could not sign the assertion.
	#[error("Private key is malformed.")]
	MalformedPrivateKey {
		/// Underlying key parsing or signing failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
	/// Derived token endpoint is not a valid URL.
	#[error("Token endpoint `{endpoint}` is not a valid URL.")]
	InvalidTokenEndpoint {
		/// Rendered endpoint string.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Token endpoint failures; never retried by the authenticator itself.
#[derive(Clone, Debug, ThisError)]
pub enum AuthenticationError {
	/// Token endpoint answered with a non-success status.
	#[error("Token endpoint rejected the request with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
	},
	/// Token endpoint answered successfully but the body could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Token endpoint returned a structurally valid but unusable token.
	#[error("Token endpoint returned an unusable token: {reason}.")]
	InvalidToken {
		/// Short description of the defect.
		reason: &'static str,
	},
	/// Token endpoint responded in a way the OAuth client could not interpret.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Unexpected {
		/// Client-supplied message summarizing the failure.
		message: String,
	},
	/// Token endpoint could not be reached.
	#[error("Token endpoint could not be reached.")]
	Transport {
		/// Underlying transport failure.
		#[source]
		source: Arc<TransportError>,
	},
}

/// Transport-level failures (network, timeout, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured transport timeout.
	#[error("Request to the remote endpoint timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote endpoint.")]
	Io(#[from] std::io::Error),
	/// Outgoing request could not be assembled by the HTTP client.
	#[error("HTTP request could not be constructed.")]
	Request {
		/// Transport-specific construction error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a request construction failure.
	pub fn request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Request { source: Box::new(src) }
	}

	/// Returns `true` when the failure is worth another attempt.
	pub fn is_transient(&self) -> bool {
		!matches!(self, Self::Request { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::request(e)
		} else if e.is_timeout() {
			Self::timeout(e)
		} else {
			Self::network(e)
		}
	}
}

/// Non-success response from a data endpoint.
#[derive(Clone, Debug, ThisError)]
#[error("{method} {url} failed with status {status} (correlation id {correlation_id}).")]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: String,
	/// HTTP method of the failing request.
	pub method: String,
	/// Fully resolved request URL.
	pub url: String,
	/// Correlation identifier attached to the request logs.
	pub correlation_id: String,
	/// Vendor error identifier parsed from the body, when present.
	pub error_id: Option<String>,
}

/// Local configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Resolved request URL is invalid.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// Rendered URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP method string is not a valid token.
	#[error("HTTP method `{method}` is invalid.")]
	InvalidMethod {
		/// Offending method string.
		method: String,
	},
	/// Query options could not be flattened into parameters.
	#[error("Query options must serialize to a flat object: {reason}.")]
	InvalidOptions {
		/// Short description of the defect.
		reason: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodyEncode(#[from] serde_json::Error),
	/// Header value contains characters that cannot be sent.
	#[error("Header `{name}` carries an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Successful response body could not be decoded.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Body is not valid JSON.
	#[error("Response body is not valid JSON.")]
	Json(#[source] serde_json::Error),
	/// Body is JSON but does not match the destination type.
	#[error("Response body does not match the destination type at `{}`.", .0.path())]
	Shape(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// Endpoint answered with content where none was expected.
	#[error("Expected an empty response body, received `{body}`.")]
	UnexpectedBody {
		/// Raw response body.
		body: String,
	},
}

/// Response cache construction or operation failure; logged, never surfaced.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CacheError {
	/// Entry time-to-live must be positive.
	#[error("Cache time-to-live must be positive.")]
	ZeroTtl,
	/// Sweep interval must be positive.
	#[error("Cache sweep interval must be positive.")]
	ZeroSweepInterval,
	/// Cache capacity must be positive.
	#[error("Cache capacity must be positive.")]
	ZeroCapacity,
}

/// Failure shared with every caller that waited on the same token fetch.
#[derive(Clone, Debug, ThisError)]
pub(crate) enum AuthFailure {
	#[error(transparent)]
	Credential(#[from] CredentialError),
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
}
impl From<AuthFailure> for Error {
	fn from(e: AuthFailure) -> Self {
		match e {
			AuthFailure::Credential(e) => Self::Credential(e),
			AuthFailure::Authentication(e) => Self::Authentication(e),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn shared_auth_failures_convert_without_losing_variant() {
		let failure = AuthFailure::from(AuthenticationError::Rejected {
			status: 401,
			body: "{\"error\":\"invalid_client\"}".into(),
		});
		let first: Error = failure.clone().into();
		let second: Error = failure.into();

		assert_eq!(first.status(), Some(401));
		assert_eq!(second.status(), Some(401));

		let credential: Error = AuthFailure::from(CredentialError::MissingSecret).into();

		assert!(matches!(credential, Error::Credential(CredentialError::MissingSecret)));
	}

	#[test]
	fn request_construction_failures_are_not_transient() {
		let io = TransportError::Io(std::io::Error::other("reset"));
		let build = TransportError::request(std::io::Error::other("bad header"));

		assert!(io.is_transient());
		assert!(!build.is_transient());
	}
}
