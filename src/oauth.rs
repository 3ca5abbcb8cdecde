//! Token endpoint facade built on the `oauth2` client-credentials exchange.
//!
//! Both supported grants are expressed as a `client_credentials` request: the shared-secret
//! grant authenticates with `client_id` + `client_secret` in the form body, while the
//! private-key grant omits the secret and attaches a signed `client_assertion`. The target
//! `audience` rides along as an extra form parameter in both cases.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthToken, CLIENT_ASSERTION_TYPE, ClientAuth, Credentials, sign_assertion},
	error::{AuthFailure, AuthenticationError, TransportError},
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthFailure>> + 'a + Send>>;

/// Maps HTTP transport failures into [`TransportError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> TransportError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_metadata: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> TransportError {
		match err {
			HttpClientError::Reqwest(inner) => TransportError::from(*inner),
			HttpClientError::Http(inner) => TransportError::request(inner),
			HttpClientError::Io(inner) => TransportError::Io(inner),
			HttpClientError::Other(message) => TransportError::network(std::io::Error::other(message)),
			_ => TransportError::network(std::io::Error::other("unrecognized transport failure")),
		}
	}
}

/// One-shot token exchange configured for a specific credential set.
pub(crate) struct TokenFacade<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	extra_params: Vec<(&'static str, String)>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenFacade<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validates credentials and prepares the grant; no network traffic happens here.
	pub(crate) fn for_credentials(
		credentials: &Credentials,
		token_endpoint: Option<&Url>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		now: OffsetDateTime,
	) -> Result<Self, AuthFailure> {
		let auth = credentials.validate()?;
		let token_url = TokenUrl::from_url(credentials.token_endpoint(token_endpoint)?);
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);
		let mut extra_params = vec![("audience", credentials.audience.clone())];

		match auth {
			ClientAuth::Secret(secret) => {
				oauth_client =
					oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
			},
			ClientAuth::PrivateKey(key) => {
				let pem = key.load()?;
				let assertion =
					sign_assertion(&credentials.client_id, &credentials.audience, &pem, now)?;

				extra_params.push(("client_assertion", assertion));
				extra_params.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.into()));
			},
		}

		Ok(Self { oauth_client, extra_params, http_client, error_mapper })
	}

	/// Performs the exchange and converts the response into an [`AuthToken`].
	pub(crate) fn request_token(&self) -> FacadeFuture<'_, AuthToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for (key, value) in &self.extra_params {
				request = request.add_extra_param(*key, value.as_str());
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

			map_token_response(response, OffsetDateTime::now_utc()).map_err(AuthFailure::from)
		})
	}

	#[cfg(test)]
	fn extra_param(&self, name: &str) -> Option<&str> {
		self.extra_params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
	}
}

fn map_token_response(
	response: FacadeTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<AuthToken, AuthenticationError> {
	let expires_in = response
		.expires_in()
		.ok_or(AuthenticationError::InvalidToken { reason: "missing expires_in" })?
		.as_secs();
	let expires_in = i64::try_from(expires_in)
		.map_err(|_| AuthenticationError::InvalidToken { reason: "expires_in out of range" })?;

	if expires_in <= 0 {
		return Err(AuthenticationError::InvalidToken { reason: "non-positive expires_in" });
	}
	if response.access_token().secret().is_empty() {
		return Err(AuthenticationError::InvalidToken { reason: "empty access_token" });
	}

	Ok(AuthToken::new(
		response.token_type().as_ref(),
		response.access_token().secret().to_owned(),
		issued_at,
		Duration::seconds(expires_in),
	))
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> AuthFailure
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|m| m.status);
	let rejected = status.filter(|s| !(200..300).contains(s));
	let error = match err {
		RequestTokenError::ServerResponse(response) => AuthenticationError::Rejected {
			// RFC 6749 error responses default to 400.
			status: rejected.unwrap_or(400),
			body: serde_json::to_string(&response)
				.unwrap_or_else(|_| response.error().as_ref().to_owned()),
		},
		RequestTokenError::Request(error) => AuthenticationError::Transport {
			source: Arc::new(mapper.map_transport_error(meta.as_ref(), error)),
		},
		RequestTokenError::Parse(source, body) => match rejected {
			Some(status) =>
				AuthenticationError::Rejected { status, body: String::from_utf8_lossy(&body).into() },
			None => AuthenticationError::MalformedResponse { status, source: Arc::new(source) },
		},
		RequestTokenError::Other(message) => match rejected {
			Some(status) => AuthenticationError::Rejected { status, body: message },
			None => AuthenticationError::Unexpected { message },
		},
	};

	error.into()
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{error::CredentialError, http::ReqwestHttpClient};

	const PRIVATE_KEY: &str = include_str!("../tests/fixtures/assertion_rsa.pem");

	fn facade(
		credentials: &Credentials,
	) -> Result<TokenFacade<ReqwestHttpClient, ReqwestTransportErrorMapper>, AuthFailure> {
		TokenFacade::for_credentials(
			credentials,
			None,
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
			OffsetDateTime::now_utc(),
		)
	}

	#[test]
	fn shared_secret_grant_sends_audience_only() {
		let credentials =
			Credentials::new("client").with_client_secret("secret").with_vanity_domain("acme");
		let facade = facade(&credentials).expect("Shared-secret facade should build.");

		assert_eq!(facade.extra_param("audience"), Some("https://api.zscaler.com"));
		assert_eq!(facade.extra_param("client_assertion"), None);
	}

	#[test]
	fn private_key_grant_attaches_signed_assertion() {
		let credentials =
			Credentials::new("client").with_private_key(PRIVATE_KEY).with_vanity_domain("acme");
		let facade = facade(&credentials).expect("Private-key facade should build.");

		assert_eq!(facade.extra_param("client_assertion_type"), Some(CLIENT_ASSERTION_TYPE));
		assert_eq!(
			facade.extra_param("client_assertion").map(|jwt| jwt.split('.').count()),
			Some(3)
		);
	}

	#[test]
	fn missing_material_fails_before_any_request() {
		let no_secret = Credentials::new("client").with_vanity_domain("acme");
		let no_vanity = Credentials::new("client").with_client_secret("secret");

		assert!(matches!(
			facade(&no_secret),
			Err(AuthFailure::Credential(CredentialError::MissingSecret))
		));
		assert!(matches!(
			facade(&no_vanity),
			Err(AuthFailure::Credential(CredentialError::MissingVanityDomain))
		));
	}

	#[test]
	fn token_response_rejects_non_positive_lifetimes() {
		let response: FacadeTokenResponse = serde_json::from_str(
			"{\"access_token\":\"a\",\"token_type\":\"Bearer\",\"expires_in\":0}",
		)
		.expect("Fixture token response should parse.");

		assert!(matches!(
			map_token_response(response, OffsetDateTime::now_utc()),
			Err(AuthenticationError::InvalidToken { .. })
		));
	}
}
