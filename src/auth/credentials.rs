//! Client credentials and the cloud selector that derives endpoint hosts.

// std
use std::fs;
// self
use crate::{_prelude::*, auth::TokenSecret, config::DEFAULT_AUDIENCE, error::CredentialError};

/// Deployment environment that determines API and token hosts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cloud {
	/// Production environment.
	#[default]
	Production,
	/// Any other named environment (stored lowercase).
	Named(String),
}
impl Cloud {
	/// Parses a selector string; empty or `production` (any case) selects production.
	pub fn from_selector(selector: &str) -> Self {
		let selector = selector.trim().to_ascii_lowercase();

		if selector.is_empty() || selector == "production" {
			Self::Production
		} else {
			Self::Named(selector)
		}
	}

	/// Returns the unified API base for this cloud.
	pub fn api_base(&self) -> String {
		match self {
			Self::Production => "https://api.zsapi.net".into(),
			Self::Named(name) => format!("https://api.{name}.zsapi.net"),
		}
	}

	/// Returns the token endpoint for the provided vanity domain.
	pub fn token_endpoint(&self, vanity_domain: &str) -> String {
		match self {
			Self::Production => format!("https://{vanity_domain}.zslogin.net/oauth2/v1/token"),
			Self::Named(name) =>
				format!("https://{vanity_domain}.zslogin{name}.net/oauth2/v1/token"),
		}
	}
}
impl Display for Cloud {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Production => f.write_str("production"),
			Self::Named(name) => f.write_str(name),
		}
	}
}

/// Private key reference: inline PEM contents or a path to a PEM file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKey(TokenSecret);
impl PrivateKey {
	/// Wraps inline PEM contents or a filesystem path.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}

	/// Resolves the PEM contents, reading from disk when the value is a path.
	pub fn load(&self) -> Result<String, CredentialError> {
		let value = self.0.expose().trim();

		if value.contains("-----BEGIN") {
			return Ok(value.to_owned());
		}

		fs::read_to_string(value).map_err(|e| CredentialError::UnreadablePrivateKey {
			path: value.to_owned(),
			source: Arc::new(e),
		})
	}
}

/// Secret material proving the client's identity to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientAuth {
	/// Shared-secret grant.
	Secret(TokenSecret),
	/// Signed-assertion grant.
	PrivateKey(PrivateKey),
}

/// Immutable client credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// Configured secret material; the last one set wins.
	pub auth: Option<ClientAuth>,
	/// Customer-specific authentication subdomain.
	pub vanity_domain: String,
	/// Deployment environment.
	pub cloud: Cloud,
	/// Audience requested for issued tokens.
	pub audience: String,
}
impl Credentials {
	/// Creates credentials for the provided client identifier.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			auth: None,
			vanity_domain: String::new(),
			cloud: Cloud::Production,
			audience: DEFAULT_AUDIENCE.into(),
		}
	}

	/// Selects the shared-secret grant.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.auth = Some(ClientAuth::Secret(TokenSecret::new(secret)));

		self
	}

	/// Selects the private-key grant (inline PEM or a path to a PEM file).
	pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
		self.auth = Some(ClientAuth::PrivateKey(PrivateKey::new(key)));

		self
	}

	/// Sets the vanity domain.
	pub fn with_vanity_domain(mut self, vanity_domain: impl Into<String>) -> Self {
		self.vanity_domain = vanity_domain.into();

		self
	}

	/// Sets the cloud selector.
	pub fn with_cloud(mut self, cloud: Cloud) -> Self {
		self.cloud = cloud;

		self
	}

	/// Overrides the requested audience.
	pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = audience.into();

		self
	}

	/// Checks that an identifier and usable secret material are present.
	pub fn validate(&self) -> Result<&ClientAuth, CredentialError> {
		if self.client_id.trim().is_empty() {
			return Err(CredentialError::MissingClientId);
		}

		match &self.auth {
			Some(ClientAuth::Secret(secret)) if secret.is_blank() =>
				Err(CredentialError::MissingSecret),
			Some(ClientAuth::PrivateKey(key)) if key.0.is_blank() =>
				Err(CredentialError::MissingSecret),
			Some(auth) => Ok(auth),
			None => Err(CredentialError::MissingSecret),
		}
	}

	/// Resolves the token endpoint, preferring an explicit override.
	pub fn token_endpoint(&self, explicit: Option<&Url>) -> Result<Url, CredentialError> {
		if let Some(url) = explicit {
			return Ok(url.clone());
		}

		let vanity = self.vanity_domain.trim();

		if vanity.is_empty() {
			return Err(CredentialError::MissingVanityDomain);
		}

		let endpoint = self.cloud.token_endpoint(vanity);

		Url::parse(&endpoint)
			.map_err(|source| CredentialError::InvalidTokenEndpoint { endpoint, source })
	}

	/// Returns the shared secret when the shared-secret grant is configured.
	pub fn client_secret(&self) -> Option<&TokenSecret> {
		match &self.auth {
			Some(ClientAuth::Secret(secret)) => Some(secret),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_endpoint_follows_cloud_selector() {
		let production = Credentials::new("c").with_vanity_domain("acme");
		let beta = production.clone().with_cloud(Cloud::from_selector("Beta"));

		assert_eq!(
			production.token_endpoint(None).expect("Production endpoint should resolve.").as_str(),
			"https://acme.zslogin.net/oauth2/v1/token"
		);
		assert_eq!(
			beta.token_endpoint(None).expect("Beta endpoint should resolve.").as_str(),
			"https://acme.zsloginbeta.net/oauth2/v1/token"
		);
		assert_eq!(Cloud::from_selector(" PRODUCTION "), Cloud::Production);
	}

	#[test]
	fn token_endpoint_requires_vanity_without_override() {
		let credentials = Credentials::new("c").with_client_secret("s");
		let explicit =
			Url::parse("http://127.0.0.1:8080/oauth2/v1/token").expect("Override should parse.");

		assert!(matches!(
			credentials.token_endpoint(None),
			Err(CredentialError::MissingVanityDomain)
		));
		assert_eq!(
			credentials.token_endpoint(Some(&explicit)).expect("Override should win."),
			explicit
		);
	}

	#[test]
	fn validate_rejects_missing_material() {
		assert!(matches!(
			Credentials::new("").with_client_secret("s").validate(),
			Err(CredentialError::MissingClientId)
		));
		assert!(matches!(Credentials::new("c").validate(), Err(CredentialError::MissingSecret)));
		assert!(matches!(
			Credentials::new("c").with_client_secret("  ").validate(),
			Err(CredentialError::MissingSecret)
		));
		assert!(matches!(
			Credentials::new("c").with_client_secret("s").validate(),
			Ok(ClientAuth::Secret(_))
		));
	}

	#[test]
	fn private_key_reads_paths_and_inline_pem() {
		let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/assertion_rsa.pem");
		let from_path = PrivateKey::new(path).load().expect("Fixture key file should load.");
		let inline = PrivateKey::new(from_path.clone()).load().expect("Inline PEM should load.");

		assert!(from_path.starts_with("-----BEGIN"));
		assert_eq!(inline, from_path.trim());
		assert!(matches!(
			PrivateKey::new("/definitely/not/here.pem").load(),
			Err(CredentialError::UnreadablePrivateKey { .. })
		));
	}
}
