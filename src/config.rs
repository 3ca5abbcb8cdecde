//! Explicit client configuration threaded through every component.
//!
//! A [`ClientConfig`] is assembled once (by hand through [`ClientConfigBuilder`] or from the
//! process environment via [`ClientConfig::from_env`]) and handed to the client at
//! construction. Nothing in the crate reads ambient globals after that point.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{Cloud, Credentials},
	cache::CacheSettings,
	rate_limit::RateLimitSettings,
	retry::RetryPolicy,
};

/// Environment variable carrying the client identifier.
pub const ENV_CLIENT_ID: &str = "ZSCALER_CLIENT_ID";
/// Environment variable carrying the shared client secret.
pub const ENV_CLIENT_SECRET: &str = "ZSCALER_CLIENT_SECRET";
/// Environment variable carrying the private key (inline PEM or a file path).
pub const ENV_PRIVATE_KEY: &str = "ZSCALER_PRIVATE_KEY";
/// Environment variable carrying the vanity domain.
pub const ENV_VANITY_DOMAIN: &str = "ZSCALER_VANITY_DOMAIN";
/// Environment variable carrying the cloud selector.
pub const ENV_CLOUD: &str = "ZSCALER_CLOUD";
/// Environment variable carrying the process-wide tenant scope.
pub const ENV_TENANT_SCOPE: &str = "ZPA_MICROTENANT_ID";
/// Environment variable that disables the response cache when set to `true`.
pub const ENV_CACHE_DISABLED: &str = "ZSCALER_SDK_CACHE_DISABLED";

/// Default audience requested from the token endpoint.
pub const DEFAULT_AUDIENCE: &str = "https://api.zscaler.com";
/// Default query parameter used for tenant scoping.
pub const DEFAULT_TENANT_PARAM: &str = "microtenantId";

/// Selects how relative request paths resolve to absolute URLs.
///
/// The dialect is fixed when the client is built; the executor never re-inspects
/// configuration flags per call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ApiDialect {
	/// Unified gateway: paths are appended verbatim to the cloud API base.
	#[default]
	OneApi,
	/// Product-specific legacy host: `strip_prefix` is removed from each path before it is
	/// joined onto `base_url`.
	Legacy {
		/// Legacy product base URL.
		base_url: Url,
		/// Gateway prefix removed from incoming paths (for example `/zia`).
		strip_prefix: String,
	},
}

/// Fully resolved client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Credential material and identity hints.
	pub credentials: Credentials,
	/// Path resolution dialect.
	pub dialect: ApiDialect,
	/// Explicit API base overriding the cloud-derived default.
	pub api_base: Option<Url>,
	/// Explicit token endpoint overriding the vanity-derived default.
	pub token_endpoint: Option<Url>,
	/// Extra user agent suffix appended to the crate identifier.
	pub user_agent_extra: Option<String>,
	/// Retry/backoff bounds.
	pub retry: RetryPolicy,
	/// Per-method-class request budgets.
	pub rate_limits: RateLimitSettings,
	/// Response cache settings.
	pub cache: CacheSettings,
	/// Process-wide tenant scope injected when a request carries none.
	pub tenant_scope: Option<String>,
	/// Query parameter name used for tenant scoping.
	pub tenant_param: String,
	/// Tokens are treated as expired this long before their recorded expiry, and the
	/// renewal task fires this long ahead of it.
	pub expiry_margin: Duration,
	/// Delay before the renewal task retries after a failed renewal.
	pub renewal_retry: StdDuration,
	/// Per-request transport timeout.
	pub request_timeout: StdDuration,
	/// Page size used by paginated reads.
	pub page_size: u32,
	/// Extra substrings redacted from logged payloads.
	pub redactions: Vec<String>,
	/// Spawns token renewal and cache sweep tasks when a Tokio runtime is available.
	pub background_tasks: bool,
}
impl ClientConfig {
	/// Default token expiry margin.
	pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);
	/// Default page size for paginated reads.
	pub const DEFAULT_PAGE_SIZE: u32 = 1_000;
	/// Default delay before retrying a failed background renewal.
	pub const DEFAULT_RENEWAL_RETRY: StdDuration = StdDuration::from_secs(30);
	/// Default per-request transport timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(240);

	/// Starts a builder for the provided credentials.
	pub fn builder(credentials: Credentials) -> ClientConfigBuilder {
		ClientConfigBuilder::new(credentials)
	}

	/// Reads credentials, cloud, tenant scope, and the cache switch from the process
	/// environment. Missing credential variables surface as a credential error on first use.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Same as [`ClientConfig::from_env`] but reads values through `lookup`.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let read = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
		let mut credentials = Credentials::new(read(ENV_CLIENT_ID).unwrap_or_default())
			.with_vanity_domain(read(ENV_VANITY_DOMAIN).unwrap_or_default());

		if let Some(cloud) = read(ENV_CLOUD) {
			credentials = credentials.with_cloud(Cloud::from_selector(&cloud));
		}
		if let Some(secret) = read(ENV_CLIENT_SECRET) {
			credentials = credentials.with_client_secret(secret);
		}
		if let Some(key) = read(ENV_PRIVATE_KEY) {
			credentials = credentials.with_private_key(key);
		}

		let cache_disabled =
			read(ENV_CACHE_DISABLED).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
		let mut builder = Self::builder(credentials);

		if let Some(tenant) = read(ENV_TENANT_SCOPE) {
			builder = builder.tenant_scope(tenant);
		}
		if cache_disabled {
			builder = builder.cache(CacheSettings::disabled());
		}

		builder.build()
	}

	/// Returns the API base the executor resolves OneAPI paths against.
	pub fn resolved_api_base(&self) -> Result<Url> {
		if let Some(base) = &self.api_base {
			return Ok(base.clone());
		}

		let raw = self.credentials.cloud.api_base();

		Url::parse(&raw)
			.map_err(|source| crate::error::ConfigError::InvalidUrl { url: raw, source }.into())
	}

	/// Returns the user agent sent with every request.
	pub fn user_agent(&self) -> String {
		let base = concat!("oneapi-core/", env!("CARGO_PKG_VERSION"));

		match &self.user_agent_extra {
			Some(extra) => format!("{base} {extra}"),
			None => base.to_owned(),
		}
	}
}

/// Consuming builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	fn new(credentials: Credentials) -> Self {
		Self {
			config: ClientConfig {
				credentials,
				dialect: ApiDialect::default(),
				api_base: None,
				token_endpoint: None,
				user_agent_extra: None,
				retry: RetryPolicy::default(),
				rate_limits: RateLimitSettings::default(),
				cache: CacheSettings::default(),
				tenant_scope: None,
				tenant_param: DEFAULT_TENANT_PARAM.into(),
				expiry_margin: ClientConfig::DEFAULT_EXPIRY_MARGIN,
				renewal_retry: ClientConfig::DEFAULT_RENEWAL_RETRY,
				request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
				page_size: ClientConfig::DEFAULT_PAGE_SIZE,
				redactions: Vec::new(),
				background_tasks: true,
			},
		}
	}

	/// Selects the path resolution dialect.
	pub fn dialect(mut self, dialect: ApiDialect) -> Self {
		self.config.dialect = dialect;

		self
	}

	/// Overrides the cloud-derived API base.
	pub fn api_base(mut self, url: Url) -> Self {
		self.config.api_base = Some(url);

		self
	}

	/// Overrides the vanity-derived token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.config.token_endpoint = Some(url);

		self
	}

	/// Appends a product identifier to the user agent.
	pub fn user_agent_extra(mut self, extra: impl Into<String>) -> Self {
		self.config.user_agent_extra = Some(extra.into());

		self
	}

	/// Replaces the retry policy.
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.config.retry = policy;

		self
	}

	/// Replaces the rate limit budgets.
	pub fn rate_limits(mut self, settings: RateLimitSettings) -> Self {
		self.config.rate_limits = settings;

		self
	}

	/// Replaces the cache settings.
	pub fn cache(mut self, settings: CacheSettings) -> Self {
		self.config.cache = settings;

		self
	}

	/// Sets the process-wide tenant scope.
	pub fn tenant_scope(mut self, tenant: impl Into<String>) -> Self {
		self.config.tenant_scope = Some(tenant.into());

		self
	}

	/// Overrides the tenant scoping query parameter name.
	pub fn tenant_param(mut self, name: impl Into<String>) -> Self {
		self.config.tenant_param = name.into();

		self
	}

	/// Overrides the token expiry margin (negative values clamp to zero).
	pub fn expiry_margin(mut self, margin: Duration) -> Self {
		self.config.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the delay before a failed background renewal is retried.
	pub fn renewal_retry(mut self, delay: StdDuration) -> Self {
		self.config.renewal_retry = delay;

		self
	}

	/// Overrides the per-request transport timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.config.request_timeout = timeout;

		self
	}

	/// Overrides the page size used by paginated reads (zero clamps to one).
	pub fn page_size(mut self, size: u32) -> Self {
		self.config.page_size = size.max(1);

		self
	}

	/// Adds a substring that must never appear in logs.
	pub fn redact(mut self, sensitive: impl Into<String>) -> Self {
		let sensitive = sensitive.into();

		if !sensitive.is_empty() {
			self.config.redactions.push(sensitive);
		}

		self
	}

	/// Enables or disables the background renewal and sweep tasks.
	pub fn background_tasks(mut self, enabled: bool) -> Self {
		self.config.background_tasks = enabled;

		self
	}

	/// Finalizes the configuration.
	pub fn build(self) -> ClientConfig {
		self.config
	}
}
