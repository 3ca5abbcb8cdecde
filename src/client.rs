//! Request executor: the orchestration point that resolves URLs, consults the response
//! cache, attaches bearer tokens, drives retries, and decodes responses.
//!
//! A [`Client`] is shared across concurrent callers; it carries no per-call state beyond the
//! one-shot cache bypass flag. Typed resource helpers and pagination live in the
//! `resources` child module and are thin callers of [`Client::execute`].

mod decode;
mod resources;
mod route;

pub use decode::unescape_html;

// std
use std::{
	sync::atomic::{AtomicBool, Ordering},
	time::Instant,
};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest, HttpResponse,
	http::{
		HeaderValue, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::AuthToken,
	authenticator::Authenticator,
	cache::{self, CacheEntry, CacheKey, ResponseCache},
	config::ClientConfig,
	error::{ApiError, ConfigError},
	http::{ApiHttpClient, ResponseMetadataSlot, parse_retry_after},
	oauth::TransportErrorMapper,
	obs::{self, OperationKind, OperationOutcome, OperationSpan, Redactor},
	rate_limit::RateLimiter,
	request::{CONTENT_TYPE_JSON, Interrupt, RequestDescriptor},
	retry::{self, AttemptOutcome, DefaultRetryStrategy, RetryController, RetryStrategy},
	tasks::BackgroundTasks,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};
use route::Route;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestApiClient = Client<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Shared, authenticated API client.
///
/// Owns the authenticator, response cache, retry controller, and the background renewal and
/// sweep tasks. Dropping the client stops the tasks; [`Client::shutdown`] also waits for
/// them to exit.
pub struct Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<ClientConfig>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	authenticator: Arc<Authenticator<C, M>>,
	cache: Arc<dyn ResponseCache>,
	retry: RetryController,
	route: Route,
	redactor: Redactor,
	bypass_next: AtomicBool,
	tasks: Mutex<Option<BackgroundTasks>>,
}
impl<C, M> Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	///
	/// Fails only when the API base cannot be resolved. An unusable cache configuration
	/// degrades to a no-op cache instead.
	pub fn with_http_client(
		config: ClientConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let route = Route::from_config(&config)?;
		let http_client = http_client.into();
		let error_mapper = mapper.into();
		let authenticator =
			Arc::new(Authenticator::new(&config, http_client.clone(), error_mapper.clone()));
		let cache = cache::build_cache(&config.cache);
		let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
		let retry = RetryController::new(config.retry, Arc::new(DefaultRetryStrategy), limiter);
		let mut redactor = Redactor::new(config.redactions.iter().cloned());

		if let Some(secret) = config.credentials.client_secret() {
			redactor = redactor.with(secret);
		}

		let tasks = if config.background_tasks {
			BackgroundTasks::spawn(&authenticator, &cache, &config)
		} else {
			None
		};

		Ok(Self {
			config: Arc::new(config),
			http_client,
			error_mapper,
			authenticator,
			cache,
			retry,
			route,
			redactor,
			bypass_next: AtomicBool::new(false),
			tasks: Mutex::new(tasks),
		})
	}

	/// Replaces the retry classification, e.g. to recognize product-specific error ids.
	pub fn with_retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
		self.retry = self.retry.with_strategy(strategy);

		self
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Token authenticator shared with the renewal task.
	pub fn authenticator(&self) -> &Arc<Authenticator<C, M>> {
		&self.authenticator
	}

	/// Response cache backing `GET` requests.
	pub fn cache(&self) -> &Arc<dyn ResponseCache> {
		&self.cache
	}

	/// Makes the next `GET` skip the cache, refetch, and store the fresh response.
	pub fn bypass_cache_once(&self) {
		self.bypass_next.store(true, Ordering::Release);
	}

	/// Drops every cached response.
	pub fn clear_cache(&self) {
		self.cache.clear();
	}

	/// Stops the background tasks and waits for them to exit.
	pub async fn shutdown(&self) {
		let tasks = self.tasks.lock().take();

		if let Some(tasks) = tasks {
			tasks.shutdown().await;
		}
	}

	/// Executes `descriptor` and decodes the response into `T`.
	///
	/// `GET` responses are served from and written to the cache; any other method
	/// invalidates cached reads of the same path first.
	pub async fn execute<T>(&self, descriptor: RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let body = self.send(descriptor).await?;

		Ok(decode::into_typed(decode::parse_body(&body)?)?)
	}

	/// Executes `descriptor` and returns the raw response body.
	pub(crate) async fn send(&self, descriptor: RequestDescriptor) -> Result<Vec<u8>> {
		let url = self.route.resolve(
			&descriptor,
			&self.config.tenant_param,
			self.config.tenant_scope.as_deref(),
		)?;
		let correlation_id = Uuid::new_v4().to_string();
		let span = OperationSpan::request(descriptor.method.as_str(), url.as_str(), &correlation_id);

		obs::record_operation_outcome(OperationKind::Execute, OperationOutcome::Attempt);

		let result = span.instrument(self.execute_resolved(&descriptor, url, &correlation_id)).await;

		obs::record_operation_outcome(OperationKind::Execute, OperationOutcome::of(&result));

		result
	}

	async fn execute_resolved(
		&self,
		descriptor: &RequestDescriptor,
		url: Url,
		correlation_id: &str,
	) -> Result<Vec<u8>> {
		let interrupt = descriptor.interrupt();
		let key = CacheKey::new(descriptor.method.as_str(), &url);

		interrupt.check()?;

		if descriptor.is_read() {
			if self.bypass_next.swap(false, Ordering::AcqRel) {
				tracing::debug!(key = %key, "Cache bypassed once.");

				self.cache.delete(&key);
			} else if let Some(entry) = self.cache.get(&key) {
				tracing::debug!(key = %key, "Served from cache.");

				return Ok(entry.body.clone());
			}
		} else {
			cache::invalidate(self.cache.as_ref(), &CacheKey::read(&url));
		}

		let response = self.dispatch(descriptor, &url, correlation_id, &interrupt).await?;

		if !descriptor.is_read() {
			// Reads racing the mutation may have repopulated the path.
			cache::invalidate(self.cache.as_ref(), &CacheKey::read(&url));

			return Ok(response.into_body());
		}
		// List pages and malformed bodies are never cached.
		if !decode::is_cacheable(response.body()) {
			return Ok(response.into_body());
		}

		let status = response.status().as_u16();
		let headers = header_pairs(&response);
		let body = response.into_body();

		self.cache.set(CacheEntry::new(
			key,
			status,
			headers,
			body.clone(),
			OffsetDateTime::now_utc(),
			self.config.cache.ttl,
		));

		Ok(body)
	}

	async fn dispatch(
		&self,
		descriptor: &RequestDescriptor,
		url: &Url,
		correlation_id: &str,
		interrupt: &Interrupt,
	) -> Result<HttpResponse> {
		let method = descriptor.method.as_str();
		let mut attempt = 0_u32;
		let mut reauthenticated = false;

		loop {
			let token = self.authenticator.ensure_token_with(interrupt).await?;
			let redactor = self.redactor.clone().with(&token.access_token);
			let request = self.build_request(descriptor, url, &token)?;

			tracing::debug!(attempt, body = %redactor.apply_bytes(request.body()), "Sending request.");

			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let started = Instant::now();
			let outcome = interrupt.run(handle.call(request)).await?;
			let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

			match outcome {
				Ok(response) => {
					let status = response.status().as_u16();

					tracing::info!(status, elapsed_ms, attempt, "Received response.");
					tracing::debug!(body = %redactor.apply_bytes(response.body()), "Response body.");

					if response.status().is_success() {
						return Ok(response);
					}
					if matches!(status, 401 | 403) && !reauthenticated {
						reauthenticated = true;

						self.authenticator.reauthenticate(&token, interrupt).await?;

						continue;
					}

					let error_id = retry::parse_error_id(response.body());
					let decision = self.retry.decide(
						method,
						attempt,
						&AttemptOutcome::Response { status, error_id: error_id.as_deref() },
						parse_retry_after(response.headers()),
					);

					if !decision.retry {
						return Err(ApiError {
							status,
							body: String::from_utf8_lossy(response.body()).into_owned(),
							method: method.to_owned(),
							url: url.to_string(),
							correlation_id: correlation_id.to_owned(),
							error_id,
						}
						.into());
					}

					tracing::warn!(
						status,
						error_id = error_id.as_deref(),
						attempt,
						wait_ms = u64::try_from(decision.wait.as_millis()).unwrap_or(u64::MAX),
						"Retrying request."
					);

					self.retry.pause(decision.wait, interrupt).await?;
				},
				Err(e) => {
					let error = self.error_mapper.map_transport_error(slot.take().as_ref(), e);
					let decision =
						self.retry.decide(method, attempt, &AttemptOutcome::Transport(&error), None);

					tracing::warn!(error = %error, elapsed_ms, attempt, "Transport failure.");

					if !decision.retry {
						return Err(error.into());
					}

					self.retry.pause(decision.wait, interrupt).await?;
				},
			}

			attempt += 1;
		}
	}

	fn build_request(
		&self,
		descriptor: &RequestDescriptor,
		url: &Url,
		token: &AuthToken,
	) -> Result<HttpRequest, ConfigError> {
		let body = match &descriptor.body {
			Some(body) => body.to_bytes()?,
			None => Vec::new(),
		};
		let authorization = HeaderValue::from_str(&token.authorization())
			.map_err(|_| ConfigError::InvalidHeader { name: "authorization" })?;
		let content_type = HeaderValue::from_str(descriptor.effective_content_type())
			.map_err(|_| ConfigError::InvalidHeader { name: "content-type" })?;
		let user_agent = HeaderValue::from_str(&self.config.user_agent())
			.map_err(|_| ConfigError::InvalidHeader { name: "user-agent" })?;

		Ok(Request::builder()
			.method(descriptor.method.clone())
			.uri(url.as_str())
			.header(AUTHORIZATION, authorization)
			.header(CONTENT_TYPE, content_type)
			.header(ACCEPT, CONTENT_TYPE_JSON)
			.header(USER_AGENT, user_agent)
			.body(body)?)
	}
}
#[cfg(feature = "reqwest")]
impl Client<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client with its own reqwest transport honoring the configured timeout and
	/// user agent.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::from_config(&config)?;

		Self::with_http_client(config, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("route", &self.route)
			.field("retry", &self.retry)
			.field("authenticator", &self.authenticator)
			.finish_non_exhaustive()
	}
}

fn header_pairs(response: &HttpResponse) -> Vec<(String, String)> {
	response
		.headers()
		.iter()
		.filter_map(|(name, value)| Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned())))
		.collect()
}
