//! Token authenticator with lazy acquisition, expiry tracking, and single-flight renewal.
//!
//! The authenticator owns the only copy of the current [`AuthToken`]. Readers take cloned
//! snapshots; writers replace the whole token under a short write lock. Network fetches are
//! serialized behind an async mutex so concurrent callers that find no usable token collapse
//! into a single token endpoint exchange and all observe its result, success or failure.

// crates.io
use tokio::sync::{Notify, futures::Notified};
// self
use crate::{
	_prelude::*,
	auth::{AuthToken, Credentials},
	config::ClientConfig,
	error::AuthFailure,
	http::ApiHttpClient,
	oauth::{TokenFacade, TransportErrorMapper},
	obs::{AuthMetrics, OperationKind, OperationOutcome, OperationSpan},
	request::Interrupt,
};

#[derive(Debug, Default)]
struct TokenState {
	token: Option<AuthToken>,
	// Completed exchanges; lets waiters detect that another caller already fetched.
	fetches: u64,
	last_failure: Option<AuthFailure>,
}

/// Obtains and renews bearer tokens for one credential set.
pub struct Authenticator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	credentials: Credentials,
	token_endpoint: Option<Url>,
	margin: Duration,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	state: RwLock<TokenState>,
	singleflight: AsyncMutex<()>,
	issued: Notify,
	metrics: Arc<AuthMetrics>,
}
impl<C, M> Authenticator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an authenticator without contacting the token endpoint.
	pub fn new(
		config: &ClientConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			credentials: config.credentials.clone(),
			token_endpoint: config.token_endpoint.clone(),
			margin: config.expiry_margin,
			http_client: http_client.into(),
			error_mapper: mapper.into(),
			state: Default::default(),
			singleflight: AsyncMutex::new(()),
			issued: Notify::new(),
			metrics: Default::default(),
		}
	}

	/// Returns a usable token, contacting the token endpoint only when none is held or the
	/// held one is inside its expiry margin.
	pub async fn ensure_token(&self) -> Result<AuthToken> {
		self.ensure_token_with(&Interrupt::default()).await
	}

	/// Same as [`Authenticator::ensure_token`] but aborts on cancellation or deadline.
	pub async fn ensure_token_with(&self, interrupt: &Interrupt) -> Result<AuthToken> {
		if let Some(token) = self.usable_token() {
			return Ok(token);
		}

		self.refresh(None, interrupt).await
	}

	/// Replaces `stale` after the API rejected it.
	///
	/// When another caller already swapped the token, the newer token is returned without a
	/// second exchange.
	pub async fn reauthenticate(
		&self,
		stale: &AuthToken,
		interrupt: &Interrupt,
	) -> Result<AuthToken> {
		tracing::info!("Access token rejected; re-authenticating.");

		self.refresh(Some(stale), interrupt).await
	}

	/// Renews the held token ahead of expiry; used by the background renewal task.
	pub async fn renew(&self) -> Result<AuthToken> {
		let current = self.snapshot();

		self.refresh(current.as_ref(), &Interrupt::default()).await
	}

	/// Consistent snapshot of the held token, usable or not.
	pub fn snapshot(&self) -> Option<AuthToken> {
		self.state.read().token.clone()
	}

	/// Margin applied before the recorded expiry.
	pub fn expiry_margin(&self) -> Duration {
		self.margin
	}

	/// Token exchange counters.
	pub fn metrics(&self) -> &Arc<AuthMetrics> {
		&self.metrics
	}

	/// Future resolving the next time a token is issued.
	pub(crate) fn token_issued(&self) -> Notified<'_> {
		self.issued.notified()
	}

	fn usable_token(&self) -> Option<AuthToken> {
		let now = OffsetDateTime::now_utc();

		self.state.read().token.as_ref().filter(|t| t.is_usable_at(now, self.margin)).cloned()
	}

	async fn refresh(
		&self,
		stale: Option<&AuthToken>,
		interrupt: &Interrupt,
	) -> Result<AuthToken> {
		let observed = self.state.read().fetches;
		let _singleflight = interrupt.run(self.singleflight.lock()).await?;

		{
			let state = self.state.read();

			if state.fetches != observed {
				if let Some(failure) = &state.last_failure {
					return Err(failure.clone().into());
				}
				if let Some(token) = &state.token {
					return Ok(token.clone());
				}
			}
			if let Some(token) = &state.token
				&& stale.is_none_or(|s| s != token)
				&& token.is_usable_at(OffsetDateTime::now_utc(), self.margin)
			{
				return Ok(token.clone());
			}
		}

		self.fetch(interrupt).await
	}

	async fn fetch(&self, interrupt: &Interrupt) -> Result<AuthToken> {
		let span = OperationSpan::new(OperationKind::Authenticate, "token_endpoint");

		self.metrics.record_attempt();

		let exchange = span.instrument(async {
			let facade = TokenFacade::for_credentials(
				&self.credentials,
				self.token_endpoint.as_ref(),
				self.http_client.clone(),
				self.error_mapper.clone(),
				OffsetDateTime::now_utc(),
			)?;

			facade.request_token().await
		});
		let result = match interrupt.run(exchange).await {
			Ok(result) => result,
			Err(e) => {
				self.metrics.record_outcome(OperationOutcome::Failure);

				return Err(e);
			},
		};

		self.metrics.record_outcome(OperationOutcome::of(&result));

		let mut state = self.state.write();

		state.fetches += 1;

		match result {
			Ok(token) => {
				state.token = Some(token.clone());
				state.last_failure = None;

				drop(state);

				tracing::info!(expires_at = %token.expires_at, "Access token issued.");

				self.issued.notify_waiters();

				Ok(token)
			},
			Err(failure) => {
				state.last_failure = Some(failure.clone());

				drop(state);

				tracing::warn!(error = %failure, "Token exchange failed.");

				Err(failure.into())
			},
		}
	}
}
impl<C, M> Debug for Authenticator<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authenticator")
			.field("client_id", &self.credentials.client_id)
			.field("token", &self.state.read().token)
			.finish_non_exhaustive()
	}
}
