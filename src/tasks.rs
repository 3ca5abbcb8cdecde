//! Cancellable background tasks owned by a client: pre-emptive token renewal and the
//! periodic cache sweep.
//!
//! Tasks are only spawned when a Tokio runtime is current at construction. They stop when
//! the owning client shuts down or is dropped.

// crates.io
use tokio::{runtime::Handle, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	authenticator::Authenticator,
	cache::ResponseCache,
	config::ClientConfig,
	http::ApiHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
};

/// Join handles plus the signal that stops them.
#[derive(Debug)]
pub struct BackgroundTasks {
	cancel: CancellationToken,
	handles: Vec<JoinHandle<()>>,
}
impl BackgroundTasks {
	/// Spawns renewal (and, when caching is enabled, sweep) loops on the current runtime.
	///
	/// Returns `None` outside a Tokio runtime.
	pub fn spawn<C, M>(
		authenticator: &Arc<Authenticator<C, M>>,
		cache: &Arc<dyn ResponseCache>,
		config: &ClientConfig,
	) -> Option<Self>
	where
		C: ?Sized + ApiHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let Ok(runtime) = Handle::try_current() else {
			tracing::debug!("No Tokio runtime available; background tasks not started.");

			return None;
		};
		let cancel = CancellationToken::new();
		let mut handles = vec![runtime.spawn(renewal_loop(
			authenticator.clone(),
			config.renewal_retry,
			cancel.child_token(),
		))];

		if config.cache.enabled {
			handles.push(runtime.spawn(sweep_loop(
				cache.clone(),
				config.cache.sweep_interval,
				cancel.child_token(),
			)));
		}

		tracing::debug!(tasks = handles.len(), "Background tasks started.");

		Some(Self { cancel, handles })
	}

	/// Returns `true` while any task is still running.
	pub fn is_running(&self) -> bool {
		self.handles.iter().any(|h| !h.is_finished())
	}

	/// Signals every task to stop and waits for them to exit.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();

		for handle in self.handles.drain(..) {
			if let Err(e) = handle.await
				&& e.is_panic()
			{
				tracing::warn!(error = %e, "Background task panicked.");
			}
		}

		tracing::debug!("Background tasks stopped.");
	}
}
impl Drop for BackgroundTasks {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

async fn renewal_loop<C, M>(
	authenticator: Arc<Authenticator<C, M>>,
	retry_delay: StdDuration,
	cancel: CancellationToken,
) where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	loop {
		// Registered before the snapshot so an issue in between is not missed.
		let issued = authenticator.token_issued();
		let wait = match authenticator.snapshot() {
			Some(token) => until(token.renew_at(authenticator.expiry_margin())),
			None => {
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = issued => continue,
				}
			},
		};

		tokio::select! {
			_ = cancel.cancelled() => break,
			// A caller replaced the token on demand; reschedule against the new expiry.
			_ = issued => continue,
			_ = time::sleep(wait) => {},
		}

		let span = OperationSpan::new(OperationKind::TokenRenewal, "renewal_loop");

		obs::record_operation_outcome(OperationKind::TokenRenewal, OperationOutcome::Attempt);

		let result = span.instrument(authenticator.renew()).await;

		obs::record_operation_outcome(OperationKind::TokenRenewal, OperationOutcome::of(&result));

		if let Err(e) = result {
			tracing::warn!(
				error = %e,
				retry_in_secs = retry_delay.as_secs(),
				"Token renewal failed."
			);

			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = time::sleep(retry_delay) => {},
			}
		}
	}

	tracing::debug!("Token renewal loop stopped.");
}

async fn sweep_loop(
	cache: Arc<dyn ResponseCache>,
	interval: StdDuration,
	cancel: CancellationToken,
) {
	let mut ticker = time::interval_at(time::Instant::now() + interval, interval);

	ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = ticker.tick() => {
				cache.sweep();
				obs::record_operation_outcome(OperationKind::CacheSweep, OperationOutcome::Success);
				tracing::trace!(entries = cache.len(), "Cache swept.");
			},
		}
	}

	tracing::debug!("Cache sweep loop stopped.");
}

fn until(instant: OffsetDateTime) -> StdDuration {
	StdDuration::try_from(instant - OffsetDateTime::now_utc()).unwrap_or(StdDuration::ZERO)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedHttpClient, ScriptedReply, ScriptedTransportErrorMapper},
		auth::Credentials,
		cache::{CacheEntry, CacheKey, CacheSettings, build_cache},
	};

	type ScriptedAuthenticator = Authenticator<ScriptedHttpClient, ScriptedTransportErrorMapper>;

	fn config() -> ClientConfig {
		ClientConfig::builder(
			Credentials::new("client-1").with_client_secret("s3cret").with_vanity_domain("tenant"),
		)
		.token_endpoint(
			Url::parse("https://tenant.zslogin.net/oauth2/v1/token")
				.expect("Token endpoint should parse."),
		)
		.cache(CacheSettings::default().with_sweep_interval(StdDuration::from_millis(20)))
		.build()
	}

	#[tokio::test]
	async fn renewal_waits_for_first_token_and_stops_on_shutdown() {
		let transport = ScriptedHttpClient::default();

		// A 2s lifetime caps the margin at 1s, so renewal fires about a second after issue.
		transport
			.push_token(ScriptedReply::token("tok-1", 2))
			.push_token(ScriptedReply::token("tok-2", 3600));

		let config = config();
		let authenticator = Arc::new(ScriptedAuthenticator::new(
			&config,
			transport.clone(),
			ScriptedTransportErrorMapper,
		));
		let cache = build_cache(&config.cache);
		let tasks = BackgroundTasks::spawn(&authenticator, &cache, &config)
			.expect("Runtime should be available.");

		time::sleep(StdDuration::from_millis(50)).await;

		assert!(transport.token_requests().is_empty());

		authenticator.ensure_token().await.expect("Initial fetch should succeed.");

		for _ in 0..100 {
			if transport.token_requests().len() == 2 {
				break;
			}

			time::sleep(StdDuration::from_millis(50)).await;
		}

		assert_eq!(
			authenticator.snapshot().map(|t| t.access_token.expose().to_owned()).as_deref(),
			Some("tok-2")
		);
		assert!(tasks.is_running());

		tasks.shutdown().await;
	}

	#[tokio::test]
	async fn sweep_evicts_expired_entries() {
		let config = config();
		let transport = ScriptedHttpClient::default();
		let authenticator =
			Arc::new(ScriptedAuthenticator::new(&config, transport, ScriptedTransportErrorMapper));
		let cache = build_cache(&config.cache);
		let key = CacheKey::read(
			&Url::parse("https://api.zsapi.net/users/1").expect("Test URL should parse."),
		);
		let mut entry = CacheEntry::new(
			key,
			200,
			Vec::new(),
			b"{}".to_vec(),
			OffsetDateTime::now_utc(),
			StdDuration::from_secs(60),
		);

		entry.expires_at = entry.created_at;
		cache.set(entry);

		let tasks = BackgroundTasks::spawn(&authenticator, &cache, &config)
			.expect("Runtime should be available.");

		time::sleep(StdDuration::from_millis(100)).await;

		assert!(cache.is_empty());

		tasks.shutdown().await;
	}

	#[test]
	fn spawn_outside_runtime_is_skipped() {
		let config = config();
		let authenticator = Arc::new(ScriptedAuthenticator::new(
			&config,
			ScriptedHttpClient::default(),
			ScriptedTransportErrorMapper,
		));
		let cache = build_cache(&config.cache);

		assert!(BackgroundTasks::spawn(&authenticator, &cache, &config).is_none());
	}
}
