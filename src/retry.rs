//! Retry/backoff controller deciding, per failed attempt, whether and how long to wait.
//!
//! Classification is delegated to a [`RetryStrategy`] so wrapper layers can recognize
//! additional vendor error identifiers without touching the executor. The wait is chosen
//! in a fixed order: an explicit `Retry-After` hint, then the rate limiter's suggestion
//! when the method class is out of budget, then capped exponential backoff.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	rate_limit::RateLimiter,
	request::Interrupt,
};

/// Error identifier returned when two writers touch the same entity concurrently.
pub const CONCURRENT_ACCESS_ERROR: &str = "api.concurrent.access.error";
/// Bad-request identifiers caused by request ordering rather than request content.
pub const RETRYABLE_BAD_REQUEST_IDS: [&str; 4] = [
	"non.restricted.entity.authorization.failed",
	"bad.request",
	"db.simultaneous.request",
	CONCURRENT_ACCESS_ERROR,
];

/// Retry bounds applied to one logical request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Disabled policies perform exactly one attempt.
	pub enabled: bool,
	/// Exponential backoff floor.
	pub min_wait: StdDuration,
	/// Exponential backoff ceiling (not applied to `Retry-After` hints).
	pub max_wait: StdDuration,
	/// Total attempts, including the first.
	pub max_attempts: u32,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Self::default() }
	}

	/// Overrides the backoff bounds.
	pub fn with_waits(mut self, min_wait: StdDuration, max_wait: StdDuration) -> Self {
		self.min_wait = min_wait;
		self.max_wait = max_wait.max(min_wait);

		self
	}

	/// Overrides the attempt ceiling (zero clamps to one).
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);

		self
	}

	/// Attempts permitted for one request.
	pub fn attempt_ceiling(&self) -> u32 {
		if self.enabled { self.max_attempts.max(1) } else { 1 }
	}

	/// `min(max_wait, min_wait * 2^retry)` where `retry` counts from zero.
	pub fn backoff(&self, retry: u32) -> StdDuration {
		match 2_u32.checked_pow(retry) {
			Some(factor) => self.min_wait.saturating_mul(factor).min(self.max_wait),
			None => self.max_wait,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			min_wait: StdDuration::from_secs(2),
			max_wait: StdDuration::from_secs(10),
			max_attempts: 100,
		}
	}
}

/// What a single attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome<'a> {
	/// The endpoint answered with a non-success status.
	Response {
		/// HTTP status code.
		status: u16,
		/// Vendor error identifier parsed from the body, when present.
		error_id: Option<&'a str>,
	},
	/// The request never produced a response.
	Transport(&'a TransportError),
}

/// Strategy hook classifying failed attempts as retryable or terminal.
pub trait RetryStrategy: Send + Sync {
	/// Returns `true` when the attempt may be repeated.
	fn is_retryable(&self, outcome: &AttemptOutcome<'_>) -> bool;
}

/// Default classification for the vendor's REST dialect.
///
/// - `429` and `503` always retry.
/// - `409` retries only for [`CONCURRENT_ACCESS_ERROR`].
/// - `400` retries only for [`RETRYABLE_BAD_REQUEST_IDS`].
/// - Other `4xx` and `501` are terminal; remaining `5xx` retry.
/// - Transport failures retry unless the request itself could not be built.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRetryStrategy;
impl RetryStrategy for DefaultRetryStrategy {
	fn is_retryable(&self, outcome: &AttemptOutcome<'_>) -> bool {
		match outcome {
			AttemptOutcome::Transport(err) => err.is_transient(),
			AttemptOutcome::Response { status, error_id } => classify_status(*status, *error_id),
		}
	}
}

fn classify_status(status: u16, error_id: Option<&str>) -> bool {
	match status {
		429 | 503 => true,
		409 => error_id == Some(CONCURRENT_ACCESS_ERROR),
		400 => error_id.is_some_and(|id| RETRYABLE_BAD_REQUEST_IDS.contains(&id)),
		501 => false,
		500..=599 => true,
		_ => false,
	}
}

/// Extracts the vendor error identifier (`id`, falling back to `code`) from a JSON body.
pub fn parse_error_id(body: &[u8]) -> Option<String> {
	#[derive(Deserialize)]
	struct ErrorBody {
		id: Option<String>,
		code: Option<String>,
	}

	let parsed = serde_json::from_slice::<ErrorBody>(body).ok()?;

	parsed.id.or(parsed.code).filter(|id| !id.is_empty())
}

/// Outcome of consulting the controller after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
	/// Whether another attempt should be made.
	pub retry: bool,
	/// Delay before the next attempt.
	pub wait: StdDuration,
}
impl RetryDecision {
	/// Terminal decision.
	pub const fn stop() -> Self {
		Self { retry: false, wait: StdDuration::ZERO }
	}

	/// Retry after `wait`.
	pub const fn after(wait: StdDuration) -> Self {
		Self { retry: true, wait }
	}
}

/// Combines policy, classification, and the shared rate limiter.
#[derive(Clone)]
pub struct RetryController {
	policy: RetryPolicy,
	strategy: Arc<dyn RetryStrategy>,
	limiter: Arc<RateLimiter>,
}
impl RetryController {
	/// Creates a controller.
	pub fn new(
		policy: RetryPolicy,
		strategy: Arc<dyn RetryStrategy>,
		limiter: Arc<RateLimiter>,
	) -> Self {
		Self { policy, strategy, limiter }
	}

	/// Replaces the classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Returns the configured policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Decides whether attempt number `attempt` (zero-based) should be followed by another.
	pub fn decide(
		&self,
		method: &str,
		attempt: u32,
		outcome: &AttemptOutcome<'_>,
		retry_after: Option<StdDuration>,
	) -> RetryDecision {
		if attempt.saturating_add(1) >= self.policy.attempt_ceiling()
			|| !self.strategy.is_retryable(outcome)
		{
			return RetryDecision::stop();
		}

		RetryDecision::after(self.wait_before(method, attempt, retry_after))
	}

	/// Computes the delay before retry number `retry` (zero-based).
	pub fn wait_before(
		&self,
		method: &str,
		retry: u32,
		retry_after: Option<StdDuration>,
	) -> StdDuration {
		if let Some(hint) = retry_after {
			return hint;
		}

		let (should_wait, wait) = self.limiter.wait_for_method(method);

		if should_wait {
			tracing::info!(
				method,
				wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
				"Rate limiter requested a wait."
			);

			return wait;
		}

		self.policy.backoff(retry)
	}

	/// Sleeps for `wait`, aborting early on cancellation or deadline.
	pub async fn pause(&self, wait: StdDuration, interrupt: &Interrupt) -> Result<()> {
		interrupt.run(tokio::time::sleep(wait)).await
	}
}
impl Debug for RetryController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryController").field("policy", &self.policy).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::rate_limit::{RateBudget, RateLimitSettings};

	fn controller(policy: RetryPolicy, read_limit: u32) -> RetryController {
		let limiter = RateLimiter::new(&RateLimitSettings {
			read: RateBudget::new(read_limit, StdDuration::from_secs(60)),
			write: RateBudget::new(100, StdDuration::from_secs(1)),
		});

		RetryController::new(policy, Arc::new(DefaultRetryStrategy), Arc::new(limiter))
	}

	fn response(status: u16, error_id: Option<&str>) -> AttemptOutcome<'_> {
		AttemptOutcome::Response { status, error_id }
	}

	#[test]
	fn status_classification_matches_vendor_dialect() {
		let strategy = DefaultRetryStrategy;

		assert!(strategy.is_retryable(&response(429, None)));
		assert!(strategy.is_retryable(&response(503, None)));
		assert!(strategy.is_retryable(&response(409, Some(CONCURRENT_ACCESS_ERROR))));
		assert!(!strategy.is_retryable(&response(409, Some("resource.conflict"))));
		assert!(!strategy.is_retryable(&response(409, None)));
		assert!(strategy.is_retryable(&response(400, Some("db.simultaneous.request"))));
		assert!(!strategy.is_retryable(&response(400, Some("invalid.input"))));
		assert!(!strategy.is_retryable(&response(404, None)));
		assert!(!strategy.is_retryable(&response(501, None)));
		assert!(strategy.is_retryable(&response(502, None)));
	}

	#[test]
	fn transport_failures_follow_transience() {
		let strategy = DefaultRetryStrategy;
		let reset = TransportError::Io(std::io::Error::other("reset"));
		let build = TransportError::request(std::io::Error::other("bad uri"));

		assert!(strategy.is_retryable(&AttemptOutcome::Transport(&reset)));
		assert!(!strategy.is_retryable(&AttemptOutcome::Transport(&build)));
	}

	#[test]
	fn error_ids_prefer_id_over_code() {
		assert_eq!(
			parse_error_id(b"{\"id\":\"api.concurrent.access.error\",\"code\":\"x\"}").as_deref(),
			Some(CONCURRENT_ACCESS_ERROR)
		);
		assert_eq!(parse_error_id(b"{\"code\":\"bad.request\"}").as_deref(), Some("bad.request"));
		assert_eq!(parse_error_id(b"not json"), None);
		assert_eq!(parse_error_id(b"[1,2]"), None);
	}

	#[test]
	fn retry_after_wins_regardless_of_bounds() {
		let controller = controller(
			RetryPolicy::default().with_waits(StdDuration::from_secs(5), StdDuration::from_secs(6)),
			0,
		);
		let decision = controller.decide(
			"GET",
			0,
			&response(429, None),
			Some(StdDuration::from_secs(30)),
		);

		assert_eq!(decision, RetryDecision::after(StdDuration::from_secs(30)));
	}

	#[test]
	fn exhausted_budget_yields_limiter_wait() {
		let controller = controller(RetryPolicy::default(), 1);

		assert_eq!(controller.wait_before("GET", 0, None), StdDuration::from_secs(2));

		let wait = controller.wait_before("GET", 0, None);

		assert!(wait > StdDuration::from_secs(2) && wait <= StdDuration::from_secs(60));
	}

	#[test]
	fn exponential_backoff_is_capped() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.backoff(0), StdDuration::from_secs(2));
		assert_eq!(policy.backoff(1), StdDuration::from_secs(4));
		assert_eq!(policy.backoff(2), StdDuration::from_secs(8));
		assert_eq!(policy.backoff(3), StdDuration::from_secs(10));
		assert_eq!(policy.backoff(64), StdDuration::from_secs(10));
	}

	#[test]
	fn attempt_ceiling_and_disabled_policy_stop_retrying() {
		let bounded = controller(RetryPolicy::default().with_max_attempts(3), 100);
		let disabled = controller(RetryPolicy::disabled(), 100);

		assert!(bounded.decide("GET", 1, &response(503, None), None).retry);
		assert_eq!(bounded.decide("GET", 2, &response(503, None), None), RetryDecision::stop());
		assert_eq!(disabled.decide("GET", 0, &response(503, None), None), RetryDecision::stop());
	}
}
