// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{OperationKind, OperationOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_operation_outcome(kind: OperationKind, outcome: OperationOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oneapi_core_operation_total",
			"operation" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Thread-safe counters for token endpoint exchanges.
#[derive(Debug, Default)]
pub struct AuthMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl AuthMetrics {
	/// Returns the number of token endpoint calls started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of token endpoint calls that produced a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of token endpoint calls that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
		record_operation_outcome(OperationKind::Authenticate, OperationOutcome::Attempt);
	}

	pub(crate) fn record_outcome(&self, outcome: OperationOutcome) {
		match outcome {
			OperationOutcome::Success => self.success.fetch_add(1, Ordering::Relaxed),
			OperationOutcome::Failure => self.failure.fetch_add(1, Ordering::Relaxed),
			OperationOutcome::Attempt => return,
		};

		record_operation_outcome(OperationKind::Authenticate, outcome);
	}
}
