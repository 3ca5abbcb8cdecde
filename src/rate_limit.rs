//! Per-method-class request budgets consulted by the retry controller.
//!
//! The limiter never sleeps. It answers whether a class is out of budget and how long
//! the caller would have to wait; the retry controller decides what to do with that.

// std
use std::num::NonZeroU32;
// crates.io
use governor::{
	DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter,
	clock::{Clock, DefaultClock},
};
// self
use crate::_prelude::*;

/// Budget partition a request method draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodClass {
	/// `GET` and other safe methods.
	Read,
	/// `POST`, `PUT`, `PATCH`, and `DELETE`.
	Write,
}
impl MethodClass {
	/// Classifies an HTTP method name.
	pub fn of(method: &str) -> Self {
		match method.to_ascii_uppercase().as_str() {
			"GET" | "HEAD" | "OPTIONS" => Self::Read,
			_ => Self::Write,
		}
	}
}

/// `limit` requests per `window`, replenished continuously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
	/// Requests allowed per window (zero clamps to one).
	pub limit: u32,
	/// Replenishment window.
	pub window: StdDuration,
}
impl RateBudget {
	/// Creates a budget of `limit` requests per `window`.
	pub const fn new(limit: u32, window: StdDuration) -> Self {
		Self { limit, window }
	}

	fn quota(&self) -> Quota {
		let limit = NonZeroU32::new(self.limit).unwrap_or(NonZeroU32::MIN);
		let period = self
			.window
			.checked_div(limit.get())
			.filter(|p| !p.is_zero())
			.unwrap_or(StdDuration::from_nanos(1));

		Quota::with_period(period).unwrap_or_else(|| Quota::per_second(limit)).allow_burst(limit)
	}
}

/// Budgets for both method classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
	/// Budget for read requests.
	pub read: RateBudget,
	/// Budget for write requests.
	pub write: RateBudget,
}
impl Default for RateLimitSettings {
	fn default() -> Self {
		Self {
			read: RateBudget::new(20, StdDuration::from_secs(10)),
			write: RateBudget::new(10, StdDuration::from_secs(10)),
		}
	}
}

/// Shared limiter holding one token bucket per method class.
pub struct RateLimiter {
	read: DefaultDirectRateLimiter,
	write: DefaultDirectRateLimiter,
	clock: DefaultClock,
}
impl RateLimiter {
	/// Builds buckets for the provided budgets.
	pub fn new(settings: &RateLimitSettings) -> Self {
		Self {
			read: GovernorLimiter::direct(settings.read.quota()),
			write: GovernorLimiter::direct(settings.write.quota()),
			clock: DefaultClock::default(),
		}
	}

	/// Draws one unit from the class budget.
	///
	/// Returns `(false, 0)` when budget was available, otherwise `(true, wait)` where `wait`
	/// is the time until the bucket admits another request.
	pub fn wait(&self, class: MethodClass) -> (bool, StdDuration) {
		let bucket = match class {
			MethodClass::Read => &self.read,
			MethodClass::Write => &self.write,
		};

		match bucket.check() {
			Ok(()) => (false, StdDuration::ZERO),
			Err(not_until) => (true, not_until.wait_time_from(self.clock.now())),
		}
	}

	/// Convenience wrapper classifying `method` first.
	pub fn wait_for_method(&self, method: &str) -> (bool, StdDuration) {
		self.wait(MethodClass::of(method))
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn methods_split_into_read_and_write() {
		assert_eq!(MethodClass::of("get"), MethodClass::Read);
		assert_eq!(MethodClass::of("GET"), MethodClass::Read);

		for method in ["POST", "PUT", "PATCH", "DELETE"] {
			assert_eq!(MethodClass::of(method), MethodClass::Write);
		}
	}

	#[test]
	fn exhausted_class_reports_wait_without_touching_the_other() {
		let limiter = RateLimiter::new(&RateLimitSettings {
			read: RateBudget::new(2, StdDuration::from_secs(10)),
			write: RateBudget::new(1, StdDuration::from_secs(10)),
		});

		assert_eq!(limiter.wait(MethodClass::Read), (false, StdDuration::ZERO));
		assert_eq!(limiter.wait(MethodClass::Read), (false, StdDuration::ZERO));

		let (should_wait, wait) = limiter.wait(MethodClass::Read);

		assert!(should_wait);
		assert!(wait > StdDuration::ZERO && wait <= StdDuration::from_secs(5));
		assert_eq!(limiter.wait_for_method("DELETE"), (false, StdDuration::ZERO));
		assert!(limiter.wait_for_method("POST").0);
	}

	#[test]
	fn zero_limits_clamp_to_one() {
		let limiter = RateLimiter::new(&RateLimitSettings {
			read: RateBudget::new(0, StdDuration::from_secs(1)),
			write: RateBudget::new(0, StdDuration::ZERO),
		});

		assert!(!limiter.wait(MethodClass::Read).0);
		assert!(limiter.wait(MethodClass::Read).0);
		assert!(!limiter.wait(MethodClass::Write).0);
	}
}
