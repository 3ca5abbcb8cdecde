//! Response cache contract, keys, snapshots, and the built-in backends.
//!
//! Only `GET` responses are ever stored. Mutations invalidate both the exact key and every
//! key sharing the path portion before `?`, which may clear unrelated queries on the same
//! path.

pub mod memory;
pub mod noop;

pub use memory::MemoryCache;
pub use noop::NoopCache;

// self
use crate::{_prelude::*, error::CacheError};

/// Cache construction parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheSettings {
	/// Disabled caches always miss.
	pub enabled: bool,
	/// Per-entry time-to-live.
	pub ttl: StdDuration,
	/// Interval of the background sweep evicting expired entries.
	pub sweep_interval: StdDuration,
	/// Maximum number of stored entries.
	pub capacity: u64,
}
impl CacheSettings {
	/// Default entry time-to-live.
	pub const DEFAULT_TTL: StdDuration = StdDuration::from_secs(10 * 60);
	/// Default sweep interval.
	pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(8 * 60);
	/// Default entry capacity.
	pub const DEFAULT_CAPACITY: u64 = 10_000;

	/// Settings that select the no-op backend.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Self::default() }
	}

	/// Overrides the time-to-live.
	pub fn with_ttl(mut self, ttl: StdDuration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Overrides the sweep interval.
	pub fn with_sweep_interval(mut self, interval: StdDuration) -> Self {
		self.sweep_interval = interval;

		self
	}

	/// Overrides the capacity.
	pub fn with_capacity(mut self, capacity: u64) -> Self {
		self.capacity = capacity;

		self
	}

	/// Rejects parameters the memory backend cannot honor.
	pub fn validate(&self) -> Result<(), CacheError> {
		if self.ttl.is_zero() {
			return Err(CacheError::ZeroTtl);
		}
		if self.sweep_interval.is_zero() {
			return Err(CacheError::ZeroSweepInterval);
		}
		if self.capacity == 0 {
			return Err(CacheError::ZeroCapacity);
		}

		Ok(())
	}
}
impl Default for CacheSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			ttl: Self::DEFAULT_TTL,
			sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
			capacity: Self::DEFAULT_CAPACITY,
		}
	}
}

/// Normalized `METHOD url` fingerprint of a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);
impl CacheKey {
	/// Builds the key for `method` against the fully merged `url`.
	pub fn new(method: &str, url: &Url) -> Self {
		Self(format!("{} {}", method.to_ascii_uppercase(), url.as_str()))
	}

	/// Key of the `GET` that would read the resource `url` points at.
	pub fn read(url: &Url) -> Self {
		Self::new("GET", url)
	}

	/// Key truncated before the query string.
	pub fn path_prefix(&self) -> &str {
		match self.0.split_once('?') {
			Some((prefix, _)) => prefix,
			None => &self.0,
		}
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Captured snapshot of a successful `GET` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
	/// Key the entry is stored under.
	pub key: CacheKey,
	/// HTTP status code.
	pub status: u16,
	/// Response headers, lowercased names.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Capture time.
	pub created_at: OffsetDateTime,
	/// Time after which the entry must not be served.
	pub expires_at: OffsetDateTime,
}
impl CacheEntry {
	/// Creates a snapshot expiring `ttl` after `created_at`.
	pub fn new(
		key: CacheKey,
		status: u16,
		headers: Vec<(String, String)>,
		body: Vec<u8>,
		created_at: OffsetDateTime,
		ttl: StdDuration,
	) -> Self {
		let expires_at = created_at + ttl;

		Self { key, status, headers, body, created_at, expires_at }
	}

	/// Returns `true` once `instant` reaches the entry's expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}

/// Storage contract shared by the executor and the sweep task.
pub trait ResponseCache
where
	Self: Send + Sync,
{
	/// Returns the live entry for `key`.
	fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;

	/// Stores `entry` under its own key, replacing any previous snapshot.
	fn set(&self, entry: CacheEntry);

	/// Removes the entry for `key`.
	fn delete(&self, key: &CacheKey);

	/// Removes every entry whose key starts with `prefix`.
	fn clear_prefix(&self, prefix: &str);

	/// Evicts expired entries.
	fn sweep(&self);

	/// Removes every entry.
	fn clear(&self);

	/// Approximate number of live entries.
	fn len(&self) -> u64;

	/// Returns `true` when no entries are stored.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Builds the configured backend, degrading to [`NoopCache`] when the settings are unusable.
pub fn build_cache(settings: &CacheSettings) -> Arc<dyn ResponseCache> {
	if !settings.enabled {
		tracing::debug!("Response cache disabled.");

		return Arc::new(NoopCache);
	}

	match MemoryCache::new(settings) {
		Ok(cache) => {
			tracing::debug!(
				ttl_secs = settings.ttl.as_secs(),
				capacity = settings.capacity,
				"Response cache ready."
			);

			Arc::new(cache)
		},
		Err(e) => {
			tracing::warn!(error = %e, "Response cache unavailable; continuing without caching.");

			Arc::new(NoopCache)
		},
	}
}

/// Drops the exact key of a mutated resource plus every entry sharing its path.
pub fn invalidate(cache: &dyn ResponseCache, key: &CacheKey) {
	cache.delete(key);
	cache.clear_prefix(key.path_prefix());
}
