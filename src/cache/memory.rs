//! Thread-safe in-memory [`ResponseCache`] backed by a `moka` TTL cache.

// crates.io
use moka::sync::Cache;
// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheKey, CacheSettings, ResponseCache},
	error::CacheError,
};

/// Bounded, TTL-evicting response store.
#[derive(Clone)]
pub struct MemoryCache {
	entries: Cache<CacheKey, Arc<CacheEntry>>,
}
impl MemoryCache {
	/// Builds the backend after validating `settings`.
	pub fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
		settings.validate()?;

		let entries =
			Cache::builder().time_to_live(settings.ttl).max_capacity(settings.capacity).build();

		Ok(Self { entries })
	}
}
impl ResponseCache for MemoryCache {
	fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
		let entry = self.entries.get(key)?;

		if entry.is_expired_at(OffsetDateTime::now_utc()) {
			self.entries.invalidate(key);

			return None;
		}

		Some(entry)
	}

	fn set(&self, entry: CacheEntry) {
		self.entries.insert(entry.key.clone(), Arc::new(entry));
	}

	fn delete(&self, key: &CacheKey) {
		self.entries.invalidate(key);
	}

	fn clear_prefix(&self, prefix: &str) {
		let doomed = self
			.entries
			.iter()
			.filter(|(key, _)| key.as_str().starts_with(prefix))
			.map(|(key, _)| key)
			.collect::<Vec<_>>();

		for key in doomed {
			self.entries.invalidate(key.as_ref());
		}
	}

	fn sweep(&self) {
		let now = OffsetDateTime::now_utc();
		let expired = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.is_expired_at(now))
			.map(|(key, _)| key)
			.collect::<Vec<_>>();

		for key in expired {
			self.entries.invalidate(key.as_ref());
		}

		self.entries.run_pending_tasks();
	}

	fn clear(&self) {
		self.entries.invalidate_all();
		self.entries.run_pending_tasks();
	}

	fn len(&self) -> u64 {
		self.entries.run_pending_tasks();

		self.entries.entry_count()
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache").field("entries", &self.entries.entry_count()).finish()
	}
}
