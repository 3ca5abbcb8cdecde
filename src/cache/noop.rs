//! Cache backend that stores nothing.

// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheKey, ResponseCache},
};

/// Always misses; used when caching is disabled or the memory backend cannot be built.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCache;
impl ResponseCache for NoopCache {
	fn get(&self, _: &CacheKey) -> Option<Arc<CacheEntry>> {
		None
	}

	fn set(&self, _: CacheEntry) {}

	fn delete(&self, _: &CacheKey) {}

	fn clear_prefix(&self, _: &str) {}

	fn sweep(&self) {}

	fn clear(&self) {}

	fn len(&self) -> u64 {
		0
	}
}
