// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Moka cache for resolved policies

use moka::sync::Cache;
use moka::Expiry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine_core::constants::policy::CACHE_MAX_CAPACITY;
use crate::engine_core::models::Policy;

/// Cache key: source path as given plus the environment it was resolved for.
pub type CacheKey = (PathBuf, Option<String>);

#[derive(Debug, Clone)]
struct CachedPolicy {
    policy: Arc<Policy>,
    ttl: Duration,
    inserted_at: Instant,
}

impl CachedPolicy {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Each entry expires after the TTL stored alongside it.
struct PerEntryTtl;

impl Expiry<CacheKey, CachedPolicy> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedPolicy,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Moka-based policy cache.
///
/// Handles are cheap to clone and share the same entries, so an orchestrator
/// rebuilt after `close()` can reuse policies that have not yet expired.
#[derive(Clone)]
pub struct PolicyCache {
    cache: Cache<CacheKey, CachedPolicy>,
}

impl Default for PolicyCache {
    fn default() -> Self {
        Self::new(CACHE_MAX_CAPACITY)
    }
}

impl std::fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl PolicyCache {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Fresh entry for `(path, environment)`, if any.
    pub fn get(&self, path: &Path, environment: Option<&str>) -> Option<Arc<Policy>> {
        let key = key(path, environment);
        let entry = self.cache.get(&key)?;
        // moka evicts lazily; never hand out an entry past its TTL
        if entry.is_fresh() {
            Some(entry.policy)
        } else {
            self.cache.invalidate(&key);
            None
        }
    }

    /// A zero TTL stores nothing.
    pub fn set(&self, path: &Path, environment: Option<&str>, policy: Arc<Policy>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.cache.insert(
            key(path, environment),
            CachedPolicy {
                policy,
                ttl,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, path: &Path, environment: Option<&str>) {
        self.cache.invalidate(&key(path, environment));
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

fn key(path: &Path, environment: Option<&str>) -> CacheKey {
    (path.to_path_buf(), environment.map(String::from))
}
