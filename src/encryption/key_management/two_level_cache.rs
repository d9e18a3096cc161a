// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Two-level cache with expiration of inner caches according to token
//! lifetime. The outer level is keyed per KMS access token, the inner level
//! per string key (KMS instance, master key id or KEK id).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// An inner cache handed out to callers; operated on under its own lock
pub(crate) type InnerCache<V> = Arc<Mutex<HashMap<String, V>>>;

#[cfg(not(test))]
fn now() -> Instant {
    Instant::now()
}

#[cfg(test)]
use mock_time::now;

struct ExpiringCacheEntry<V> {
    value: V,
    expiration: Option<Instant>,
}

impl<V> ExpiringCacheEntry<V> {
    fn new(value: V, lifetime: Option<Duration>) -> Self {
        Self {
            value,
            expiration: lifetime.map(|lifetime| now() + lifetime),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expiration {
            None => false,
            Some(expiration) => now() >= expiration,
        }
    }
}

struct CacheState<V> {
    cache: HashMap<String, ExpiringCacheEntry<InnerCache<V>>>,
    last_cleanup: Instant,
}

/// Cache of caches: access token -> expiring (string key -> V) map.
///
/// Expiry is evaluated lazily on lookup; expired outer entries are swept at
/// most once per cleanup period by
/// [`check_cache_for_expired_tokens`](Self::check_cache_for_expired_tokens).
/// All operations take a single mutex over the outer map.
pub(crate) struct TwoLevelCacheWithExpiration<V> {
    state: Mutex<CacheState<V>>,
}

impl<V> TwoLevelCacheWithExpiration<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                cache: HashMap::default(),
                last_cleanup: now(),
            }),
        }
    }

    /// Returns the inner cache for the given access token, installing a fresh
    /// one if the current entry is missing or expired.
    pub(crate) fn get_or_create_internal_cache(
        &self,
        access_token: &str,
        lifetime: Option<Duration>,
    ) -> InnerCache<V> {
        let mut state = self.state.lock().unwrap();
        match state.cache.get(access_token) {
            Some(entry) if !entry.is_expired() => entry.value.clone(),
            _ => {
                let inner: InnerCache<V> = Arc::new(Mutex::new(HashMap::default()));
                state.cache.insert(
                    access_token.to_owned(),
                    ExpiringCacheEntry::new(inner.clone(), lifetime),
                );
                inner
            }
        }
    }

    /// Removes all expired outer entries if a cleanup period has elapsed
    /// since the previous sweep. Callers invoke this opportunistically.
    pub(crate) fn check_cache_for_expired_tokens(&self, cleanup_period: Duration) {
        let mut state = self.state.lock().unwrap();
        let now = now();
        if now >= state.last_cleanup + cleanup_period {
            state.cache.retain(|_, entry| !entry.is_expired());
            state.last_cleanup = now;
        }
    }

    /// Removes the entries cached for the given access token
    pub(crate) fn remove(&self, access_token: &str) {
        self.state.lock().unwrap().cache.remove(access_token);
    }

    /// Removes the entries cached for all access tokens
    pub(crate) fn clear(&self) {
        self.state.lock().unwrap().cache.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().unwrap().cache.len()
    }
}
