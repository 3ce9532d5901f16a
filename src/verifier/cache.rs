// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Bounded TTL cache of chains that already passed online verification.
//!
//! Keys are the exact concatenation of the three `x5c` strings; a hit means
//! this very chain was fully verified (including OCSP) within the TTL, so
//! repeated payloads from the same signer skip the network entirely. The
//! cache is owned by its verifier instance; there is no process-wide
//! state.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Duration, Utc};

/// Maximum number of chains remembered at once.
pub(crate) const MAX_CACHED_CHAINS: usize = 32;

/// How long a verified chain stays valid in the cache.
const CACHE_TTL_SECONDS: i64 = 15 * 60;

struct CacheEntry {
    /// SEC1-encoded leaf public key derived when the chain verified.
    public_key: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// See the module docs. Reads take the shared lock and release it before
/// any expensive work; writes take the exclusive lock only for the map
/// mutation itself.
pub(crate) struct VerifiedChainCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl VerifiedChainCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached public key for this exact chain, if present and
    /// not past its TTL. Expired entries are treated as absent even when
    /// not yet evicted.
    pub(crate) fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.public_key.clone())
    }

    /// Remember a freshly verified chain with a full TTL.
    ///
    /// Eviction is lazy and happens only here: at capacity, already-expired
    /// entries are purged first; if the cache is still full, one arbitrary
    /// entry (iteration order, not LRU) makes room.
    pub(crate) fn save(&self, key: String, public_key: Vec<u8>, now: DateTime<Utc>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= MAX_CACHED_CHAINS && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.expires_at > now);

            if entries.len() >= MAX_CACHED_CHAINS {
                if let Some(evict) = entries.keys().next().cloned() {
                    entries.remove(&evict);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                public_key,
                expires_at: now + Duration::seconds(CACHE_TTL_SECONDS),
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
