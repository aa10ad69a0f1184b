// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of DistLock.
//
// DistLock is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// DistLock is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with DistLock. If not, see <https://www.gnu.org/licenses/>.

//! Redis lock backend.
//!
//! ## Purpose
//! Cross-process mutual exclusion through a single Redis instance or
//! cluster.
//!
//! ## Design
//! - **Acquire**: `SET key <token> PX <ttl_ms> NX` — the store's atomic
//!   set-if-absent-with-expiry. The token is a fresh random value bound to
//!   this acquisition.
//! - **Release**: a Lua script that deletes the key only while it still
//!   holds this acquisition's token. An unconditional `DEL` would risk
//!   removing a lock some other holder acquired after our TTL lapsed.
//! - **Expiry**: native `PX`; no client-side bookkeeping and no renewal.
//!
//! Uses the async `ConnectionManager` (pooled, auto-reconnecting); each call
//! clones the manager handle.

use crate::{LockError, LockGuard, LockResult, Locker, TryLocker};
use async_trait::async_trait;
use rand::Rng;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Token-guarded compare-and-delete, executed atomically server-side.
const UNLOCK_SCRIPT: &str =
    "if redis.call('get',KEYS[1])==ARGV[1] then return redis.call('del',KEYS[1]) else return 0 end";

/// Redis-backed lock backend.
#[derive(Clone)]
pub struct RedisLocker {
    manager: ConnectionManager,
}

impl RedisLocker {
    /// Create a lock backend over an already-configured connection manager.
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Connect to Redis and create a lock backend.
    ///
    /// `url` is any valid Redis URL, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> LockResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl TryLocker for RedisLocker {
    #[instrument(skip(self))]
    async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<Option<Box<dyn LockGuard>>> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let token = rand::rng().random::<u64>().to_string();
        // PX takes whole milliseconds and rejects 0; a non-zero sub-ms ttl
        // rounds up to the store's minimum.
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if reply.is_none() {
            // Key already present: held by another owner.
            return Ok(None);
        }

        debug!(key, ?ttl, "acquired redis lock");
        Ok(Some(Box::new(RedisLockGuard {
            manager: self.manager.clone(),
            key: key.to_string(),
            token,
            ttl,
        })))
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> LockResult<Option<Box<dyn LockGuard>>> {
        crate::locker::lock_with_retry(self, key, ttl, wait).await
    }
}

/// Handle for one Redis acquisition: the key, the ownership token stored
/// under it, and the TTL used to bound the release round trip.
struct RedisLockGuard {
    manager: ConnectionManager,
    key: String,
    token: String,
    ttl: Duration,
}

#[async_trait]
impl LockGuard for RedisLockGuard {
    async fn unlock(self: Box<Self>) {
        let mut conn = self.manager.clone();
        let invocation = async {
            redis::cmd("EVAL")
                .arg(UNLOCK_SCRIPT)
                .arg(1)
                .arg(&self.key)
                .arg(&self.token)
                .query_async::<i64>(&mut conn)
                .await
        };

        // A release failure is absorbed: the key's own TTL is the safety
        // net. Bound the round trip so a dead server cannot hang the caller
        // past the point the lock matters.
        match tokio::time::timeout(self.ttl, invocation).await {
            Ok(Ok(deleted)) => {
                debug!(key = %self.key, deleted, "released redis lock");
            }
            Ok(Err(err)) => {
                warn!(key = %self.key, %err, "redis unlock failed; relying on TTL expiry");
            }
            Err(_) => {
                warn!(key = %self.key, "redis unlock timed out; relying on TTL expiry");
            }
        }
    }
}
