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

//! In-process lock backend.
//!
//! ## Purpose
//! Mutual exclusion between tasks and threads of a single process: one table
//! mapping key to absolute expiry, guarded end-to-end by a single mutex.
//!
//! ## Lease Management
//! - Expired entries are reclaimed lazily on the next acquisition attempt
//! - A periodic background sweep (when configured) bounds table growth from
//!   holders that never call `unlock`
//!
//! ## Release safety
//! The guard captures the expiry it wrote and deletes the entry only while
//! that value is still current. A guard held past its TTL therefore cannot
//! remove a later acquisition that has already replaced it.

use crate::{LockError, LockGuard, LockResult, Locker, TryLocker};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

type LockTable = Arc<Mutex<HashMap<String, Instant>>>;

/// Single-process lock backend.
///
/// ## Thread Safety
/// The table is shared behind `Arc<Mutex<..>>`; both acquisition
/// (compare-and-insert) and release (compare-and-delete) run under the same
/// mutex.
///
/// ## Lifecycle
/// The sweep task (one per instance) is started at construction and aborted
/// when the instance is dropped.
pub struct MemoryLocker {
    locks: LockTable,
    sweeper: Option<JoinHandle<()>>,
}

impl MemoryLocker {
    /// Create a new in-process lock backend.
    ///
    /// ## Arguments
    /// * `capacity` - initial table capacity hint
    /// * `sweep_interval` - period of the expired-entry sweep; zero disables
    ///   sweeping (expired entries are then reclaimed only on access)
    pub fn new(capacity: usize, sweep_interval: Duration) -> Self {
        let locks: LockTable = Arc::new(Mutex::new(HashMap::with_capacity(capacity)));

        let sweeper = if !sweep_interval.is_zero() {
            Some(Self::start_sweeper(locks.clone(), sweep_interval))
        } else {
            None
        };

        Self { locks, sweeper }
    }

    fn start_sweeper(locks: LockTable, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut table = locks.lock().await;
                let before = table.len();
                table.retain(|_, expires_at| *expires_at > now);
                let removed = before - table.len();
                drop(table);
                if removed > 0 {
                    trace!(removed, "swept expired lock entries");
                }
            }
        })
    }
}

impl Drop for MemoryLocker {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl TryLocker for MemoryLocker {
    async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<Option<Box<dyn LockGuard>>> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let now = Instant::now();
        let expires_at = now + ttl;

        let mut table = self.locks.lock().await;
        if let Some(current) = table.get(key) {
            if *current > now {
                return Ok(None);
            }
        }
        table.insert(key.to_string(), expires_at);
        drop(table);

        debug!(key, ?ttl, "acquired in-process lock");
        Ok(Some(Box::new(MemoryLockGuard {
            locks: self.locks.clone(),
            key: key.to_string(),
            expires_at,
        })))
    }
}

#[async_trait]
impl Locker for MemoryLocker {
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> LockResult<Option<Box<dyn LockGuard>>> {
        crate::locker::lock_with_retry(self, key, ttl, wait).await
    }
}

/// Handle for one in-process acquisition: the key plus a snapshot of the
/// expiry written at acquisition time.
struct MemoryLockGuard {
    locks: LockTable,
    key: String,
    expires_at: Instant,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn unlock(self: Box<Self>) {
        let mut table = self.locks.lock().await;
        // Delete only the acquisition this guard represents. If the entry
        // was replaced after our TTL lapsed, it belongs to someone else.
        if table.get(&self.key) == Some(&self.expires_at) {
            table.remove(&self.key);
            debug!(key = %self.key, "released in-process lock");
        }
    }
}
