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

//! Lock capability traits and the generic wait combinator.
//!
//! ## Purpose
//! Defines the contract every backend implements: a non-blocking
//! [`TryLocker`] and a bounded-blocking [`Locker`], both handing out an
//! opaque [`LockGuard`] on success. A generic polling combinator,
//! [`lock_with_retry`], lifts any `TryLocker` into the blocking contract.
//!
//! ## Outcome mapping
//! - `Ok(Some(guard))` — exclusive ownership for approximately the next ttl
//! - `Ok(None)` — held by another owner (contention is expected, not an
//!   error), or the wait budget elapsed
//! - `Err(_)` — invalid ttl or a backend/communication fault
//!
//! Caller cancellation is dropping the future; every await point in this
//! module is drop-safe, so wrapping `lock` in `tokio::time::timeout` or a
//! `select!` arm returns promptly.

use crate::LockResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Interval between acquisition retries inside [`lock_with_retry`].
pub(crate) const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Proof of one successful acquisition.
///
/// The guard is the only object a caller receives; it privately carries
/// whatever its backend needs to release safely (an expiry snapshot, an
/// ownership token, or a lease). Release consumes the guard, so "unlock
/// exactly once" is enforced by ownership.
///
/// `unlock` is infallible by contract: a failed release is absorbed and the
/// lock's own TTL expiry is the safety net.
#[async_trait]
pub trait LockGuard: Send {
    /// Release this acquisition.
    ///
    /// Must affect only the exact acquisition this guard represents — never
    /// a later acquisition of the same key obtained after this one expired.
    async fn unlock(self: Box<Self>);
}

/// Non-blocking lock acquisition.
#[async_trait]
pub trait TryLocker: Send + Sync {
    /// Attempt to acquire `key` exclusively for approximately the next
    /// `ttl`, in a single round trip.
    ///
    /// ## Returns
    /// - `Ok(Some(guard))`: acquired
    /// - `Ok(None)`: currently held by another owner
    /// - `Err(LockError::InvalidTtl)`: `ttl` is zero
    /// - `Err(LockError::BackendError)`: backend/communication failure
    async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<Option<Box<dyn LockGuard>>>;
}

/// Bounded-blocking lock acquisition on top of [`TryLocker`].
#[async_trait]
pub trait Locker: TryLocker {
    /// Acquire `key`, waiting up to `wait` for a current holder to release
    /// or expire.
    ///
    /// Returns `Ok(None)` when the wait budget elapses unacquired. A `wait`
    /// of zero performs exactly one immediate attempt.
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> LockResult<Option<Box<dyn LockGuard>>>;
}

/// Implement the blocking contract over any non-blocking implementation by
/// fixed-interval polling.
///
/// One immediate attempt, then a retry every [`RETRY_INTERVAL`] until the
/// `wait` deadline. Exactly one of {acquired, error, deadline} wins; the
/// loop terminates on the first winner with no further retries.
pub(crate) async fn lock_with_retry<L>(
    locker: &L,
    key: &str,
    ttl: Duration,
    wait: Duration,
) -> LockResult<Option<Box<dyn LockGuard>>>
where
    L: TryLocker + ?Sized,
{
    if let Some(guard) = locker.try_lock(key, ttl).await? {
        return Ok(Some(guard));
    }
    if wait.is_zero() {
        return Ok(None);
    }

    let deadline = sleep(wait);
    tokio::pin!(deadline);

    let mut ticker = interval(RETRY_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick fires immediately; the immediate attempt
    // already happened above.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(None),
            _ = ticker.tick() => {
                if let Some(guard) = locker.try_lock(key, ttl).await? {
                    return Ok(Some(guard));
                }
            }
        }
    }
}
