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

//! # DistLock
//!
//! ## Purpose
//! Exclusive, time-bounded ownership of named resources for competing
//! callers — tasks, processes, or machines — with automatic expiry so a
//! crashed or slow holder cannot deadlock the rest.
//!
//! ## Design Decisions
//! - **One safety invariant**: at most one live holder per key, per backend
//!   instance/cluster. Nothing else is guaranteed — no fairness among
//!   waiters, no ordering.
//! - **Ownership-proof release**: every guard releases only the exact
//!   acquisition it represents (expiry snapshot, random token, or lease),
//!   never a later acquisition of the same key.
//! - **No renewal**: a lock's protection window is exactly its TTL. Size the
//!   TTL to cover the protected work; outliving it silently forfeits
//!   protection.
//! - **Contention is not an error**: acquisition returns `Ok(None)` when the
//!   key is held; `Err` is reserved for invalid TTLs and backend faults.
//!
//! ## Backend Support
//! - **Memory**: single-process table with a periodic expiry sweep
//!   (feature: `memory-backend`, default)
//! - **Redis**: `SET NX PX` acquire, token-guarded Lua release
//!   (feature: `redis-backend`)
//! - **etcd**: lease-backed session plus the server's lock recipe
//!   (feature: `etcd-backend`)
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust
//! use distlock::{LockGuard, Locker, MemoryLocker, TryLocker};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let locker = MemoryLocker::new(64, Duration::from_secs(30));
//!
//! // Non-blocking attempt
//! if let Some(guard) = locker.try_lock("jobs:nightly", Duration::from_secs(30)).await? {
//!     // ... protected work ...
//!     guard.unlock().await;
//! }
//!
//! // Bounded-blocking attempt: poll for up to 5s
//! match locker.lock("jobs:nightly", Duration::from_secs(30), Duration::from_secs(5)).await? {
//!     Some(guard) => guard.unlock().await,
//!     None => { /* wait budget elapsed; retry later or skip */ }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Callers impose their own cancellation by dropping the future, e.g. with
//! `tokio::time::timeout(deadline, locker.lock(..))`.

pub mod error;
pub mod locker;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(feature = "etcd-backend")]
pub mod etcd;

pub use error::{LockError, LockResult};
pub use locker::{LockGuard, Locker, TryLocker};

#[cfg(feature = "memory-backend")]
pub use memory::MemoryLocker;

#[cfg(feature = "redis-backend")]
pub use redis::RedisLocker;

#[cfg(feature = "etcd-backend")]
pub use etcd::EtcdLocker;
