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

//! etcd lock backend.
//!
//! ## Purpose
//! Cluster-wide mutual exclusion delegated to etcd's own lease and lock
//! primitives; no part of the mutual-exclusion algorithm is reimplemented
//! here.
//!
//! ## Design
//! - **Session**: a lease granted for the lock's TTL (rounded up to etcd's
//!   whole-second lease granularity). While a blocking caller sits in the
//!   server-side queue a keep-alive task renews the lease, so queue time
//!   never eats into the protection window; the task is detached the moment
//!   the lock is granted (after one final refresh), and from then on the
//!   lease — and with it the lock — expires exactly once after TTL,
//!   matching the non-renewing contract of the other backends.
//! - **Acquire**: the server-side lock RPC, which queues waiters under
//!   `<key>/` and binds the winner's ownership key to its lease.
//! - **Release**: revoking the lease; the server deletes the ownership key
//!   atomically with it, so no token comparison is needed.
//!
//! An elapsed wait deadline maps to contention (`Ok(None)`), not an error;
//! only genuine client/service faults surface as `Err`.

use crate::{LockError, LockGuard, LockResult, Locker, TryLocker};
use async_trait::async_trait;
use etcd_client::{Client, GetOptions, LockOptions};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, instrument, warn};

/// How long `try_lock` lets the lock RPC run after an empty-prefix probe.
/// Long enough for one round trip, short enough that losing a race to a
/// competing acquirer still reads as a non-blocking call.
const LOST_RACE_GRACE: Duration = Duration::from_millis(100);

/// etcd-backed lock backend.
///
/// Wraps an already-configured [`etcd_client::Client`]; the client handle is
/// cheaply cloneable and thread-safe, so one `EtcdLocker` serves any number
/// of concurrent callers.
#[derive(Clone)]
pub struct EtcdLocker {
    client: Client,
}

impl EtcdLocker {
    /// Create a lock backend over an already-configured etcd client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to etcd and create a lock backend.
    pub async fn connect<E: AsRef<str>, S: AsRef<[E]>>(endpoints: S) -> LockResult<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self::new(client))
    }

    /// TTL to lease seconds, rounded up to etcd's lease granularity.
    fn lease_secs(ttl: Duration) -> i64 {
        let mut secs = ttl.as_secs();
        if ttl.subsec_nanos() > 0 {
            secs += 1;
        }
        secs.max(1) as i64
    }

    /// Revoke a lease whose acquisition did not complete; failure only means
    /// the server will reclaim it at TTL.
    async fn revoke_quietly(client: &mut Client, lease_id: i64) {
        if let Err(err) = client.lease_revoke(lease_id).await {
            warn!(lease_id, %err, "lease revoke failed; lease will expire on its own");
        }
    }

    /// Renew `lease_id` at a third of its TTL for as long as the task runs.
    /// Keeps a queued waiter's lease alive however long the current holder
    /// takes to release; the caller aborts the task once the lock RPC
    /// resolves.
    fn start_renewal(client: Client, lease_id: i64, lease_secs: i64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut client = client;
            let (mut keeper, mut stream) = match client.lease_keep_alive(lease_id).await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(lease_id, %err, "keep-alive stream failed; lease will burn down while queued");
                    return;
                }
            };
            let mut ticker = interval(Duration::from_secs(lease_secs as u64) / 3);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if keeper.keep_alive().await.is_err() {
                    return;
                }
                match stream.message().await {
                    // A non-positive TTL in the response means the lease is
                    // already gone; nothing left to renew.
                    Ok(Some(response)) if response.ttl() > 0 => {}
                    _ => return,
                }
            }
        })
    }

    /// One last renewal at grant time, so the protection window starts at
    /// the full TTL rather than whatever the queue wait left of it. The
    /// stream is dropped right after, detaching the lease for good.
    async fn refresh_lease(client: &mut Client, lease_id: i64) {
        let refresh = async {
            let (mut keeper, mut stream) = client.lease_keep_alive(lease_id).await?;
            keeper.keep_alive().await?;
            stream.message().await
        };
        if let Err(err) = refresh.await {
            warn!(lease_id, %err, "lease refresh at grant failed; protection window may be short");
        }
    }
}

#[async_trait]
impl TryLocker for EtcdLocker {
    #[instrument(skip(self))]
    async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<Option<Box<dyn LockGuard>>> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let mut client = self.client.clone();

        // The lock recipe stores every owner's and waiter's key under
        // "<key>/". Any live entry means the mutex is taken or queued for,
        // so report contention without spending a lease on it.
        let probe = client
            .get(
                format!("{}/", key),
                Some(GetOptions::new().with_prefix().with_count_only()),
            )
            .await?;
        if probe.count() > 0 {
            return Ok(None);
        }

        let lease = client.lease_grant(Self::lease_secs(ttl), None).await?;
        let lease_id = lease.id();

        // The prefix was empty, so the lock RPC should return on its first
        // round trip. The short deadline guards the lost race where a
        // competing acquirer got in between the probe and the RPC: rather
        // than sit in the queue behind the winner, report contention.
        let options = LockOptions::new().with_lease(lease_id);
        match timeout(LOST_RACE_GRACE, client.lock(key, Some(options))).await {
            Ok(Ok(response)) => {
                debug!(key, lease_id, "acquired etcd lock");
                Ok(Some(Box::new(EtcdLockGuard {
                    client: self.client.clone(),
                    lease_id,
                    owner_key: response.key().to_vec(),
                })))
            }
            Ok(Err(err)) => {
                Self::revoke_quietly(&mut client, lease_id).await;
                Err(err.into())
            }
            Err(_) => {
                Self::revoke_quietly(&mut client, lease_id).await;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Locker for EtcdLocker {
    /// Bounded-blocking acquisition using etcd's own server-side wait: the
    /// lock RPC parks this caller in the mutex queue until the current
    /// holder releases or its lease expires. Strictly better than client
    /// polling, so the generic retry combinator is not used here. The
    /// caller's lease is renewed while queued and detached at grant, so the
    /// guard's protection window is a full TTL from acquisition.
    #[instrument(skip(self))]
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> LockResult<Option<Box<dyn LockGuard>>> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }
        if wait.is_zero() {
            return self.try_lock(key, ttl).await;
        }

        let mut client = self.client.clone();
        let lease_secs = Self::lease_secs(ttl);
        let lease = client.lease_grant(lease_secs, None).await?;
        let lease_id = lease.id();

        // The server parks waiters for as long as the holder lives, which
        // can exceed our own TTL; keep the lease alive until the RPC
        // resolves so the queue wait does not expire it out from under us.
        let renewal = Self::start_renewal(self.client.clone(), lease_id, lease_secs);

        let options = LockOptions::new().with_lease(lease_id);
        let outcome = timeout(wait, client.lock(key, Some(options))).await;
        renewal.abort();

        match outcome {
            Ok(Ok(response)) => {
                Self::refresh_lease(&mut client, lease_id).await;
                debug!(key, lease_id, "acquired etcd lock after wait");
                Ok(Some(Box::new(EtcdLockGuard {
                    client: self.client.clone(),
                    lease_id,
                    owner_key: response.key().to_vec(),
                })))
            }
            Ok(Err(err)) => {
                Self::revoke_quietly(&mut client, lease_id).await;
                Err(err.into())
            }
            Err(_) => {
                // Wait budget elapsed while queued: contended, not a fault.
                Self::revoke_quietly(&mut client, lease_id).await;
                Ok(None)
            }
        }
    }
}

/// Handle for one etcd acquisition: the session lease plus the ownership key
/// the lock RPC assigned under it.
struct EtcdLockGuard {
    client: Client,
    lease_id: i64,
    owner_key: Vec<u8>,
}

#[async_trait]
impl LockGuard for EtcdLockGuard {
    async fn unlock(self: Box<Self>) {
        let mut client = self.client.clone();
        // Revoking the lease deletes the ownership key server-side. On
        // failure the lease expires at TTL and the server cleans up anyway.
        match client.lease_revoke(self.lease_id).await {
            Ok(_) => {
                debug!(
                    lease_id = self.lease_id,
                    key = %String::from_utf8_lossy(&self.owner_key),
                    "released etcd lock"
                );
            }
            Err(err) => {
                warn!(
                    lease_id = self.lease_id,
                    %err,
                    "etcd unlock failed; relying on lease expiry"
                );
            }
        }
    }
}
