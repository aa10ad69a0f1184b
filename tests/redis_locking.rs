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

//! Redis lock backend integration tests.
//!
//! Require a live Redis; the URL comes from `DISTLOCK_REDIS_URL`
//! (default `redis://127.0.0.1:6379`). Keys are uniquified per test so
//! suites can run against a shared instance.

#[cfg(feature = "redis-backend")]
mod tests {
    use distlock::{LockGuard, Locker, RedisLocker, TryLocker};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::time::{sleep, Instant};

    fn redis_url() -> String {
        std::env::var("DISTLOCK_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    /// Generate a unique lock key for testing
    fn unique_key(prefix: &str) -> String {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!(
            "distlock:test:{}:{}:{}",
            prefix,
            nanos,
            SEQ.fetch_add(1, Ordering::Relaxed)
        )
    }

    async fn create_locker() -> RedisLocker {
        RedisLocker::connect(&redis_url())
            .await
            .expect("failed to connect Redis")
    }

    /// Raw connection for probing backend state from tests.
    async fn raw_connection() -> redis::aio::MultiplexedConnection {
        redis::Client::open(redis_url())
            .expect("invalid redis url")
            .get_multiplexed_async_connection()
            .await
            .expect("failed to connect Redis")
    }

    #[tokio::test]
    async fn try_lock_then_unlock_deletes_key() {
        let locker = create_locker().await;
        let key = unique_key("unlock");

        let guard = locker
            .try_lock(&key, Duration::from_secs(1))
            .await
            .unwrap()
            .expect("should acquire");
        guard.unlock().await;

        let mut conn = raw_connection().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(value.is_none(), "key should be deleted after unlock");
    }

    #[tokio::test]
    async fn sub_millisecond_ttl_is_acquirable() {
        let locker = create_locker().await;
        let key = unique_key("subms");

        // PX rejects 0; a non-zero ttl below one millisecond must round up
        // to the store's minimum instead of erroring.
        let guard = locker
            .try_lock(&key, Duration::from_micros(500))
            .await
            .unwrap();
        assert!(guard.is_some());
    }

    #[tokio::test]
    async fn concurrent_try_lock_yields_one_owner() {
        let locker = Arc::new(create_locker().await);
        let key = unique_key("contested");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let locker = locker.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                locker.try_lock(&key, Duration::from_secs(30)).await
            }));
        }

        let mut acquired = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn ttl_expiry_frees_the_key() {
        let locker = create_locker().await;
        let key = unique_key("expiry");

        let _abandoned = locker
            .try_lock(&key, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("first acquisition");

        sleep(Duration::from_millis(200)).await;

        assert!(locker
            .try_lock(&key, Duration::from_secs(1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn stale_guard_release_leaves_successor_intact() {
        let locker = create_locker().await;
        let key = unique_key("stale");

        let holder1 = locker
            .try_lock(&key, Duration::from_millis(50))
            .await
            .unwrap()
            .expect("holder1 acquires");

        sleep(Duration::from_millis(100)).await;

        let _holder2 = locker
            .try_lock(&key, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("holder2 acquires after expiry");

        let mut conn = raw_connection().await;
        let before: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(before.is_some(), "holder2's token should be stored");

        // holder1's token no longer matches; the guarded delete must no-op.
        holder1.unlock().await;

        let after: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(before, after, "stale release must not touch holder2's lock");
    }

    #[tokio::test]
    async fn lock_blocks_until_holder_expires() {
        let locker = create_locker().await;
        let key = unique_key("wait");

        let _holder1 = locker
            .try_lock(&key, Duration::from_secs(1))
            .await
            .unwrap()
            .expect("holder1 acquires");

        let start = Instant::now();
        let holder2 = locker
            .lock(&key, Duration::from_secs(1), Duration::from_secs(2))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(holder2.is_some(), "holder2 must acquire once holder1 expires");
        assert!(elapsed >= Duration::from_millis(800), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn lock_times_out_within_wait_budget() {
        let locker = create_locker().await;
        let key = unique_key("timeout");

        let _holder1 = locker
            .try_lock(&key, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("holder1 acquires");

        let start = Instant::now();
        let holder2 = locker
            .lock(&key, Duration::from_secs(5), Duration::from_millis(200))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(holder2.is_none());
        assert!(elapsed < Duration::from_millis(500), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locker = create_locker().await;
        let key_a = unique_key("a");
        let key_b = unique_key("b");

        assert!(locker.try_lock(&key_a, Duration::from_secs(5)).await.unwrap().is_some());
        assert!(locker.try_lock(&key_b, Duration::from_secs(5)).await.unwrap().is_some());
    }
}
