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

//! Error types for lock operations.
//!
//! Contention is deliberately **not** represented here: a held lock is an
//! expected outcome and surfaces as `Ok(None)` from the acquisition calls.
//! Only invalid arguments and backend/communication faults are errors.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// TTL was zero. A lock with no expiry window offers no protection and
    /// would never be reclaimed from a crashed holder.
    #[error("Invalid TTL: must be positive")]
    InvalidTtl,

    /// Backend error (store, network, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::BackendError(format!("Redis error: {}", err))
    }
}

#[cfg(feature = "etcd-backend")]
impl From<etcd_client::Error> for LockError {
    fn from(err: etcd_client::Error) -> Self {
        LockError::BackendError(format!("etcd error: {}", err))
    }
}
