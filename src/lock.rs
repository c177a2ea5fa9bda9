//! Schema-scoped advisory locking.
//!
//! Multiple independent processes may target the same schema during a
//! deployment. Every mutating operation takes an exclusive lock first; the
//! primitive itself is a capability so that dialects with native advisory
//! locks can supply one, while [`LocalLock`] covers single-process use and
//! dialects with no primitive at all (the engine polls with backoff).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{MigrateResult, MigrationError};

/// Exclusive advisory lock over one schema's history.
#[async_trait]
pub trait SchemaLock: Send + Sync {
    /// Try to take the lock without blocking. Returns false when held
    /// elsewhere.
    async fn try_acquire(&self) -> MigrateResult<bool>;

    /// Release the lock.
    async fn release(&self) -> MigrateResult<()>;

    /// Whether this lock is currently held.
    async fn is_held(&self) -> MigrateResult<bool>;
}

/// Process-local lock over an atomic flag.
#[derive(Debug, Default)]
pub struct LocalLock {
    held: AtomicBool,
}

impl LocalLock {
    /// Create an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaLock for LocalLock {
    async fn try_acquire(&self) -> MigrateResult<bool> {
        Ok(self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    async fn release(&self) -> MigrateResult<()> {
        self.held.store(false, Ordering::Release);
        Ok(())
    }

    async fn is_held(&self) -> MigrateResult<bool> {
        Ok(self.held.load(Ordering::Acquire))
    }
}

/// Acquire a lock with bounded, doubling backoff.
///
/// Infrastructure errors from the lock propagate immediately; exhausting
/// the retry budget is a [`MigrationError::LockFailed`].
pub async fn acquire_with_retry(
    lock: &dyn SchemaLock,
    attempts: u32,
    initial_interval: Duration,
) -> MigrateResult<()> {
    let attempts = attempts.max(1);
    let mut interval = initial_interval;
    for attempt in 1..=attempts {
        if lock.try_acquire().await? {
            return Ok(());
        }
        if attempt == attempts {
            break;
        }
        tracing::debug!(attempt, ?interval, "migration lock busy, backing off");
        tokio::time::sleep(interval).await;
        interval = interval.saturating_mul(2);
    }
    Err(MigrationError::lock_failed(format!(
        "still held after {attempts} attempts"
    )))
}
