//! Bounded-concurrency admission gate.
//!
//! Every upload-related operation acquires a slot before touching the
//! stores. The gate knows nothing about sessions; it is purely resource
//! protection. Acquisition is wrapped in a timeout so a stuck client cannot
//! hold the queue hostage.

use crate::errors::{UploadError, UploadResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent upload operations.
pub const DEFAULT_MAX_CONCURRENT_OPS: usize = 10;

/// Default wait before a saturated gate turns callers away.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl AdmissionController {
    pub fn new(max_concurrent: usize, acquire_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            acquire_timeout,
        }
    }

    /// Wait for a free slot, giving up with [`UploadError::Saturated`] after
    /// the configured timeout. The returned permit releases its slot on drop,
    /// which covers every exit path of the guarded operation.
    pub async fn acquire(&self) -> UploadResult<OwnedSemaphorePermit> {
        match tokio::time::timeout(self.acquire_timeout, self.slots.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed while the controller is alive.
            Ok(Err(_)) => Err(UploadError::Saturated),
            Err(_) => Err(UploadError::Saturated),
        }
    }

    /// Free slots right now. Probe for tests and readiness reporting.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_OPS, DEFAULT_ACQUIRE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_bound_concurrency() {
        let gate = AdmissionController::new(2, Duration::from_millis(50));
        let p1 = gate.acquire().await.unwrap();
        let _p2 = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        // Third caller times out while both slots are held.
        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(err, UploadError::Saturated));

        drop(p1);
        let _p3 = gate.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn slot_released_on_drop() {
        let gate = AdmissionController::new(1, Duration::from_millis(50));
        {
            let _permit = gate.acquire().await.unwrap();
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 1);
    }
}
