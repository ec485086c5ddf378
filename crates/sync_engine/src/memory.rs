//! Memory gate
//!
//! Admission control for memory-heavy work. A unit of work is admitted only
//! while the host reports more available memory than the threshold and the
//! in-flight cap is not reached. Admitted work holds a [`MemoryPermit`]
//! until it finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sysinfo::System;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Source of the available-memory reading
pub trait MemoryProbe: Send + Sync {
    /// Currently available memory in bytes
    fn available_bytes(&self) -> u64;
}

/// Host memory via sysinfo
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn available_bytes(&self) -> u64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.available_memory()
    }
}

/// Fixed reading, adjustable at runtime (tests, dry runs)
#[derive(Debug, Default)]
pub struct FixedMemory(AtomicU64);

impl FixedMemory {
    pub fn new(bytes: u64) -> Self {
        Self(AtomicU64::new(bytes))
    }

    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gate settings
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Admit only while available memory exceeds this
    pub threshold_bytes: u64,
    /// Delay between memory re-checks while blocked
    pub recheck: Duration,
    /// Upper bound on concurrently admitted work
    pub max_in_flight: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 512 * 1024 * 1024,
            recheck: Duration::from_secs(1),
            max_in_flight: 16,
        }
    }
}

/// Memory gate
pub struct MemoryGate {
    semaphore: Arc<Semaphore>,
    probe: Arc<dyn MemoryProbe>,
    config: GateConfig,
    waits: AtomicU64,
}

/// Proof of admission; dropping it releases the slot
#[derive(Debug)]
pub struct MemoryPermit {
    _permit: OwnedSemaphorePermit,
}

impl MemoryGate {
    pub fn new(probe: Arc<dyn MemoryProbe>, config: GateConfig) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            probe,
            config: GateConfig {
                max_in_flight,
                ..config
            },
            waits: AtomicU64::new(0),
        }
    }

    /// Gate over the host's real memory
    pub fn system(config: GateConfig) -> Self {
        Self::new(Arc::new(SystemMemory::new()), config)
    }

    /// Wait until the work may start
    ///
    /// When memory stays below the threshold and nothing else is in flight,
    /// the request is admitted anyway so the pipeline keeps moving.
    ///
    /// # Errors
    /// Returns `SyncError::GateClosed` after [`MemoryGate::close`].
    pub async fn admit(&self) -> Result<MemoryPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::GateClosed)?;

        loop {
            let available = self.probe.available_bytes();
            if available > self.config.threshold_bytes {
                break;
            }

            if self.in_flight() <= 1 {
                warn!(
                    available_bytes = available,
                    threshold_bytes = self.config.threshold_bytes,
                    "Memory below threshold with nothing in flight, admitting"
                );
                break;
            }

            self.waits.fetch_add(1, Ordering::Relaxed);
            observability::record_memory_gate_wait(available);
            debug!(
                available_bytes = available,
                in_flight = self.in_flight(),
                "Memory gate waiting"
            );
            tokio::time::sleep(self.config.recheck).await;

            if self.semaphore.is_closed() {
                return Err(SyncError::GateClosed);
            }
        }

        Ok(MemoryPermit { _permit: permit })
    }

    /// Work currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight - self.semaphore.available_permits()
    }

    /// Times an admission had to wait for memory
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Reject all pending and future admissions
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(probe: Arc<FixedMemory>, threshold: u64, max_in_flight: usize) -> Arc<MemoryGate> {
        Arc::new(MemoryGate::new(
            probe,
            GateConfig {
                threshold_bytes: threshold,
                recheck: Duration::from_millis(5),
                max_in_flight,
            },
        ))
    }

    #[tokio::test]
    async fn test_admits_when_memory_available() {
        let gate = gate(Arc::new(FixedMemory::new(1000)), 100, 4);
        let a = gate.admit().await.unwrap();
        let b = gate.admit().await.unwrap();
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.waits(), 0);
    }

    #[tokio::test]
    async fn test_blocks_below_threshold_until_memory_returns() {
        let probe = Arc::new(FixedMemory::new(1000));
        let gate = gate(probe.clone(), 100, 4);

        let first = gate.admit().await.unwrap();
        probe.set(50);

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiting.is_finished());

        probe.set(1000);
        waiting.await.unwrap().unwrap();
        assert!(gate.waits() > 0);
        drop(first);
    }

    #[tokio::test]
    async fn test_lone_request_admitted_under_pressure() {
        let gate = gate(Arc::new(FixedMemory::new(10)), 100, 4);
        let permit = tokio::time::timeout(Duration::from_millis(200), gate.admit())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(permit);
    }

    #[tokio::test]
    async fn test_in_flight_cap() {
        let gate = gate(Arc::new(FixedMemory::new(1000)), 100, 1);
        let first = gate.admit().await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(30), gate.admit()).await;
        assert!(second.is_err());

        drop(first);
        let _second = gate.admit().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_gate_rejects() {
        let gate = gate(Arc::new(FixedMemory::new(1000)), 100, 2);
        gate.close();
        assert!(matches!(gate.admit().await, Err(SyncError::GateClosed)));
    }

    #[test]
    fn test_system_probe_reports_memory() {
        assert!(SystemMemory::new().available_bytes() > 0);
    }
}
