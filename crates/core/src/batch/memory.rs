//! Memory pressure sampling and the between-chunk guard.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::metrics::MEMORY_THROTTLES;

const MIB: f64 = 1024.0 * 1024.0;

/// Source of resident memory readings.
pub trait MemorySampler: Send + Sync {
    /// Current resident memory of this process in MiB, if it can be read.
    fn sample_mb(&self) -> Option<f64>;

    /// Asks the allocator or runtime to give memory back. No-op by default.
    fn request_reclaim(&self) {}
}

/// Reads the resident set size of the current process through `sysinfo`.
pub struct SysinfoSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Failed to get current process ID for memory sampling: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample_mb(&self) -> Option<f64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .map(|process| process.memory() as f64 / MIB)
    }
}

/// Between-chunk backpressure for one job.
///
/// Advisory only: after a cooldown the job continues even if memory is still
/// above the threshold.
#[derive(Clone)]
pub struct MemoryGuard {
    sampler: Arc<dyn MemorySampler>,
    threshold_mb: u64,
    cooldown: Duration,
}

impl MemoryGuard {
    pub fn new(sampler: Arc<dyn MemorySampler>, threshold_mb: u64, cooldown: Duration) -> Self {
        Self {
            sampler,
            threshold_mb,
            cooldown,
        }
    }

    pub fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    /// Latest reading, or `None` when the sampler is unavailable.
    pub fn sample(&self) -> Option<f64> {
        self.sampler.sample_mb()
    }

    /// True when the current reading exceeds the threshold. An unreadable
    /// sampler never throttles.
    pub fn should_throttle(&self) -> bool {
        self.sample().is_some_and(|mb| self.exceeds(mb))
    }

    /// True when `memory_mb` is above the threshold.
    pub fn exceeds(&self, memory_mb: f64) -> bool {
        memory_mb > self.threshold_mb as f64
    }

    /// Requests reclamation and waits the configured cooldown.
    ///
    /// Returns the reading taken after the wait.
    pub async fn cooldown(&self) -> Option<f64> {
        MEMORY_THROTTLES.inc();
        self.sampler.request_reclaim();
        tokio::time::sleep(self.cooldown).await;

        let after = self.sample();
        match after {
            Some(mb) if self.exceeds(mb) => {
                warn!(
                    "Memory still at {:.1}MB after cooldown (threshold {}MB), continuing",
                    mb, self.threshold_mb
                );
            }
            _ => debug!(memory_mb = ?after, "Memory cooldown finished"),
        }
        after
    }
}

impl std::fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("threshold_mb", &self.threshold_mb)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
