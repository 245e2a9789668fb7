//! Host link-quality sampling
//!
//! The sampler asks the host for a downlink speed estimate on a fixed cadence.
//! Hosts that cannot answer simply never produce a sample.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::protocol::Event;

/// Default sysfs directory listing network interfaces
pub const SYSFS_NET: &str = "/sys/class/net";

/// Source of a downlink speed estimate
pub trait LinkQuality: Send + 'static {
    /// Current downlink estimate in megabits per second, if the host can tell
    fn downlink_mbps(&self) -> Option<f64>;
}

/// Host without any link-quality capability
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl LinkQuality for Unsupported {
    fn downlink_mbps(&self) -> Option<f64> {
        None
    }
}

/// Constant estimate, for simulators and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedLinkSpeed(pub f64);

impl LinkQuality for FixedLinkSpeed {
    fn downlink_mbps(&self) -> Option<f64> {
        Some(self.0)
    }
}

/// Negotiated link speed reported by Linux in `/sys/class/net/<iface>/speed`
#[derive(Debug, Clone)]
pub struct SysfsLinkSpeed {
    root: PathBuf,
    interface: Option<String>,
}

impl SysfsLinkSpeed {
    /// Reads the speed of `interface`, or of the first usable interface when `None`
    pub fn new(interface: Option<String>) -> Self {
        Self::with_root(SYSFS_NET, interface)
    }

    /// Same as [`SysfsLinkSpeed::new`] with a different sysfs directory
    pub fn with_root(root: impl Into<PathBuf>, interface: Option<String>) -> Self {
        SysfsLinkSpeed {
            root: root.into(),
            interface,
        }
    }

    fn read_speed(path: &Path) -> Option<f64> {
        // Unplugged or virtual interfaces report -1 or fail the read
        let mbps = fs::read_to_string(path.join("speed"))
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()?;
        (mbps > 0).then_some(mbps as f64)
    }
}

impl LinkQuality for SysfsLinkSpeed {
    fn downlink_mbps(&self) -> Option<f64> {
        if let Some(name) = &self.interface {
            return Self::read_speed(&self.root.join(name));
        }

        let mut entries: Vec<_> = fs::read_dir(&self.root).ok()?.flatten().collect();
        entries.sort_by_key(|entry| entry.file_name());
        entries
            .iter()
            .filter(|entry| entry.file_name() != "lo")
            .find_map(|entry| Self::read_speed(&entry.path()))
    }
}

/// Periodic link-quality sampler
pub struct NetworkSampler {
    source: Box<dyn LinkQuality>,
    period: Duration,
}

impl NetworkSampler {
    /// Creates a sampler polling `source` every `period`
    pub fn new(source: impl LinkQuality, period: Duration) -> Self {
        NetworkSampler {
            source: Box::new(source),
            period,
        }
    }

    /// Sampling cadence
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Takes one sample; `None` when the host has no estimate
    pub fn sample(&self) -> Option<Event> {
        let downlink_mbps = self.source.downlink_mbps()?;
        trace!(downlink_mbps, "network sample");
        Some(Event::Network { downlink_mbps })
    }
}
