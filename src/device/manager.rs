//! Device discovery and the registry of connected devices.
//!
//! The registry is an explicit value owned by whoever runs sessions; there is no
//! process-wide device table. Each serial has a lease lock so that at most one
//! session issues physical commands to a device at a time.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::device::android::AndroidDevice;
use crate::device::harmony::HarmonyDevice;
use crate::device::shell;
use crate::device::traits::{Device, DeviceInfo, Platform};
use crate::errors::{SinanError, SinanResult};

/// Enumerates attached devices and opens drivers for them.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn list_devices(&self) -> Vec<DeviceInfo>;

    fn open(&self, info: &DeviceInfo) -> Arc<dyn Device>;
}

/// Discovery through the `adb` and `hdc` host tools. A missing tool simply
/// contributes no devices.
pub struct ShellDiscovery;

#[async_trait]
impl DeviceDiscovery for ShellDiscovery {
    async fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        match shell::run("adb", &["devices"]).await {
            Ok(out) => devices.extend(parse_adb_devices(&out.stdout_lossy())),
            Err(e) => tracing::debug!(error = %e, "adb unavailable"),
        }
        match shell::run("hdc", &["list", "targets"]).await {
            Ok(out) => devices.extend(parse_hdc_targets(&out.stdout_lossy())),
            Err(e) => tracing::debug!(error = %e, "hdc unavailable"),
        }

        devices
    }

    fn open(&self, info: &DeviceInfo) -> Arc<dyn Device> {
        match info.platform {
            Platform::Android => Arc::new(AndroidDevice::new(&info.serial)),
            Platform::Harmony => Arc::new(HarmonyDevice::new(&info.serial)),
        }
    }
}

/// Parses `adb devices`: a header line, then `serial\tstate` rows. Only rows in
/// the `device` state are usable.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (serial, state) = line.split_once('\t')?;
            (state.trim() == "device").then(|| DeviceInfo {
                serial: serial.trim().to_string(),
                platform: Platform::Android,
            })
        })
        .collect()
}

/// Parses `hdc list targets`: one serial per line, or `[Empty]` when none.
pub fn parse_hdc_targets(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .map(|serial| DeviceInfo {
            serial: serial.to_string(),
            platform: Platform::Harmony,
        })
        .collect()
}

struct DeviceSlot {
    device: Arc<dyn Device>,
    lease: Arc<Mutex<()>>,
}

/// Exclusive use of one device. Dropping the lease releases the device.
pub struct DeviceLease {
    device: Arc<dyn Device>,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceLease {
    pub fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }
}

pub struct DeviceRegistry {
    discovery: Arc<dyn DeviceDiscovery>,
    slots: Mutex<HashMap<String, Arc<DeviceSlot>>>,
}

impl DeviceRegistry {
    pub fn new(discovery: Arc<dyn DeviceDiscovery>) -> Self {
        Self {
            discovery,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        self.discovery.list_devices().await
    }

    /// Registers an already-connected device under its serial.
    #[cfg(test)]
    pub(crate) async fn insert(&self, device: Arc<dyn Device>) {
        let serial = device.serial().to_string();
        self.slots.lock().await.insert(
            serial,
            Arc::new(DeviceSlot {
                device,
                lease: Arc::new(Mutex::new(())),
            }),
        );
    }

    /// Waits until no other session holds `serial`, then takes it.
    pub async fn acquire(&self, serial: &str) -> SinanResult<DeviceLease> {
        let slot = self.slot(serial).await?;
        let guard = slot.lease.clone().lock_owned().await;
        tracing::debug!(serial, "device lease acquired");
        Ok(DeviceLease {
            device: slot.device.clone(),
            _guard: guard,
        })
    }

    /// Disconnects every cached device and forgets it; the next `acquire`
    /// discovers and connects again.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.slots.lock().await.drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.device.disconnect().await;
        }
    }

    /// Cached slot for `serial`, discovering and connecting the device on first
    /// use. Slots are kept for the registry's lifetime.
    async fn slot(&self, serial: &str) -> SinanResult<Arc<DeviceSlot>> {
        if let Some(slot) = self.slots.lock().await.get(serial) {
            return Ok(slot.clone());
        }

        // Discovery and connect run unlocked so a slow host tool only delays this serial.
        let info = self
            .discovery
            .list_devices()
            .await
            .into_iter()
            .find(|d| d.serial == serial)
            .ok_or_else(|| SinanError::Device(format!("device {serial} not found")))?;

        let device = self.discovery.open(&info);
        if !device.connect().await? {
            return Err(SinanError::Device(format!("failed to connect to {serial}")));
        }
        tracing::info!(serial, platform = %info.platform, "device connected");

        // A concurrent first use may have won the race; its slot is kept.
        let slot = self
            .slots
            .lock()
            .await
            .entry(serial.to_string())
            .or_insert_with(|| {
                Arc::new(DeviceSlot {
                    device,
                    lease: Arc::new(Mutex::new(())),
                })
            })
            .clone();
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{FakeDevice, FakeDiscovery};
    use std::time::Duration;

    #[test]
    fn adb_device_list() {
        let out = "List of devices attached\nemulator-5554\tdevice\nR58M\tunauthorized\n0123ABC\tdevice\n\n";
        let serials: Vec<String> = parse_adb_devices(out).into_iter().map(|d| d.serial).collect();
        assert_eq!(serials, vec!["emulator-5554", "0123ABC"]);
    }

    #[test]
    fn hdc_target_list() {
        assert!(parse_hdc_targets("[Empty]\n").is_empty());
        let devices = parse_hdc_targets("23E0223B28002180\n\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].platform, Platform::Harmony);
    }

    /// Discovery whose host tool never answers.
    struct StalledDiscovery;

    #[async_trait]
    impl DeviceDiscovery for StalledDiscovery {
        async fn list_devices(&self) -> Vec<DeviceInfo> {
            std::future::pending().await
        }

        fn open(&self, info: &DeviceInfo) -> Arc<dyn Device> {
            Arc::new(FakeDevice::new(&info.serial))
        }
    }

    #[tokio::test]
    async fn unknown_serial_is_an_error() {
        let registry = DeviceRegistry::new(Arc::new(FakeDiscovery::new(vec![vec![]])));
        assert!(registry.acquire("nope").await.is_err());
    }

    #[tokio::test]
    async fn discovered_device_is_connected_and_cached() {
        let discovery = Arc::new(FakeDiscovery::new(vec![vec!["A1"]]));
        let registry = DeviceRegistry::new(discovery.clone());
        let first = registry.acquire("A1").await.unwrap().device();
        let second = registry.acquire("A1").await.unwrap().device();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discovery.opened(), 1);
    }

    #[tokio::test]
    async fn shutdown_evicts_cached_devices() {
        let discovery = Arc::new(FakeDiscovery::new(vec![vec!["A1"]]));
        let registry = DeviceRegistry::new(discovery.clone());
        drop(registry.acquire("A1").await.unwrap());

        registry.shutdown().await;
        drop(registry.acquire("A1").await.unwrap());
        assert_eq!(discovery.opened(), 2);
    }

    #[tokio::test]
    async fn slow_discovery_does_not_block_known_devices() {
        let registry = Arc::new(DeviceRegistry::new(Arc::new(StalledDiscovery)));
        registry.insert(Arc::new(FakeDevice::new("A1"))).await;

        let stalled = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("B2").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let lease = tokio::time::timeout(Duration::from_secs(1), registry.acquire("A1")).await;
        assert!(matches!(lease, Ok(Ok(_))));
        assert!(!stalled.is_finished());
        stalled.abort();
    }

    #[tokio::test]
    async fn lease_is_exclusive_per_device() {
        let registry = Arc::new(DeviceRegistry::new(Arc::new(FakeDiscovery::new(vec![]))));
        registry.insert(Arc::new(FakeDevice::new("A1"))).await;

        let lease = registry.acquire("A1").await.unwrap();
        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("A1").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(lease);
        let acquired = tokio::time::timeout(Duration::from_secs(1), contender).await;
        assert!(matches!(acquired, Ok(Ok(Ok(())))));
    }
}
