//! Fixed-interval device discovery poller.
//!
//! Compares the set of attached serials between polls and broadcasts a
//! [`DeviceChangeEvent`] whenever devices appear or disappear. Runs
//! independently of any execution session.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::device::manager::DeviceDiscovery;
use crate::device::traits::DeviceInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceChangeEvent {
    pub devices: Vec<DeviceInfo>,
    pub connected: Vec<String>,
    pub disconnected: Vec<String>,
}

pub struct DeviceMonitor {
    discovery: Arc<dyn DeviceDiscovery>,
    interval: Duration,
    tx: broadcast::Sender<DeviceChangeEvent>,
    stop_flag: AtomicBool,
}

impl DeviceMonitor {
    pub fn new(discovery: Arc<dyn DeviceDiscovery>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            discovery,
            interval,
            tx,
            stop_flag: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceChangeEvent> {
        self.tx.subscribe()
    }

    /// Ends [`run`](Self::run) at its next poll.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Polls until stopped. The first poll only records the baseline.
    pub async fn run(&self) {
        let mut last = serials(&self.discovery.list_devices().await);
        tracing::info!(devices = last.len(), interval = ?self.interval, "device monitor started");

        while !self.stop_flag.load(Ordering::Relaxed) {
            tokio::time::sleep(self.interval).await;
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let devices = self.discovery.list_devices().await;
            let current = serials(&devices);
            if let Some(event) = diff(&last, &current, devices) {
                tracing::info!(
                    connected = ?event.connected,
                    disconnected = ?event.disconnected,
                    "device set changed"
                );
                // No subscribers is fine: nobody is listening right now.
                let _ = self.tx.send(event);
                last = current;
            }
        }
        tracing::info!("device monitor stopped");
    }
}

fn serials(devices: &[DeviceInfo]) -> BTreeSet<String> {
    devices.iter().map(|d| d.serial.clone()).collect()
}

fn diff(
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
    devices: Vec<DeviceInfo>,
) -> Option<DeviceChangeEvent> {
    let connected: Vec<String> = current.difference(previous).cloned().collect();
    let disconnected: Vec<String> = previous.difference(current).cloned().collect();
    if connected.is_empty() && disconnected.is_empty() {
        return None;
    }
    Some(DeviceChangeEvent {
        devices,
        connected,
        disconnected,
    })
}
