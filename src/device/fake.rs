// Scriptable in-memory device and discovery for tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::device::manager::DeviceDiscovery;
use crate::device::traits::{Device, DeviceInfo, Platform};
use crate::errors::{SinanError, SinanResult};
use crate::perception::ui_tree::RawUiTree;

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub struct FakeDevice {
    serial: String,
    /// Successive `ui_tree` results; the last one repeats.
    trees: Mutex<VecDeque<RawUiTree>>,
    failing_screenshots: AtomicUsize,
    failing_trees: AtomicBool,
    accept_commands: AtomicBool,
    pub screenshots: AtomicUsize,
    pub taps: Mutex<Vec<(i32, i32)>>,
    pub swipes: Mutex<Vec<[i32; 4]>>,
    pub inputs: Mutex<Vec<String>>,
}

impl FakeDevice {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            trees: Mutex::new(VecDeque::from([RawUiTree::Xml("<hierarchy/>".into())])),
            failing_screenshots: AtomicUsize::new(0),
            failing_trees: AtomicBool::new(false),
            accept_commands: AtomicBool::new(true),
            screenshots: AtomicUsize::new(0),
            taps: Mutex::new(Vec::new()),
            swipes: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_xml(self, xml: &str) -> Self {
        self.with_trees(vec![RawUiTree::Xml(xml.to_string())])
    }

    pub fn with_trees(self, trees: Vec<RawUiTree>) -> Self {
        *self.trees.lock().unwrap() = trees.into();
        self
    }

    /// The next `n` screenshot calls fail with a transport error.
    pub fn failing_screenshots(self, n: usize) -> Self {
        self.failing_screenshots.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_trees(self) -> Self {
        self.failing_trees.store(true, Ordering::SeqCst);
        self
    }

    /// Physical commands return `Ok(false)`.
    pub fn rejecting_commands(self) -> Self {
        self.accept_commands.store(false, Ordering::SeqCst);
        self
    }

    pub fn tap_log(&self) -> Vec<(i32, i32)> {
        self.taps.lock().unwrap().clone()
    }

    pub fn screenshot_count(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn connect(&self) -> SinanResult<bool> {
        Ok(true)
    }

    async fn disconnect(&self) {}

    async fn tap(&self, x: i32, y: i32) -> SinanResult<bool> {
        self.taps.lock().unwrap().push((x, y));
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        _duration_ms: u32,
    ) -> SinanResult<bool> {
        self.swipes.lock().unwrap().push([x1, y1, x2, y2]);
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }

    async fn screenshot(&self) -> SinanResult<Vec<u8>> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_screenshots.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_screenshots.store(pending - 1, Ordering::SeqCst);
            return Err(SinanError::Device("screencap: device offline".into()));
        }
        Ok(PNG_BYTES.to_vec())
    }

    async fn ui_tree(&self) -> SinanResult<RawUiTree> {
        if self.failing_trees.load(Ordering::SeqCst) {
            return Err(SinanError::Device("uiautomator dump failed".into()));
        }
        let mut trees = self.trees.lock().unwrap();
        let tree = if trees.len() > 1 {
            trees.pop_front()
        } else {
            trees.front().cloned()
        };
        Ok(tree.unwrap_or_else(|| RawUiTree::Xml("<hierarchy/>".into())))
    }

    async fn input_text(&self, text: &str) -> SinanResult<bool> {
        self.inputs.lock().unwrap().push(text.to_string());
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }
}

/// Discovery that returns a scripted sequence of serial lists (the last repeats).
pub struct FakeDiscovery {
    polls: Mutex<VecDeque<Vec<String>>>,
    opened: AtomicUsize,
}

impl FakeDiscovery {
    pub fn new(polls: Vec<Vec<&str>>) -> Self {
        Self {
            polls: Mutex::new(
                polls
                    .into_iter()
                    .map(|p| p.into_iter().map(String::from).collect())
                    .collect(),
            ),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDiscovery for FakeDiscovery {
    async fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut polls = self.polls.lock().unwrap();
        let serials = if polls.len() > 1 {
            polls.pop_front().unwrap_or_default()
        } else {
            polls.front().cloned().unwrap_or_default()
        };
        serials
            .into_iter()
            .map(|serial| DeviceInfo {
                serial,
                platform: Platform::Android,
            })
            .collect()
    }

    fn open(&self, info: &DeviceInfo) -> Arc<dyn Device> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeDevice::new(&info.serial))
    }
}
