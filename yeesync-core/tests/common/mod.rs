//! In-memory fakes for the device and capture boundaries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use yeesync_core::error::{CaptureError, DeviceError};
use yeesync_core::{
    DeviceClient, DeviceLocator, FaultSink, Property, RawScreenFrame, Rgb, ScreenCapture, ScreenInfo,
    ScreenProvider, SharedDevice, Smoothing,
};

// ── FakeDevice ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Get(Property),
    Power(bool),
    Brightness(u8),
    ColorTemperature(u16),
    Rgb(Rgb),
    StartStreaming,
    StopStreaming,
}

pub struct FakeDevice {
    address: String,
    props: Mutex<HashMap<Property, String>>,
    calls: Mutex<Vec<Call>>,
    /// When set, `set_color_temperature` waits on `release`.
    pub hold_color_temperature: AtomicBool,
    pub release: Notify,
    /// When set, `set_rgb` fails.
    pub fail_rgb: AtomicBool,
    pub fail_connect: AtomicBool,
    pub fail_streaming: AtomicBool,
    pub faults: OnceLock<FaultSink>,
}

impl FakeDevice {
    pub fn new(address: &str) -> Arc<Self> {
        Self::with_props(address, "off", "50", "4000")
    }

    pub fn with_props(address: &str, power: &str, bright: &str, ct: &str) -> Arc<Self> {
        let props = HashMap::from([
            (Property::Power, power.to_string()),
            (Property::Brightness, bright.to_string()),
            (Property::ColorTemperature, ct.to_string()),
        ]);
        Arc::new(Self {
            address: address.to_string(),
            props: Mutex::new(props),
            calls: Mutex::new(Vec::new()),
            hold_color_temperature: AtomicBool::new(false),
            release: Notify::new(),
            fail_rgb: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_streaming: AtomicBool::new(false),
            faults: OnceLock::new(),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn rgb_writes(&self) -> usize {
        self.count(|c| matches!(c, Call::Rgb(_)))
    }

    pub fn brightness_writes(&self) -> usize {
        self.count(|c| matches!(c, Call::Brightness(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceClient for FakeDevice {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.record(Call::Connect);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout(Duration::from_millis(1)));
        }
        Ok(())
    }

    async fn get_property(&self, property: Property) -> Result<String, DeviceError> {
        self.record(Call::Get(property));
        self.props
            .lock()
            .unwrap()
            .get(&property)
            .cloned()
            .ok_or(DeviceError::NotConnected)
    }

    async fn set_power(&self, on: bool, _: Smoothing) -> Result<(), DeviceError> {
        self.record(Call::Power(on));
        Ok(())
    }

    async fn set_brightness(&self, percent: u8, _: Smoothing) -> Result<(), DeviceError> {
        self.record(Call::Brightness(percent));
        Ok(())
    }

    async fn set_color_temperature(&self, kelvin: u16, _: Smoothing) -> Result<(), DeviceError> {
        self.record(Call::ColorTemperature(kelvin));
        if self.hold_color_temperature.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(())
    }

    async fn set_rgb(&self, color: Rgb, _: Smoothing) -> Result<(), DeviceError> {
        self.record(Call::Rgb(color));
        if self.fail_rgb.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout(Duration::from_millis(1)));
        }
        Ok(())
    }

    async fn start_streaming(&self) -> Result<(), DeviceError> {
        self.record(Call::StartStreaming);
        if self.fail_streaming.load(Ordering::SeqCst) {
            return Err(DeviceError::ChannelClosed);
        }
        Ok(())
    }

    async fn stop_streaming(&self) -> Result<(), DeviceError> {
        self.record(Call::StopStreaming);
        Ok(())
    }

    fn subscribe_faults(&self, sink: FaultSink) {
        let _ = self.faults.set(sink);
    }
}

// ── FakeLocator ──────────────────────────────────────────────────

pub struct FakeLocator {
    pub found: Vec<SharedDevice>,
    pub fallback: SharedDevice,
    pub fail_discovery: bool,
    pub requested: Mutex<Vec<String>>,
}

impl FakeLocator {
    pub fn finding(found: Vec<SharedDevice>, fallback: SharedDevice) -> Arc<Self> {
        Arc::new(Self {
            found,
            fallback,
            fail_discovery: false,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(fallback: SharedDevice) -> Arc<Self> {
        Arc::new(Self {
            found: Vec::new(),
            fallback,
            fail_discovery: true,
            requested: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeviceLocator for FakeLocator {
    async fn discover(&self, _max_retries: u32) -> Result<Vec<SharedDevice>, DeviceError> {
        if self.fail_discovery {
            return Err(DeviceError::Timeout(Duration::from_millis(1)));
        }
        Ok(self.found.clone())
    }

    fn at_address(&self, address: &str) -> Result<SharedDevice, DeviceError> {
        self.requested.lock().unwrap().push(address.to_string());
        Ok(Arc::clone(&self.fallback))
    }
}

// ── FakeScreens ──────────────────────────────────────────────────

/// Every capture shows `color`. Tracks how many captures are alive at
/// once.
#[derive(Default)]
pub struct FakeScreens {
    pub color: Arc<Mutex<Rgb>>,
    pub opened: AtomicUsize,
    live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    pub opened_names: Mutex<Vec<String>>,
}

impl FakeScreens {
    pub fn showing(color: Rgb) -> Arc<Self> {
        let screens = Self::default();
        *screens.color.lock().unwrap() = color;
        Arc::new(screens)
    }

    pub fn set_color(&self, color: Rgb) {
        *self.color.lock().unwrap() = color;
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl ScreenProvider for FakeScreens {
    fn screens(&self) -> Vec<ScreenInfo> {
        vec![
            ScreenInfo {
                name: r"\\.\DISPLAY1".into(),
                primary: true,
            },
            ScreenInfo {
                name: r"\\.\DISPLAY2".into(),
                primary: false,
            },
        ]
    }

    fn open(&self, name: &str) -> Result<Box<dyn ScreenCapture>, CaptureError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.opened_names.lock().unwrap().push(name.to_string());
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            color: Arc::clone(&self.color),
            live: Arc::clone(&self.live),
            frame: RawScreenFrame::solid(8, 8, Rgb::BLACK),
        }))
    }
}

struct FakeCapture {
    color: Arc<Mutex<Rgb>>,
    live: Arc<AtomicUsize>,
    frame: RawScreenFrame,
}

impl ScreenCapture for FakeCapture {
    fn refresh(&mut self) -> Result<&RawScreenFrame, CaptureError> {
        let color = *self.color.lock().unwrap();
        self.frame = RawScreenFrame::solid(8, 8, color);
        Ok(&self.frame)
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
