//! # Yeelight LAN transport
//!
//! Concrete [`DeviceClient`] / [`DeviceLocator`] for Yeelight bulbs
//! with "LAN control" enabled.
//!
//! | Module       | Purpose                                          |
//! |------------- |--------------------------------------------------|
//! | `message`    | JSON request / reply / notification types         |
//! | `codec`      | `\r\n`-delimited framing for `tokio_util`         |
//! | `connection` | Control connection with id-matched replies        |
//! | `discovery`  | Multicast search and advertisement parsing        |
//!
//! ## Streaming ("music") mode
//!
//! A bulb rate-limits commands on its control connection. In music
//! mode the client listens on a local port, asks the bulb to connect
//! back (`set_music [1, host, port]`), and then pushes `set_*`
//! commands over that connection without waiting for replies.

pub mod codec;
pub mod connection;
pub mod discovery;
pub mod message;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use crate::device::{
    DeviceClient, DeviceLocator, DeviceResult, FaultSink, Property, Rgb, SharedDevice, Smoothing,
};
use crate::error::DeviceError;

use self::codec::YeelightCodec;
use self::connection::{ControlConnection, FaultRelay};
use self::message::{Method, Request, property_value, with_effect};

pub use self::discovery::BulbInfo;

/// Default control port of a Yeelight bulb.
pub const DEFAULT_PORT: u16 = 55443;

// ── YeelightDevice ───────────────────────────────────────────────

/// One Yeelight bulb.
pub struct YeelightDevice {
    info: BulbInfo,
    timeout: Duration,
    control: OnceCell<ControlConnection>,
    music: Mutex<Option<FramedWrite<TcpStream, YeelightCodec>>>,
    music_id: AtomicU64,
    faults: Arc<OnceLock<FaultSink>>,
}

impl YeelightDevice {
    pub fn new(info: BulbInfo, timeout: Duration) -> Self {
        Self {
            info,
            timeout,
            control: OnceCell::new(),
            music: Mutex::new(None),
            music_id: AtomicU64::new(1),
            faults: Arc::new(OnceLock::new()),
        }
    }

    fn control(&self) -> DeviceResult<&ControlConnection> {
        self.control.get().ok_or(DeviceError::NotConnected)
    }

    /// Send a `set_*` command over the music connection when streaming,
    /// or over the control connection otherwise.
    async fn command(&self, method: Method, params: Vec<Value>) -> DeviceResult<()> {
        {
            let mut music = self.music.lock().await;
            if let Some(stream) = music.as_mut() {
                let id = self.music_id.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = stream.send(Request::new(id, method, params)).await {
                    *music = None;
                    warn!("music connection to {} lost: {e}", self.info.address);
                    return Err(e);
                }
                return Ok(());
            }
        }
        self.control()?.call(method, params).await.map(|_| ())
    }
}

#[async_trait]
impl DeviceClient for YeelightDevice {
    fn address(&self) -> String {
        self.info.address.to_string()
    }

    async fn connect(&self) -> DeviceResult<()> {
        let relay = FaultRelay::new(self.address(), Arc::clone(&self.faults));
        self.control
            .get_or_try_init(|| ControlConnection::open(self.info.address, self.timeout, relay))
            .await?;
        Ok(())
    }

    async fn get_property(&self, property: Property) -> DeviceResult<String> {
        let result = self
            .control()?
            .call(Method::GetProp, vec![json!(property.name())])
            .await?;
        property_value(&result)
    }

    async fn set_power(&self, on: bool, smoothing: Smoothing) -> DeviceResult<()> {
        let state = if on { "on" } else { "off" };
        self.command(Method::SetPower, with_effect(json!(state), smoothing))
            .await
    }

    async fn set_brightness(&self, percent: u8, smoothing: Smoothing) -> DeviceResult<()> {
        let percent = percent.clamp(1, 100);
        self.command(Method::SetBright, with_effect(json!(percent), smoothing))
            .await
    }

    async fn set_color_temperature(&self, kelvin: u16, smoothing: Smoothing) -> DeviceResult<()> {
        self.command(Method::SetCtAbx, with_effect(json!(kelvin), smoothing))
            .await
    }

    async fn set_rgb(&self, color: Rgb, smoothing: Smoothing) -> DeviceResult<()> {
        self.command(Method::SetRgb, with_effect(json!(color.to_packed()), smoothing))
            .await
    }

    async fn start_streaming(&self) -> DeviceResult<()> {
        let control = self.control()?;
        let mut music = self.music.lock().await;
        if music.is_some() {
            return Ok(());
        }

        let host = control.local_ip();
        let listener = TcpListener::bind((host, 0)).await?;
        let port = listener.local_addr()?.port();
        control
            .call(Method::SetMusic, vec![json!(1), json!(host.to_string()), json!(port)])
            .await?;

        let (stream, peer) = tokio::time::timeout(self.timeout, listener.accept())
            .await
            .map_err(|_| DeviceError::Timeout(self.timeout))??;
        stream.set_nodelay(true)?;
        info!("music connection from {peer} on {host}:{port}");
        *music = Some(FramedWrite::new(stream, YeelightCodec::default()));
        Ok(())
    }

    async fn stop_streaming(&self) -> DeviceResult<()> {
        if self.music.lock().await.take().is_none() {
            debug!("stop_streaming: {} is not streaming", self.info.address);
            return Ok(());
        }
        self.control()?
            .call(Method::SetMusic, vec![json!(0)])
            .await
            .map(|_| ())
    }

    fn subscribe_faults(&self, sink: FaultSink) {
        if self.faults.set(sink).is_err() {
            warn!("fault observer for {} already registered", self.info.address);
        }
    }
}

// ── YeelightLocator ──────────────────────────────────────────────

/// Discovers bulbs on the LAN or builds handles for known addresses.
#[derive(Debug, Clone)]
pub struct YeelightLocator {
    /// Port assumed for bare IP addresses.
    pub port: u16,
    /// How long each discovery attempt listens for answers.
    pub discovery_timeout: Duration,
    /// Connect / reply deadline for every device built by this locator.
    pub request_timeout: Duration,
}

impl Default for YeelightLocator {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            discovery_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl YeelightLocator {
    /// Parse `ip` or `ip:port`.
    pub fn parse_address(&self, address: &str) -> DeviceResult<SocketAddr> {
        let address = address.trim();
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }
        address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|_| DeviceError::InvalidAddress(address.to_string()))
    }
}

#[async_trait]
impl DeviceLocator for YeelightLocator {
    async fn discover(&self, max_retries: u32) -> DeviceResult<Vec<SharedDevice>> {
        let bulbs = discovery::search(self.discovery_timeout, max_retries).await?;
        Ok(bulbs
            .into_iter()
            .map(|info| Arc::new(YeelightDevice::new(info, self.request_timeout)) as SharedDevice)
            .collect())
    }

    fn at_address(&self, address: &str) -> DeviceResult<SharedDevice> {
        let addr = self.parse_address(address)?;
        Ok(Arc::new(YeelightDevice::new(
            BulbInfo::from_address(addr),
            self.request_timeout,
        )))
    }
}
