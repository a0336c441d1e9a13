//! DXGI Desktop Duplication screen capture for Windows.
//!
//! Uses the Direct3D 11 Desktop Duplication API to obtain GPU-backed
//! screen frames and copies them into a CPU-readable staging texture.
//!
//! # Platform
//!
//! This module is **Windows-only**. On other platforms
//! [`DxgiScreens`] enumerates no screens and every `open` fails with
//! [`CaptureError::Unsupported`].

use crate::capture::{ScreenCapture, ScreenInfo, ScreenProvider};
#[cfg(target_os = "windows")]
use crate::capture::types::RawScreenFrame;
use crate::error::CaptureError;

/// Default time to wait for a new desktop frame.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u32 = 50;

// ── DxgiScreens ──────────────────────────────────────────────────

/// DXGI-backed [`ScreenProvider`].
#[derive(Debug, Clone)]
pub struct DxgiScreens {
    /// How long `refresh` waits for the compositor before falling back
    /// to the previously captured frame.
    pub acquire_timeout_ms: u32,
}

impl Default for DxgiScreens {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

/// Capture bound to one DXGI output.
///
/// Wraps the `IDXGIOutputDuplication` pipeline:
///
/// 1. Create a D3D11 device on the output's adapter.
/// 2. Duplicate the output.
/// 3. Create a CPU-readable staging texture.
/// 4. On each [`refresh`](ScreenCapture::refresh):
///    - `AcquireNextFrame` (blocks up to the acquire timeout).
///    - Copy the desktop texture to the staging texture.
///    - Map, copy into the cached frame, unmap.
///
/// When the desktop has not changed the duplication API times out;
/// the cached frame from the previous refresh is returned instead.
#[cfg(target_os = "windows")]
pub struct DxgiCapture {
    frame: Option<RawScreenFrame>,
    inner: platform::Duplication,
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use std::time::{Duration, Instant};

    use windows::{
        Win32::Graphics::{
            Direct3D::D3D_DRIVER_TYPE_UNKNOWN,
            Direct3D11::*,
            Dxgi::{Common::*, *},
        },
        core::Interface,
    };

    use crate::capture::ScreenInfo;
    use crate::capture::types::{PixelFormat, RawScreenFrame};
    use crate::error::CaptureError;

    fn platform_err(what: &str, e: windows::core::Error) -> CaptureError {
        CaptureError::Platform(format!("{what} failed: {e}"))
    }

    /// Every attached output together with the adapter that drives it.
    pub(super) fn outputs() -> Result<Vec<(IDXGIAdapter1, IDXGIOutput, ScreenInfo)>, CaptureError> {
        let factory: IDXGIFactory1 =
            unsafe { CreateDXGIFactory1() }.map_err(|e| platform_err("CreateDXGIFactory1", e))?;

        let mut found = Vec::new();
        let mut adapter_index = 0;
        while let Ok(adapter) = unsafe { factory.EnumAdapters1(adapter_index) } {
            let mut output_index = 0;
            while let Ok(output) = unsafe { adapter.EnumOutputs(output_index) } {
                let desc = unsafe { output.GetDesc() }.map_err(|e| platform_err("GetDesc", e))?;
                if desc.AttachedToDesktop.as_bool() {
                    let len = desc.DeviceName.iter().position(|c| *c == 0).unwrap_or(desc.DeviceName.len());
                    let info = ScreenInfo {
                        name: String::from_utf16_lossy(&desc.DeviceName[..len]),
                        primary: desc.DesktopCoordinates.left == 0 && desc.DesktopCoordinates.top == 0,
                    };
                    found.push((adapter.clone(), output, info));
                }
                output_index += 1;
            }
            adapter_index += 1;
        }
        Ok(found)
    }

    pub(super) struct Duplication {
        width: u32,
        height: u32,
        timeout_ms: u32,
        context: ID3D11DeviceContext,
        duplication: IDXGIOutputDuplication,
        staging_texture: ID3D11Texture2D,
        // Keeps the device alive for as long as the duplication.
        _device: ID3D11Device,
    }

    // SAFETY: the COM objects are owned exclusively by this struct and
    // only touched from whichever task currently owns it; the immediate
    // context is never shared.
    unsafe impl Send for Duplication {}

    impl Duplication {
        pub(super) fn new(
            adapter: &IDXGIAdapter1,
            output: &IDXGIOutput,
            timeout_ms: u32,
        ) -> Result<Self, CaptureError> {
            unsafe { Self::init(adapter, output, timeout_ms) }
        }

        unsafe fn init(
            adapter: &IDXGIAdapter1,
            output: &IDXGIOutput,
            timeout_ms: u32,
        ) -> Result<Self, CaptureError> {
            // 1. D3D11 device on the adapter that owns this output.
            let adapter: IDXGIAdapter = adapter.cast().map_err(|e| platform_err("Cast to IDXGIAdapter", e))?;
            let mut device = None;
            let mut context = None;
            unsafe {
                D3D11CreateDevice(
                    &adapter,
                    D3D_DRIVER_TYPE_UNKNOWN,
                    None,
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    None,
                    D3D11_SDK_VERSION,
                    Some(&mut device),
                    None,
                    Some(&mut context),
                )
                .map_err(|e| platform_err("D3D11CreateDevice", e))?;
            }
            let device: ID3D11Device =
                device.ok_or_else(|| CaptureError::Platform("D3D11 device is None".into()))?;
            let context: ID3D11DeviceContext =
                context.ok_or_else(|| CaptureError::Platform("D3D11 context is None".into()))?;

            // 2. Duplicate the output.
            let output1: IDXGIOutput1 = output.cast().map_err(|e| platform_err("Cast to IDXGIOutput1", e))?;
            let duplication =
                unsafe { output1.DuplicateOutput(&device) }.map_err(|e| platform_err("DuplicateOutput", e))?;

            let dup_desc = unsafe { duplication.GetDesc() };
            let width = dup_desc.ModeDesc.Width;
            let height = dup_desc.ModeDesc.Height;

            // 3. CPU-readable staging texture.
            let staging_desc = D3D11_TEXTURE2D_DESC {
                Width: width,
                Height: height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Usage: D3D11_USAGE_STAGING,
                BindFlags: 0,
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: 0,
            };
            let mut staging_texture = None;
            unsafe {
                device
                    .CreateTexture2D(&staging_desc, None, Some(&mut staging_texture))
                    .map_err(|e| platform_err("CreateTexture2D (staging)", e))?;
            }
            let staging_texture =
                staging_texture.ok_or_else(|| CaptureError::Platform("staging texture is None".into()))?;

            Ok(Self {
                width,
                height,
                timeout_ms,
                context,
                duplication,
                staging_texture,
                _device: device,
            })
        }

        /// Copy the next desktop frame into `frame`.
        ///
        /// Returns `Ok(false)` when no new frame arrived within the
        /// acquire timeout; `frame` is left untouched.
        pub(super) fn acquire_into(&mut self, frame: &mut Option<RawScreenFrame>) -> Result<bool, CaptureError> {
            unsafe { self.acquire_inner(frame) }
        }

        unsafe fn acquire_inner(&mut self, frame: &mut Option<RawScreenFrame>) -> Result<bool, CaptureError> {
            let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource = None;

            match unsafe {
                self.duplication
                    .AcquireNextFrame(self.timeout_ms, &mut frame_info, &mut resource)
            } {
                Ok(()) => {}
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(false),
                Err(e) => return Err(platform_err("AcquireNextFrame", e)),
            }

            let resource = resource.ok_or_else(|| CaptureError::Platform("acquired resource is None".into()))?;
            let texture: ID3D11Texture2D = resource.cast().map_err(|e| {
                let _ = unsafe { self.duplication.ReleaseFrame() };
                platform_err("Cast to ID3D11Texture2D", e)
            })?;

            unsafe { self.context.CopyResource(&self.staging_texture, &texture) };
            let _ = unsafe { self.duplication.ReleaseFrame() };

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            unsafe {
                self.context
                    .Map(&self.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                    .map_err(|e| platform_err("Map", e))?;
            }

            let stride = mapped.RowPitch;
            let total_bytes = stride as usize * self.height as usize;
            let src = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, total_bytes) };

            // Reuse the previous buffer when the geometry is unchanged.
            match frame {
                Some(f) if f.stride == stride && f.data.len() == total_bytes => {
                    f.data.copy_from_slice(src);
                    f.timestamp = Instant::now();
                }
                _ => {
                    *frame = Some(RawScreenFrame {
                        width: self.width,
                        height: self.height,
                        stride,
                        format: PixelFormat::Bgra8,
                        data: src.to_vec(),
                        timestamp: Instant::now(),
                    });
                }
            }

            unsafe { self.context.Unmap(&self.staging_texture, 0) };
            Ok(true)
        }

        pub(super) fn timeout(&self) -> Duration {
            Duration::from_millis(u64::from(self.timeout_ms))
        }
    }
}

#[cfg(target_os = "windows")]
impl ScreenProvider for DxgiScreens {
    fn screens(&self) -> Vec<ScreenInfo> {
        match platform::outputs() {
            Ok(outputs) => outputs.into_iter().map(|(_, _, info)| info).collect(),
            Err(e) => {
                tracing::warn!("screen enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn open(&self, name: &str) -> Result<Box<dyn ScreenCapture>, CaptureError> {
        let outputs = platform::outputs()?;
        let infos: Vec<ScreenInfo> = outputs.iter().map(|(_, _, info)| info.clone()).collect();
        let chosen = crate::capture::select_screen(&infos, name)
            .ok_or_else(|| CaptureError::UnknownScreen(name.to_string()))?;
        let (adapter, output, info) = outputs
            .iter()
            .find(|(_, _, info)| info.name == chosen.name)
            .ok_or_else(|| CaptureError::UnknownScreen(name.to_string()))?;

        let inner = platform::Duplication::new(adapter, output, self.acquire_timeout_ms)?;
        tracing::debug!("capturing {}", info.name);
        Ok(Box::new(DxgiCapture { frame: None, inner }))
    }
}

#[cfg(target_os = "windows")]
impl ScreenCapture for DxgiCapture {
    fn refresh(&mut self) -> Result<&RawScreenFrame, CaptureError> {
        let fresh = self.inner.acquire_into(&mut self.frame)?;
        match self.frame.as_ref() {
            Some(frame) => Ok(frame),
            None if !fresh => Err(CaptureError::Timeout(self.inner.timeout())),
            None => Err(CaptureError::Platform("no frame after acquire".into())),
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl ScreenProvider for DxgiScreens {
    fn screens(&self) -> Vec<ScreenInfo> {
        Vec::new()
    }

    fn open(&self, _name: &str) -> Result<Box<dyn ScreenCapture>, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}
