//! Raw frame types produced by screen capture.

use std::time::Instant;

use crate::device::Rgb;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (DXGI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// Read one pixel as RGB.
    fn rgb(self, px: &[u8]) -> Rgb {
        match self {
            PixelFormat::Bgra8 => Rgb::new(px[2], px[1], px[0]),
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => Rgb::new(px[0], px[1], px[2]),
        }
    }
}

// ── RawScreenFrame ───────────────────────────────────────────────

/// A raw, uncompressed screen capture obtained from the OS.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` due to
/// GPU row-alignment requirements.
#[derive(Debug, Clone)]
pub struct RawScreenFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl RawScreenFrame {
    /// A tightly packed frame filled with one colour.
    pub fn solid(width: u32, height: u32, color: Rgb) -> Self {
        let format = PixelFormat::Bgra8;
        let stride = width * format.bytes_per_pixel() as u32;
        let data = [color.b, color.g, color.r, 0xFF]
            .iter()
            .copied()
            .cycle()
            .take(stride as usize * height as usize)
            .collect();
        Self {
            width,
            height,
            stride,
            format,
            data,
            timestamp: Instant::now(),
        }
    }

    /// Total byte size the raw bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Average colour over every `step`-th pixel in both axes.
    ///
    /// A `step` of 0 is treated as 1. Pixels that fall outside `data`
    /// (a truncated buffer) are skipped. An empty frame averages to
    /// black.
    pub fn average_color(&self, step: u32) -> Rgb {
        let step = step.max(1) as usize;
        let bpp = self.format.bytes_per_pixel();
        let stride = self.stride as usize;

        let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
        for y in (0..self.height as usize).step_by(step) {
            let row = y * stride;
            for x in (0..self.width as usize).step_by(step) {
                let offset = row + x * bpp;
                let Some(px) = self.data.get(offset..offset + bpp) else {
                    continue;
                };
                let c = self.format.rgb(px);
                r += u64::from(c.r);
                g += u64::from(c.g);
                b += u64::from(c.b);
                count += 1;
            }
        }

        if count == 0 {
            return Rgb::BLACK;
        }
        // Each mean is at most 255.
        Rgb::new((r / count) as u8, (g / count) as u8, (b / count) as u8)
    }
}
