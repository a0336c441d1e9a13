//! Perceptual scaling curves.
//!
//! [`sqrt_scale`] maps a linear device value onto a slider position so
//! that low brightness/temperature steps get more of the slider's
//! travel. [`sq_scale`] is its exact inverse, turning a slider position
//! back into the linear value sent to the device.

/// Clamp `x` into `[min, max]`.
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    x.clamp(min, max)
}

/// Map `x` from `[min, max]` onto `[0, 1]`.
pub fn normalize(x: f64, min: f64, max: f64) -> f64 {
    (x - min) / (max - min)
}

/// Map `x` from `[0, 1]` back onto `[min, max]`.
pub fn denormalize(x: f64, min: f64, max: f64) -> f64 {
    x * (max - min) + min
}

/// Clamp, normalize, square, denormalize.
pub fn sq_scale(x: f64, min: f64, max: f64) -> f64 {
    let n = normalize(clamp(x, min, max), min, max);
    denormalize(n * n, min, max)
}

/// Clamp, normalize, square-root, denormalize.
pub fn sqrt_scale(x: f64, min: f64, max: f64) -> f64 {
    let n = normalize(clamp(x, min, max), min, max);
    denormalize(n.sqrt(), min, max)
}

/// Scale a `[0, 1]` factor into an integer device range, rounding to
/// the nearest step and clamping into `[min, max]`.
pub fn to_device_range(x: f32, min: u8, max: u8) -> u8 {
    let scaled = (x * f32::from(max)).clamp(f32::from(min), f32::from(max));
    // NaN falls through clamp untouched; `as` saturates it to 0.
    (scaled.round() as u8).clamp(min, max)
}
