//! Separable resampling kernels
//!
//! The kernel only changes convolution weights; every filter goes through the
//! same two-pass (horizontal, then vertical) resampler.

use std::f32::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::Image;
use crate::chain::half_dimensions;
use crate::error::{Result, TextureError, ensure_finite};

/// Resampling kernel used to build each mip level
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// 2×2 average for even sizes
    #[default]
    Box,
    /// Linear (triangle) kernel
    Tent,
    /// Mitchell-Netravali with B = C = 1/3
    Mitchell,
    /// Windowed sinc with `lobes` lobes
    Lanczos { lobes: u32 },
    /// Kaiser-windowed sinc
    Kaiser { width: f32, alpha: f32 },
    /// Gaussian with standard deviation in destination pixels
    Gaussian { sigma: f32 },
}

impl FilterKind {
    /// Lanczos-3
    pub const LANCZOS3: Self = Self::Lanczos { lobes: 3 };
    /// Kaiser window with the usual width 3, alpha 4 setup
    pub const KAISER: Self = Self::Kaiser {
        width: 3.0,
        alpha: 4.0,
    };

    /// Kernel radius in destination pixels
    pub fn support(&self) -> f32 {
        match *self {
            Self::Box => 0.5,
            Self::Tent => 1.0,
            Self::Mitchell => 2.0,
            Self::Lanczos { lobes } => lobes as f32,
            Self::Kaiser { width, .. } => width,
            Self::Gaussian { sigma } => 3.0 * sigma,
        }
    }

    /// Kernel weight at distance `t` (destination pixels) from the center
    pub fn weight(&self, t: f32) -> f32 {
        let x = t.abs();
        match *self {
            Self::Box => {
                if x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Tent => (1.0 - x).max(0.0),
            Self::Mitchell => mitchell(x, 1.0 / 3.0, 1.0 / 3.0),
            Self::Lanczos { lobes } => {
                let n = lobes as f32;
                if x < n { sinc(x) * sinc(x / n) } else { 0.0 }
            }
            Self::Kaiser { width, alpha } => {
                if x < width {
                    let r = x / width;
                    sinc(x) * bessel_i0(alpha * (1.0 - r * r).sqrt()) / bessel_i0(alpha)
                } else {
                    0.0
                }
            }
            Self::Gaussian { sigma } => {
                if x <= 3.0 * sigma {
                    (-(x * x) / (2.0 * sigma * sigma)).exp()
                } else {
                    0.0
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Lanczos { lobes } if lobes == 0 => {
                Err(TextureError::invalid("filter.lobes", "must be at least 1"))
            }
            Self::Kaiser { width, alpha } => {
                ensure_finite("filter.width", width)?;
                ensure_finite("filter.alpha", alpha)?;
                if width <= 0.0 {
                    return Err(TextureError::invalid("filter.width", "must be positive"));
                }
                Ok(())
            }
            Self::Gaussian { sigma } => {
                ensure_finite("filter.sigma", sigma)?;
                if sigma <= 0.0 {
                    return Err(TextureError::invalid("filter.sigma", "must be positive"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// How samples outside the image are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Repeat the border pixel
    #[default]
    Clamp,
    /// Tile the image
    Wrap,
}

impl EdgeMode {
    #[inline]
    pub fn resolve(self, i: i64, len: u32) -> usize {
        let len = len as i64;
        match self {
            Self::Clamp => i.clamp(0, len - 1) as usize,
            Self::Wrap => i.rem_euclid(len) as usize,
        }
    }
}

#[inline]
fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

fn mitchell(x: f32, b: f32, c: f32) -> f32 {
    let x2 = x * x;
    let x3 = x2 * x;
    if x < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * x3 + (-18.0 + 12.0 * b + 6.0 * c) * x2 + (6.0 - 2.0 * b))
            / 6.0
    } else if x < 2.0 {
        ((-b - 6.0 * c) * x3 + (6.0 * b + 30.0 * c) * x2 + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

/// Modified Bessel function of the first kind, order 0 (power series)
fn bessel_i0(x: f32) -> f32 {
    let half = x as f64 / 2.0;
    let mut sum = 1.0f64;
    let mut term = 1.0f64;
    for k in 1..32 {
        term *= (half / k as f64) * (half / k as f64);
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
    }
    sum as f32
}

/// Source taps for one destination coordinate
type Taps = Vec<(usize, f32)>;

/// Weights mapping `src_len` samples onto `dst_len` samples.
fn resample_taps(src_len: u32, dst_len: u32, filter: &FilterKind, edge: EdgeMode) -> Vec<Taps> {
    let scale = src_len as f32 / dst_len as f32;
    // Widen the kernel when minifying so it covers every source sample.
    let filter_scale = scale.max(1.0);
    let support = filter.support() * filter_scale;

    (0..dst_len)
        .map(|d| {
            let center = (d as f32 + 0.5) * scale;
            let start = (center - support).floor() as i64;
            let end = (center + support).ceil() as i64;

            let mut taps: Taps = (start..=end)
                .filter_map(|i| {
                    let w = filter.weight((i as f32 + 0.5 - center) / filter_scale);
                    (w != 0.0).then(|| (edge.resolve(i, src_len), w))
                })
                .collect();
            normalize_taps(&mut taps, edge.resolve(center.floor() as i64, src_len));
            taps
        })
        .collect()
}

/// Largest accepted gaussian blur radius (standard deviation) in pixels
pub const MAX_BLUR_RADIUS: f32 = 64.0;

/// Same-size gaussian taps for blurring
fn blur_taps(len: u32, sigma: f32, edge: EdgeMode) -> Vec<Taps> {
    let sigma = sigma.min(MAX_BLUR_RADIUS);
    let radius = (3.0 * sigma).ceil() as i64;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|o| (-((o * o) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();

    (0..len as i64)
        .map(|d| {
            let mut taps: Taps = (-radius..=radius)
                .zip(&kernel)
                .map(|(o, &w)| (edge.resolve(d + o, len), w))
                .collect();
            normalize_taps(&mut taps, d as usize);
            taps
        })
        .collect()
}

fn normalize_taps(taps: &mut Taps, fallback: usize) {
    let total: f32 = taps.iter().map(|&(_, w)| w).sum();
    if total.abs() < 1e-8 {
        taps.clear();
        taps.push((fallback, 1.0));
    } else {
        for tap in taps.iter_mut() {
            tap.1 /= total;
        }
    }
}

/// Two-pass convolution producing a `dst_w`×`dst_h` image.
fn convolve_separable(image: &Image, x_taps: &[Taps], y_taps: &[Taps]) -> Image {
    let channels = image.channels() as usize;
    let dst_w = x_taps.len() as u32;
    let dst_h = y_taps.len() as u32;
    let src = image.data();
    let src_stride = image.row_stride();

    // Horizontal pass: dst_w × src_h
    let mut horizontal = image.blank_like(dst_w, image.height());
    let mid_stride = horizontal.row_stride();
    horizontal
        .data_mut()
        .par_chunks_mut(mid_stride)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src[y * src_stride..(y + 1) * src_stride];
            for (x, taps) in x_taps.iter().enumerate() {
                let out = &mut row[x * channels..(x + 1) * channels];
                for &(sx, w) in taps {
                    let px = &src_row[sx * channels..(sx + 1) * channels];
                    for (o, &s) in out.iter_mut().zip(px) {
                        *o += s * w;
                    }
                }
            }
        });

    // Vertical pass: dst_w × dst_h
    let mut output = image.blank_like(dst_w, dst_h);
    let mid = horizontal.data();
    output
        .data_mut()
        .par_chunks_mut(mid_stride)
        .zip(y_taps.par_iter())
        .for_each(|(row, taps)| {
            for &(sy, w) in taps {
                let src_row = &mid[sy * mid_stride..(sy + 1) * mid_stride];
                for (o, &s) in row.iter_mut().zip(src_row) {
                    *o += s * w;
                }
            }
        });

    output
}

/// Resample to arbitrary dimensions.
pub fn resample(
    image: &Image,
    dst_width: u32,
    dst_height: u32,
    filter: &FilterKind,
    edge: EdgeMode,
) -> Image {
    let x_taps = resample_taps(image.width(), dst_width, filter, edge);
    let y_taps = resample_taps(image.height(), dst_height, filter, edge);
    convolve_separable(image, &x_taps, &y_taps)
}

/// Produce the next mip level: half size, floored, never below 1.
pub fn downsample(image: &Image, filter: &FilterKind, edge: EdgeMode) -> Image {
    let (w, h) = half_dimensions(image.width(), image.height());
    resample(image, w, h, filter, edge)
}

/// Gaussian blur in place. `radius` is the standard deviation in pixels,
/// capped at [`MAX_BLUR_RADIUS`].
pub fn gaussian_blur(image: &mut Image, radius: f32, edge: EdgeMode) {
    if radius.is_nan() || radius <= 0.0 || image.is_empty() {
        return;
    }
    let x_taps = blur_taps(image.width(), radius, edge);
    let y_taps = blur_taps(image.height(), radius, edge);
    *image = convolve_separable(image, &x_taps, &y_taps);
}
