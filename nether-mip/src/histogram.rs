//! Histogram-based dynamic range normalization
//!
//! [`analyze_histogram`] measures robust low/high cutoffs on a reference image
//! (conventionally mip level 0) and derives a `scale`/`offset` pair mapping
//! them to 0 and 1. [`apply_histogram_normalization`] rewrites every level of a
//! chain with that pair. The inverse pair travels with the texture as
//! reconstruction metadata so shaders can restore the original range.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::Image;
use crate::chain::MipChain;
use crate::error::{Result, TextureError, ensure_finite};

/// Rec. 709 luma weights
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Samples per parallel histogram chunk
const CHUNK_SIZE: usize = 16 * 1024;

/// Cutoff accuracy vs. smoothness trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramQuality {
    /// Coarse histogram, hard clamp at the cutoffs
    Fast,
    /// Fine histogram, soft knee around the cutoffs
    #[default]
    HighQuality,
}

impl HistogramQuality {
    pub fn bins(self) -> usize {
        match self {
            Self::Fast => 1024,
            Self::HighQuality => 16384,
        }
    }
}

/// Which statistic drives the scale/offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramChannelMode {
    /// One pair from the luma-weighted combination of color channels
    #[default]
    AverageLuminance,
    /// Independent pair per color channel
    PerChannel,
}

/// Normalization analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramSettings {
    pub quality: HistogramQuality,
    pub channel_mode: HistogramChannelMode,
    /// Lower cutoff percentile (0-100)
    pub percentile_low: f32,
    /// Upper cutoff percentile (0-100)
    pub percentile_high: f32,
    /// Soft knee width in normalized output units (HighQuality only)
    pub knee_width: f32,
    /// Ranges narrower than this are treated as constant
    pub min_range_threshold: f32,
    /// Tail fractions above this are reported
    pub tail_threshold: f32,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        Self {
            quality: HistogramQuality::HighQuality,
            channel_mode: HistogramChannelMode::AverageLuminance,
            percentile_low: 1.0,
            percentile_high: 99.0,
            knee_width: 0.05,
            min_range_threshold: 1e-3,
            tail_threshold: 0.05,
        }
    }
}

impl HistogramSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("percentile_low", self.percentile_low)?;
        ensure_finite("percentile_high", self.percentile_high)?;
        ensure_finite("knee_width", self.knee_width)?;
        ensure_finite("min_range_threshold", self.min_range_threshold)?;
        ensure_finite("tail_threshold", self.tail_threshold)?;

        if !(0.0..=100.0).contains(&self.percentile_low) {
            return Err(TextureError::invalid("percentile_low", "must be in [0, 100]"));
        }
        if !(0.0..=100.0).contains(&self.percentile_high) {
            return Err(TextureError::invalid("percentile_high", "must be in [0, 100]"));
        }
        if self.percentile_low >= self.percentile_high {
            return Err(TextureError::invalid(
                "percentile_low",
                format!(
                    "must be below percentile_high ({} >= {})",
                    self.percentile_low, self.percentile_high
                ),
            ));
        }
        if !(0.0..=0.5).contains(&self.knee_width) {
            return Err(TextureError::invalid("knee_width", "must be in [0, 0.5]"));
        }
        if self.min_range_threshold < 0.0 {
            return Err(TextureError::invalid("min_range_threshold", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.tail_threshold) {
            return Err(TextureError::invalid("tail_threshold", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Non-fatal anomaly found during analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistogramWarning {
    /// Measured range too small; identity used for `channel`
    NearConstant {
        channel: Option<u8>,
        range: f32,
        threshold: f32,
    },
    /// Too many samples outside the cutoffs
    HighTailFraction { fraction: f32, threshold: f32 },
}

impl fmt::Display for HistogramWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NearConstant {
                channel: Some(c),
                range,
                threshold,
            } => write!(
                f,
                "channel {} is near-constant (range {:.6} < {:.6}), left unnormalized",
                c, range, threshold
            ),
            Self::NearConstant {
                channel: None,
                range,
                threshold,
            } => write!(
                f,
                "image is near-constant (range {:.6} < {:.6}), left unnormalized",
                range, threshold
            ),
            Self::HighTailFraction {
                fraction,
                threshold,
            } => write!(
                f,
                "{:.2}% of samples fall outside the cutoffs (threshold {:.2}%)",
                fraction * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Analysis output and reconstruction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramResult {
    pub channel_mode: HistogramChannelMode,
    /// One value, or one per color channel
    pub scale: Vec<f32>,
    pub offset: Vec<f32>,
    /// Measured low cutoff per statistic
    pub low: Vec<f32>,
    /// Measured high cutoff per statistic
    pub high: Vec<f32>,
    /// Share of samples outside `[low, high]` before the knee
    pub tail_fraction: f32,
    pub soft_knee: bool,
    pub knee_width: f32,
    /// Statistics left at identity because their range was near constant.
    /// Their samples pass through untouched, knee and clamp included.
    #[serde(default)]
    pub skipped: Vec<bool>,
    pub warnings: Vec<HistogramWarning>,
}

impl HistogramResult {
    /// `scale = 1`, `offset = 0` for `count` statistics
    pub fn identity(channel_mode: HistogramChannelMode, count: usize) -> Self {
        Self {
            channel_mode,
            scale: vec![1.0; count],
            offset: vec![0.0; count],
            low: vec![0.0; count],
            high: vec![1.0; count],
            tail_fraction: 0.0,
            soft_knee: false,
            knee_width: 0.0,
            skipped: vec![false; count],
            warnings: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        (0..self.scale.len()).all(|i| {
            self.is_skipped(i)
                || (!self.soft_knee && self.scale[i] == 1.0 && self.offset[i] == 0.0)
        })
    }

    #[inline]
    fn statistic(&self, channel: usize) -> usize {
        if self.scale.len() == 1 { 0 } else { channel }
    }

    #[inline]
    fn is_skipped(&self, statistic: usize) -> bool {
        self.skipped.get(statistic).copied().unwrap_or(false)
    }

    /// Scale/offset pair for a color channel
    #[inline]
    pub fn pair(&self, channel: usize) -> (f32, f32) {
        let i = self.statistic(channel);
        (self.scale[i], self.offset[i])
    }

    /// Normalize one sample. Skipped statistics return it unchanged.
    #[inline]
    pub fn normalize(&self, value: f32, channel: usize) -> f32 {
        if self.is_skipped(self.statistic(channel)) {
            return value;
        }
        let (s, o) = self.pair(channel);
        let t = value * s + o;
        if self.soft_knee {
            soft_clamp(t, self.knee_width)
        } else {
            t.clamp(0.0, 1.0)
        }
    }

    /// Undo the normalization (exact between the cutoffs, pre-knee)
    #[inline]
    pub fn reconstruct(&self, raw: f32, channel: usize) -> f32 {
        let (s, o) = self.pair(channel);
        (raw - o) / s
    }

    /// Shader-side pair per statistic: `value = raw * scale + offset`
    pub fn reconstruction(&self) -> Vec<(f32, f32)> {
        self.scale
            .iter()
            .zip(&self.offset)
            .map(|(&s, &o)| (1.0 / s, -o / s))
            .collect()
    }

    /// Key/value pairs for the texture encoder's metadata block
    pub fn metadata(&self) -> Vec<(String, String)> {
        let join = |values: Vec<f32>| {
            values
                .iter()
                .map(|v| format!("{v:?}"))
                .collect::<Vec<_>>()
                .join(",")
        };
        let pairs = self.reconstruction();
        vec![
            (
                "nether.decode_scale".to_string(),
                join(pairs.iter().map(|p| p.0).collect()),
            ),
            (
                "nether.decode_offset".to_string(),
                join(pairs.iter().map(|p| p.1).collect()),
            ),
        ]
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn validate_for(&self, channels: u8) -> Result<()> {
        if self.scale.is_empty() || self.scale.len() != self.offset.len() {
            return Err(TextureError::invalid(
                "scale",
                "scale and offset must be non-empty and the same length",
            ));
        }
        if !self.skipped.is_empty() && self.skipped.len() != self.scale.len() {
            return Err(TextureError::invalid(
                "skipped",
                "must be empty or match the number of statistics",
            ));
        }
        if self.scale.len() != 1 && self.scale.len() != channels as usize {
            return Err(TextureError::invalid(
                "scale",
                format!(
                    "{} values cannot drive {} color channel(s)",
                    self.scale.len(),
                    channels
                ),
            ));
        }
        for (&s, &o) in self.scale.iter().zip(&self.offset) {
            ensure_finite("scale", s)?;
            ensure_finite("offset", o)?;
            if s == 0.0 {
                return Err(TextureError::invalid("scale", "must not be zero"));
            }
        }
        ensure_finite("knee_width", self.knee_width)
    }
}

/// Clamp to [0, 1] with quadratic knees of width `knee` centered on 0 and 1.
///
/// Continuous with a continuous first derivative; identity away from the knees.
pub fn soft_clamp(t: f32, knee: f32) -> f32 {
    if knee <= 0.0 {
        return t.clamp(0.0, 1.0);
    }
    let half = knee * 0.5;
    let lower = |t: f32| {
        if t <= -half {
            0.0
        } else if t >= half {
            t
        } else {
            (t + half) * (t + half) / (2.0 * knee)
        }
    };
    if t < 0.5 {
        lower(t)
    } else {
        1.0 - lower(1.0 - t)
    }
}

/// Per-statistic sample streams: one luma stream or one per color channel.
fn sample_streams(image: &Image, mode: HistogramChannelMode) -> Vec<Vec<f32>> {
    let channels = image.channels() as usize;
    let color = image.color_channels() as usize;
    let pixels = image.data().par_chunks_exact(channels);

    match mode {
        HistogramChannelMode::AverageLuminance => {
            let luma = if color >= 3 {
                pixels
                    .map(|px| {
                        px[0] * LUMA_WEIGHTS[0] + px[1] * LUMA_WEIGHTS[1] + px[2] * LUMA_WEIGHTS[2]
                    })
                    .collect()
            } else {
                pixels.map(|px| px[0]).collect()
            };
            vec![luma]
        }
        HistogramChannelMode::PerChannel => (0..color)
            .map(|c| image.data().par_chunks_exact(channels).map(|px| px[c]).collect())
            .collect(),
    }
}

/// Cutoffs measured on one stream
struct StreamStats {
    low: f32,
    high: f32,
    samples: usize,
}

fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    values
        .par_iter()
        .filter(|v| v.is_finite())
        .fold(
            || None,
            |acc: Option<(f32, f32)>, &v| match acc {
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                None => Some((v, v)),
            },
        )
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some((l1, h1)), Some((l2, h2))) => Some((l1.min(l2), h1.max(h2))),
                (a, None) => a,
                (None, b) => b,
            },
        )
}

fn build_histogram(values: &[f32], min: f32, max: f32, bins: usize) -> Vec<u32> {
    let range = max - min;
    let bin_of = |v: f32| {
        if range <= 0.0 {
            0
        } else {
            (((v - min) / range * bins as f32) as usize).min(bins - 1)
        }
    };

    values
        .par_chunks(CHUNK_SIZE)
        .fold(
            || vec![0u32; bins],
            |mut hist, chunk| {
                for &v in chunk.iter().filter(|v| v.is_finite()) {
                    hist[bin_of(v)] += 1;
                }
                hist
            },
        )
        .reduce(
            || vec![0u32; bins],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(&b) {
                    *x += y;
                }
                a
            },
        )
}

/// Value below which `percent` of the samples fall, interpolated inside the
/// crossing bin.
fn percentile(hist: &[u32], total: usize, min: f32, max: f32, percent: f32) -> f32 {
    let bin_width = (max - min) / hist.len() as f32;
    let target = percent as f64 / 100.0 * total as f64;
    let mut cumulative = 0.0f64;

    for (bin, &count) in hist.iter().enumerate() {
        let next = cumulative + count as f64;
        if count > 0 && next >= target {
            let frac = ((target - cumulative) / count as f64).clamp(0.0, 1.0) as f32;
            return min + (bin as f32 + frac) * bin_width;
        }
        cumulative = next;
    }
    max
}

fn measure_stream(values: &[f32], settings: &HistogramSettings) -> Option<StreamStats> {
    let (min, max) = min_max(values)?;
    let bins = settings.quality.bins();
    let hist = build_histogram(values, min, max, bins);
    let samples: usize = hist.iter().map(|&c| c as usize).sum();

    let low = percentile(&hist, samples, min, max, settings.percentile_low);
    let high = percentile(&hist, samples, min, max, settings.percentile_high);
    Some(StreamStats { low, high, samples })
}

fn count_outside(values: &[f32], low: f32, high: f32) -> usize {
    values
        .par_iter()
        .filter(|&&v| v.is_finite() && (v < low || v > high))
        .count()
}

/// Measure cutoffs on `image` and derive the normalization pair(s).
///
/// Near-constant statistics get an identity pair and a warning instead of an
/// error; a large tail fraction is also only a warning.
pub fn analyze_histogram(image: &Image, settings: &HistogramSettings) -> Result<HistogramResult> {
    settings.validate()?;
    image.validate_kind()?;

    let streams = sample_streams(image, settings.channel_mode);
    let mut result = HistogramResult::identity(settings.channel_mode, streams.len());
    let mut outside = 0usize;
    let mut total = 0usize;
    let mut normalized_any = false;

    for (i, values) in streams.iter().enumerate() {
        let channel = match settings.channel_mode {
            HistogramChannelMode::PerChannel => Some(i as u8),
            HistogramChannelMode::AverageLuminance => None,
        };

        let Some(stats) = measure_stream(values, settings) else {
            result.warnings.push(HistogramWarning::NearConstant {
                channel,
                range: 0.0,
                threshold: settings.min_range_threshold,
            });
            result.skipped[i] = true;
            continue;
        };
        result.low[i] = stats.low;
        result.high[i] = stats.high;

        let range = stats.high - stats.low;
        if range < settings.min_range_threshold {
            result.warnings.push(HistogramWarning::NearConstant {
                channel,
                range,
                threshold: settings.min_range_threshold,
            });
            result.skipped[i] = true;
            continue;
        }

        let scale = 1.0 / range;
        result.scale[i] = scale;
        result.offset[i] = -stats.low * scale;
        outside += count_outside(values, stats.low, stats.high);
        total += stats.samples;
        normalized_any = true;
    }

    if total > 0 {
        result.tail_fraction = outside as f32 / total as f32;
    }
    if result.tail_fraction > settings.tail_threshold {
        result.warnings.push(HistogramWarning::HighTailFraction {
            fraction: result.tail_fraction,
            threshold: settings.tail_threshold,
        });
    }
    if normalized_any
        && settings.quality == HistogramQuality::HighQuality
        && settings.knee_width > 0.0
    {
        result.soft_knee = true;
        result.knee_width = settings.knee_width;
    }

    tracing::debug!(
        "Histogram cutoffs low={:?} high={:?} scale={:?} offset={:?} tail={:.4}",
        result.low,
        result.high,
        result.scale,
        result.offset,
        result.tail_fraction
    );
    for warning in &result.warnings {
        tracing::warn!("Histogram analysis: {}", warning);
    }

    Ok(result)
}

/// Rewrite every color sample of every level with the normalization pair.
///
/// Alpha is left as is. An identity result returns the chain unchanged.
pub fn apply_histogram_normalization(
    mut chain: MipChain,
    result: &HistogramResult,
) -> Result<MipChain> {
    chain.validate()?;
    let channels = chain.channels();
    let color = chain.base().image.color_channels();
    result.validate_for(color)?;

    if result.is_identity() {
        return Ok(chain);
    }

    for level in chain.levels_mut() {
        level
            .image
            .data_mut()
            .par_chunks_mut(channels as usize)
            .for_each(|px| {
                for (c, v) in px[..color as usize].iter_mut().enumerate() {
                    *v = result.normalize(*v, c);
                }
            });
    }

    tracing::debug!("Applied histogram normalization to {} mip levels", chain.len());
    Ok(chain)
}

#[cfg(test)]
mod tests;
