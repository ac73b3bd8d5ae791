//! Toksvig-style specular anti-aliasing
//!
//! Normal detail lost to filtering shows up as a shorter mean normal. The
//! corrector turns that into extra GGX roughness on the paired gloss or
//! roughness chain so highlights don't sparkle at distance.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::Image;
use crate::chain::MipChain;
use crate::error::{Result, TextureError, ensure_finite};
use crate::normal::{decode_normal, ensure_normal_layout};

/// Floor for the corrected GGX alpha
pub const ALPHA_EPSILON: f32 = 1e-4;

/// How the corrected channel encodes microsurface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoughnessEncoding {
    /// 0 = mirror, 1 = fully rough
    Roughness,
    /// 0 = fully rough, 1 = mirror
    Gloss,
}

impl RoughnessEncoding {
    #[inline]
    fn to_roughness(self, value: f32) -> f32 {
        match self {
            Self::Roughness => value,
            Self::Gloss => 1.0 - value,
        }
    }

    #[inline]
    fn from_roughness(self, roughness: f32) -> f32 {
        match self {
            Self::Roughness => roughness,
            Self::Gloss => 1.0 - roughness,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_composite_power() -> f32 {
    1.0
}

fn default_min_mip_level() -> u32 {
    1
}

/// Toksvig correction settings. `encoding` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToksvigSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub encoding: RoughnessEncoding,
    /// Weight of the normal variance added to alpha
    #[serde(default = "default_composite_power")]
    pub composite_power: f32,
    /// First level that gets corrected; earlier levels pass through
    #[serde(default = "default_min_mip_level")]
    pub min_mip_level: u32,
    /// Blur the variance map with a 3×3 kernel before use
    #[serde(default)]
    pub smooth_variance: bool,
    /// Channel of the gloss/roughness image to correct
    #[serde(default)]
    pub channel: u8,
    /// Identity of the paired normal map, for the orchestrator
    #[serde(default)]
    pub normal_map: Option<String>,
}

impl ToksvigSettings {
    pub fn new(encoding: RoughnessEncoding) -> Self {
        Self {
            enabled: default_enabled(),
            encoding,
            composite_power: default_composite_power(),
            min_mip_level: default_min_mip_level(),
            smooth_variance: false,
            channel: 0,
            normal_map: None,
        }
    }

    pub fn with_composite_power(mut self, composite_power: f32) -> Self {
        self.composite_power = composite_power;
        self
    }

    pub fn with_min_mip_level(mut self, min_mip_level: u32) -> Self {
        self.min_mip_level = min_mip_level;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_finite("composite_power", self.composite_power)?;
        if self.composite_power < 0.0 {
            return Err(TextureError::invalid("composite_power", "must not be negative"));
        }
        Ok(())
    }
}

/// Per-pixel `1 - |mean(N)|` over the clamped 3×3 neighborhood.
pub fn normal_variance(normals: &Image) -> Result<Vec<f32>> {
    normals.validate_kind()?;
    ensure_normal_layout(normals)?;
    let (w, h) = (normals.width() as usize, normals.height() as usize);
    let decoded: Vec<Vec3> = normals
        .data()
        .par_chunks_exact(normals.channels() as usize)
        .map(decode_normal)
        .collect();

    let mut variance = vec![0.0f32; w * h];
    variance
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut sum = Vec3::ZERO;
                for dy in 0..3 {
                    let sy = (y + dy).saturating_sub(1).min(h - 1);
                    for dx in 0..3 {
                        let sx = (x + dx).saturating_sub(1).min(w - 1);
                        sum += decoded[sy * w + sx];
                    }
                }
                let mean = sum / 9.0;
                *out = (1.0 - mean.length()).clamp(0.0, 1.0);
            }
        });
    Ok(variance)
}

/// 3×3 binomial smoothing with clamped edges
fn smooth(variance: &[f32], width: usize, height: usize) -> Vec<f32> {
    const KERNEL: [f32; 3] = [1.0, 2.0, 1.0];
    let mut out = vec![0.0f32; variance.len()];
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, o) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (ky, wy) in KERNEL.iter().enumerate() {
                    let sy = (y + ky).saturating_sub(1).min(height - 1);
                    for (kx, wx) in KERNEL.iter().enumerate() {
                        let sx = (x + kx).saturating_sub(1).min(width - 1);
                        acc += variance[sy * width + sx] * wy * wx;
                    }
                }
                *o = acc / 16.0;
            }
        });
    out
}

/// Fail unless every level that will be corrected has a same-sized normal level.
fn check_pairing(chain: &MipChain, normal: &MipChain, settings: &ToksvigSettings) -> Result<()> {
    chain.validate()?;
    normal.validate()?;
    chain.ensure_same_base(normal)?;
    ensure_normal_layout(&normal.base().image)?;

    if settings.channel >= chain.channels() {
        return Err(TextureError::UnsupportedChannelLayout(format!(
            "channel {} requested from a {}-channel gloss/roughness chain",
            settings.channel,
            chain.channels()
        )));
    }

    for level in chain.iter().skip(settings.min_mip_level as usize) {
        let found = normal
            .level(level.level as usize)
            .map(|n| n.dimensions())
            .unwrap_or((0, 0));
        if found != level.dimensions() {
            return Err(TextureError::DimensionMismatch {
                expected: level.dimensions(),
                found,
            });
        }
    }
    Ok(())
}

/// Raise roughness by normal variance on every level at or past
/// `settings.min_mip_level`.
///
/// `alpha' = clamp(r² + composite_power · variance, ε, 1)`, written back as
/// `sqrt(alpha')` (or its gloss complement). Other channels, and earlier
/// levels, are copied through unchanged. A zero composite power returns the
/// input chain as is.
pub fn apply_toksvig_correction(
    chain: &MipChain,
    normal: &MipChain,
    settings: &ToksvigSettings,
) -> Result<MipChain> {
    settings.validate()?;
    if !settings.enabled {
        return Ok(chain.clone());
    }
    check_pairing(chain, normal, settings)?;
    let mut chain = chain.clone();
    if settings.composite_power == 0.0 {
        return Ok(chain);
    }

    let channels = chain.channels() as usize;
    let target = settings.channel as usize;
    let power = settings.composite_power;
    let encoding = settings.encoding;
    let mut corrected = 0usize;

    for level in chain.levels_mut().iter_mut().skip(settings.min_mip_level as usize) {
        let normals = &normal.levels()[level.level as usize].image;
        let mut variance = normal_variance(normals)?;
        if settings.smooth_variance {
            variance = smooth(&variance, normals.width() as usize, normals.height() as usize);
        }

        level
            .image
            .data_mut()
            .par_chunks_mut(channels)
            .zip(variance.par_iter())
            .for_each(|(px, &v)| {
                let roughness = encoding.to_roughness(px[target]).clamp(0.0, 1.0);
                let alpha = (roughness * roughness + power * v).clamp(ALPHA_EPSILON, 1.0);
                px[target] = encoding.from_roughness(alpha.sqrt());
            });
        corrected += 1;
    }

    tracing::debug!(
        "Toksvig corrected {} of {} mip levels ({:?}, power {})",
        corrected,
        chain.len(),
        encoding,
        power
    );
    Ok(chain)
}
