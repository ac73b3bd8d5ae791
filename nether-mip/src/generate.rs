//! Mip chain generation

use crate::buffer::{ColorSpace, Image};
use crate::chain::{MipChain, MipLevel, half_dimensions};
use crate::color;
use crate::error::{Result, TextureError};
use crate::filter::{downsample, gaussian_blur};
use crate::normal;
use crate::pipeline::CancelFlag;
use crate::profile::GenerationProfile;

/// Generate a full mip chain from `source` under `profile`.
///
/// Level 0 is the source itself (linearized when the profile asks for gamma
/// round-tripping) and is emitted without running any modifier. Each
/// following level is filtered from the previous filtered level. Profile
/// modifiers run only on those filtered levels (1 and up), on the emitted
/// copy, so they never compound across levels.
pub fn generate_mip_chain(source: &Image, profile: &GenerationProfile) -> Result<MipChain> {
    generate_mip_chain_cancellable(source, profile, &CancelFlag::default())
}

/// [`generate_mip_chain`] that checks `cancel` before producing each level.
pub fn generate_mip_chain_cancellable(
    source: &Image,
    profile: &GenerationProfile,
    cancel: &CancelFlag,
) -> Result<MipChain> {
    profile.validate()?;
    source.validate_kind()?;
    if profile.normalize_normals {
        normal::ensure_normal_layout(source)?;
    }

    let linearized =
        profile.apply_gamma_correction && source.color_space() == ColorSpace::Encoded;
    let mut current = source.clone();
    if linearized {
        color::linearize(&mut current, profile.gamma);
    }

    let mut levels = vec![MipLevel::new(0, current.clone())];

    while current.dimensions() != (1, 1) {
        let (w, h) = half_dimensions(current.width(), current.height());
        if w.max(h) < profile.min_mip_size {
            break;
        }
        if cancel.is_cancelled() {
            return Err(TextureError::Cancelled);
        }

        let mut next = downsample(&current, &profile.filter, profile.edge_mode);
        if let Some(radius) = profile.blur_radius {
            gaussian_blur(&mut next, radius, profile.edge_mode);
        }
        // Filtering shortens normal vectors, so this runs after it
        if profile.normalize_normals {
            normal::renormalize(&mut next)?;
        }

        let mut level = MipLevel::new(levels.len() as u32, next.clone());
        for modifier in &profile.modifiers {
            modifier.apply(&mut level, profile.edge_mode)?;
        }
        levels.push(level);
        current = next;
    }

    if !profile.include_last_level && levels.len() > 1 {
        levels.pop();
    }

    if linearized && profile.semantic.requires_encoded_output() {
        for level in &mut levels {
            color::encode(&mut level.image, profile.gamma);
        }
    }

    tracing::debug!(
        "Generated {} mip levels for {}x{} {:?} texture ({:?})",
        levels.len(),
        source.width(),
        source.height(),
        profile.semantic,
        profile.filter
    );

    Ok(MipChain::from_levels_unchecked(levels))
}
