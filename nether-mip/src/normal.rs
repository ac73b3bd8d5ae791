//! Tangent-space normal encoding helpers
//!
//! Normals are stored as `[0, 1]` channels mapping to `[-1, 1]` components.
//! Two-channel maps (BC5 style) reconstruct Z from X and Y.

use glam::Vec3;
use rayon::prelude::*;

use crate::buffer::Image;
use crate::error::{Result, TextureError};

/// Decode one pixel to a unit vector. Degenerate vectors decode to +Z.
#[inline]
pub fn decode_normal(px: &[f32]) -> Vec3 {
    let x = px[0] * 2.0 - 1.0;
    let y = px[1] * 2.0 - 1.0;
    let z = match px.get(2) {
        Some(&b) => b * 2.0 - 1.0,
        None => (1.0 - x * x - y * y).max(0.0).sqrt(),
    };
    Vec3::new(x, y, z).try_normalize().unwrap_or(Vec3::Z)
}

/// Encode a unit vector back into the pixel's first two or three channels.
#[inline]
pub fn encode_normal(n: Vec3, px: &mut [f32]) {
    px[0] = n.x * 0.5 + 0.5;
    px[1] = n.y * 0.5 + 0.5;
    if px.len() >= 3 {
        px[2] = n.z * 0.5 + 0.5;
    }
}

/// Fail unless the image carries at least two encoded components.
pub fn ensure_normal_layout(image: &Image) -> Result<()> {
    if image.channels() < 2 {
        return Err(TextureError::UnsupportedChannelLayout(format!(
            "normal map needs at least 2 channels, found {}",
            image.channels()
        )));
    }
    Ok(())
}

/// Renormalize every pixel to unit length. Alpha (4th channel) is kept.
pub fn renormalize(image: &mut Image) -> Result<()> {
    ensure_normal_layout(image)?;
    let channels = image.channels() as usize;
    image
        .data_mut()
        .par_chunks_mut(channels)
        .for_each(|px| {
            let n = decode_normal(px);
            encode_normal(n, px);
        });
    Ok(())
}
