//! Gamma round-tripping for filtering in linear light
//!
//! Alpha is never gamma encoded and is left untouched.

use rayon::prelude::*;

use crate::buffer::{ColorSpace, Image};

/// Decode gamma-encoded color channels to linear (`v^gamma`).
pub fn linearize(image: &mut Image, gamma: f32) {
    apply_power(image, gamma);
    image.set_color_space(ColorSpace::Linear);
}

/// Encode linear color channels with `v^(1/gamma)`.
pub fn encode(image: &mut Image, gamma: f32) {
    apply_power(image, 1.0 / gamma);
    image.set_color_space(ColorSpace::Encoded);
}

fn apply_power(image: &mut Image, exponent: f32) {
    let channels = image.channels() as usize;
    let color = image.color_channels() as usize;
    image
        .data_mut()
        .par_chunks_mut(channels)
        .for_each(|px| {
            for v in &mut px[..color] {
                *v = v.max(0.0).powf(exponent);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut img = Image::from_f32(2, 1, 4, vec![0.25, 0.5, 0.75, 0.3, 1.0, 0.0, 0.1, 0.9])
            .unwrap()
            .with_color_space(ColorSpace::Encoded);
        let original = img.clone();

        linearize(&mut img, 2.2);
        assert_eq!(img.color_space(), ColorSpace::Linear);
        assert!((img.get(0, 0, 1) - 0.5f32.powf(2.2)).abs() < 1e-6);
        // Alpha untouched
        assert_eq!(img.get(0, 0, 3), 0.3);

        encode(&mut img, 2.2);
        assert_eq!(img.color_space(), ColorSpace::Encoded);
        for (a, b) in img.data().iter().zip(original.data()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
