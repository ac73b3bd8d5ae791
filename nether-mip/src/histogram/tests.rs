//! Tests for histogram analysis and normalization

use super::*;

/// Raster-order gradient covering [lo, hi] with distinct values
fn gradient(width: u32, height: u32, lo: f32, hi: f32) -> Image {
    let n = width * height;
    let data = (0..n)
        .map(|i| lo + (hi - lo) * i as f32 / (n - 1) as f32)
        .collect();
    Image::from_f32(width, height, 1, data).unwrap()
}

fn fast() -> HistogramSettings {
    HistogramSettings {
        quality: HistogramQuality::Fast,
        ..Default::default()
    }
}

#[test]
fn test_gradient_1_99_percentiles() {
    for settings in [fast(), HistogramSettings::default()] {
        let result = analyze_histogram(&gradient(256, 256, 0.0, 1.0), &settings).unwrap();
        assert_eq!(result.scale.len(), 1);

        assert!((result.low[0] - 0.01).abs() < 2e-3, "low {}", result.low[0]);
        assert!((result.high[0] - 0.99).abs() < 2e-3, "high {}", result.high[0]);
        assert!((result.scale[0] - 1.02).abs() < 5e-3, "scale {}", result.scale[0]);
        assert!((result.offset[0] + 0.01).abs() < 3e-3, "offset {}", result.offset[0]);

        // Cutoffs land exactly on 0 and 1
        let (s, o) = result.pair(0);
        assert!((result.low[0] * s + o).abs() < 1e-5);
        assert!((result.high[0] * s + o - 1.0).abs() < 1e-5);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }
}

#[test]
fn test_quality_tiers_set_knee() {
    let img = gradient(64, 64, 0.0, 1.0);
    assert!(!analyze_histogram(&img, &fast()).unwrap().soft_knee);

    let hq = analyze_histogram(&img, &HistogramSettings::default()).unwrap();
    assert!(hq.soft_knee);
    assert_eq!(hq.knee_width, 0.05);
}

#[test]
fn test_round_trip_at_cutoffs() {
    let result = analyze_histogram(&gradient(128, 128, 0.2, 0.8), &fast()).unwrap();
    for &boundary in [result.low[0], result.high[0]].iter() {
        let normalized = result.normalize(boundary, 0);
        let restored = result.reconstruct(normalized, 0);
        assert!((restored - boundary).abs() < 1e-5);
    }

    // The shader-side pair reproduces the same values
    let (decode_scale, decode_offset) = result.reconstruction()[0];
    let restored = result.normalize(result.high[0], 0) * decode_scale + decode_offset;
    assert!((restored - result.high[0]).abs() < 1e-5);
}

#[test]
fn test_near_constant_is_identity() {
    let img = Image::filled(16, 16, 1, 0.5);
    let result = analyze_histogram(&img, &HistogramSettings::default()).unwrap();

    assert_eq!(result.scale, vec![1.0]);
    assert_eq!(result.offset, vec![0.0]);
    assert!(result.is_identity());
    assert!(matches!(
        result.warnings.as_slice(),
        [HistogramWarning::NearConstant { channel: None, .. }]
    ));

    let chain = MipChain::single(img.clone()).unwrap();
    let out = apply_histogram_normalization(chain.clone(), &result).unwrap();
    assert_eq!(out, chain);
}

#[test]
fn test_high_tail_fraction_warns() {
    let settings = HistogramSettings {
        tail_threshold: 0.01,
        ..fast()
    };
    let result = analyze_histogram(&gradient(100, 100, 0.0, 1.0), &settings).unwrap();
    assert!((result.tail_fraction - 0.02).abs() < 5e-3);
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, HistogramWarning::HighTailFraction { .. })));
    // Still normalized
    assert!(!result.is_identity());
}

#[test]
fn test_per_channel_mode() {
    let n = 64 * 64;
    let mut data = Vec::with_capacity(n * 3);
    for i in 0..n {
        let t = i as f32 / (n - 1) as f32;
        data.extend_from_slice(&[t * 0.5, 0.25 + t * 0.5, 0.5 + t * 0.5]);
    }
    let img = Image::from_f32(64, 64, 3, data).unwrap();
    let settings = HistogramSettings {
        channel_mode: HistogramChannelMode::PerChannel,
        percentile_low: 0.0,
        percentile_high: 100.0,
        ..fast()
    };
    let result = analyze_histogram(&img, &settings).unwrap();
    assert_eq!(result.scale.len(), 3);
    for (c, expected_low) in [0.0, 0.25, 0.5].into_iter().enumerate() {
        assert!((result.low[c] - expected_low).abs() < 1e-3);
        assert!((result.scale[c] - 2.0).abs() < 1e-2);
    }

    let out = apply_histogram_normalization(MipChain::single(img).unwrap(), &result).unwrap();
    let base = &out.base().image;
    for c in 0..3 {
        assert!(base.get(0, 0, c).abs() < 1e-3);
        assert!((base.get(63, 63, c) - 1.0).abs() < 1e-3);
    }
}

#[test]
fn test_luminance_mode_single_pair_for_rgb() {
    let gray = gradient(32, 32, 0.0, 1.0);
    let rgb: Vec<f32> = gray.data().iter().flat_map(|&v| [v, v, v]).collect();
    let img = Image::from_f32(32, 32, 3, rgb).unwrap();
    let result = analyze_histogram(&img, &fast()).unwrap();
    assert_eq!(result.scale.len(), 1);
    assert!((result.low[0] - 0.01).abs() < 3e-3);
}

#[test]
fn test_hdr_range() {
    let result = analyze_histogram(&gradient(128, 128, 0.0, 10.0), &fast()).unwrap();
    assert!((result.low[0] - 0.1).abs() < 0.02);
    assert!((result.high[0] - 9.9).abs() < 0.02);
    assert!((result.scale[0] - 1.0 / 9.8).abs() < 1e-3);
}

#[test]
fn test_apply_clamps_and_keeps_alpha() {
    let img = Image::from_f32(2, 1, 2, vec![0.0, 0.3, 1.0, 0.7]).unwrap();
    let result = HistogramResult {
        scale: vec![2.0],
        offset: vec![-0.5],
        ..HistogramResult::identity(HistogramChannelMode::AverageLuminance, 1)
    };
    let out = apply_histogram_normalization(MipChain::single(img).unwrap(), &result).unwrap();
    assert_eq!(out.base().image.data(), &[0.0, 0.3, 1.0, 0.7]);
}

#[test]
fn test_apply_rewrites_every_level() {
    let levels = vec![
        Image::filled(4, 4, 1, 0.5),
        Image::filled(2, 2, 1, 0.5),
        Image::filled(1, 1, 1, 0.5),
    ];
    let chain = MipChain::from_images(levels).unwrap();
    let result = HistogramResult {
        scale: vec![0.5],
        offset: vec![0.1],
        ..HistogramResult::identity(HistogramChannelMode::AverageLuminance, 1)
    };
    let out = apply_histogram_normalization(chain, &result).unwrap();
    assert_eq!(out.len(), 3);
    for level in &out {
        assert!(level.image.data().iter().all(|&v| (v - 0.35).abs() < 1e-6));
    }
}

#[test]
fn test_soft_clamp_is_smooth() {
    let knee = 0.1;
    assert_eq!(soft_clamp(-1.0, knee), 0.0);
    assert_eq!(soft_clamp(2.0, knee), 1.0);
    assert_eq!(soft_clamp(0.5, knee), 0.5);
    assert_eq!(soft_clamp(0.3, knee), 0.3);
    // Continuous at the knee edges
    assert!((soft_clamp(0.05, knee) - 0.05).abs() < 1e-6);
    assert!(soft_clamp(-0.05, knee).abs() < 1e-6);
    assert!((soft_clamp(0.95, knee) - 0.95).abs() < 1e-6);
    // Monotonic
    let mut prev = soft_clamp(-0.2, knee);
    for i in 0..=140 {
        let t = -0.2 + i as f32 * 0.01;
        let v = soft_clamp(t, knee);
        assert!(v >= prev - 1e-6);
        prev = v;
    }
    // Zero width degrades to a hard clamp
    assert_eq!(soft_clamp(-0.1, 0.0), 0.0);
    assert_eq!(soft_clamp(1.1, 0.0), 1.0);
}

#[test]
fn test_invalid_settings_rejected() {
    let img = gradient(8, 8, 0.0, 1.0);
    let bad = [
        HistogramSettings {
            percentile_low: -1.0,
            ..Default::default()
        },
        HistogramSettings {
            percentile_low: 60.0,
            percentile_high: 40.0,
            ..Default::default()
        },
        HistogramSettings {
            knee_width: f32::NAN,
            ..Default::default()
        },
        HistogramSettings {
            tail_threshold: 2.0,
            ..Default::default()
        },
    ];
    for settings in bad {
        assert!(matches!(
            analyze_histogram(&img, &settings),
            Err(TextureError::InvalidParameter { .. })
        ));
    }
}

#[test]
fn test_result_channel_count_must_match() {
    let result = HistogramResult::identity(HistogramChannelMode::PerChannel, 3);
    let chain = MipChain::single(Image::filled(2, 2, 1, 0.5)).unwrap();
    assert!(matches!(
        apply_histogram_normalization(chain, &result),
        Err(TextureError::InvalidParameter { name: "scale", .. })
    ));
}

#[test]
fn test_metadata_carries_decode_pair() {
    let result = HistogramResult {
        scale: vec![2.0],
        offset: vec![-0.5],
        ..HistogramResult::identity(HistogramChannelMode::AverageLuminance, 1)
    };
    let metadata = result.metadata();
    assert_eq!(
        metadata,
        vec![
            ("nether.decode_scale".to_string(), "0.5".to_string()),
            ("nether.decode_offset".to_string(), "0.25".to_string()),
        ]
    );
    let json = result.to_json().unwrap();
    assert!(json.contains("\"scale\":[2.0]"));
}

#[test]
fn test_per_channel_knee_skips_constant_channels() {
    let n = 64 * 64;
    let mut data = Vec::with_capacity(n * 3);
    for i in 0..n {
        let t = i as f32 / (n - 1) as f32;
        data.extend_from_slice(&[t, 0.0, 1.0]);
    }
    let img = Image::from_f32(64, 64, 3, data).unwrap();
    let settings = HistogramSettings {
        channel_mode: HistogramChannelMode::PerChannel,
        ..Default::default()
    };

    let result = analyze_histogram(&img, &settings).unwrap();
    assert!(result.soft_knee);
    assert_eq!(result.skipped, vec![false, true, true]);
    assert_eq!(result.scale[1..], [1.0, 1.0]);
    let near_constant = result
        .warnings
        .iter()
        .filter(|w| matches!(w, HistogramWarning::NearConstant { .. }))
        .count();
    assert_eq!(near_constant, 2);
    assert!(!result.is_identity());
    assert_eq!(result.normalize(1.7, 1), 1.7);

    let out = apply_histogram_normalization(MipChain::single(img).unwrap(), &result).unwrap();
    let base = &out.base().image;
    for (x, y) in [(0, 0), (31, 17), (63, 63)] {
        assert_eq!(base.get(x, y, 1), 0.0);
        assert_eq!(base.get(x, y, 2), 1.0);
    }
    assert!(base.get(0, 0, 0) < 0.05);
    assert!(base.get(63, 63, 0) > 0.95);
}

#[test]
fn test_apply_rejects_zero_area_chain() {
    let chain = MipChain::from_levels_unchecked(vec![crate::chain::MipLevel::new(
        0,
        Image::filled(0, 0, 1, 0.0),
    )]);
    let result = HistogramResult {
        scale: vec![2.0],
        offset: vec![-0.5],
        ..HistogramResult::identity(HistogramChannelMode::AverageLuminance, 1)
    };
    assert!(matches!(
        apply_histogram_normalization(chain, &result),
        Err(TextureError::UnsupportedImageKind { .. })
    ));
}

#[test]
fn test_skipped_length_checked() {
    let result = HistogramResult {
        skipped: vec![false, true],
        ..HistogramResult::identity(HistogramChannelMode::AverageLuminance, 1)
    };
    let chain = MipChain::single(Image::filled(2, 2, 1, 0.5)).unwrap();
    assert!(matches!(
        apply_histogram_normalization(chain, &result),
        Err(TextureError::InvalidParameter { name: "skipped", .. })
    ));
}
