//! End-to-end tests over the public API: generate, normalize, correct, pack.

use image::{DynamicImage, Rgba, RgbaImage};
use nether_mip::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gradient(size: u32) -> Image {
    let n = size * size;
    let data = (0..n).map(|i| i as f32 / (n - 1) as f32).collect();
    Image::from_f32(size, size, 1, data).unwrap()
}

/// Vertical stripes of opposite X tilt, 4 pixels wide
fn striped_normals(size: u32) -> Image {
    let mut img = Image::filled(size, size, 3, 0.0);
    for y in 0..size {
        for x in 0..size {
            let px = if (x / 4) % 2 == 0 {
                [0.8, 0.5, 0.9]
            } else {
                [0.2, 0.5, 0.9]
            };
            img.pixel_mut(x, y).copy_from_slice(&px);
        }
    }
    img
}

#[test]
fn test_gradient_chain_and_histogram() {
    init_tracing();
    let source = gradient(256);

    let profile = GenerationProfile::default().with_min_mip_size(4);
    let chain = generate_mip_chain(&source, &profile).unwrap();
    let sizes: Vec<(u32, u32)> = chain.iter().map(|l| l.dimensions()).collect();
    assert_eq!(
        sizes,
        vec![(256, 256), (128, 128), (64, 64), (32, 32), (16, 16), (8, 8), (4, 4)]
    );

    let settings = HistogramSettings {
        percentile_low: 1.0,
        percentile_high: 99.0,
        ..Default::default()
    };
    let result = analyze_histogram(&source, &settings).unwrap();
    assert!((result.scale[0] - 1.02).abs() < 5e-3);
    assert!((result.offset[0] + 0.01).abs() < 3e-3);

    let normalized = apply_histogram_normalization(chain, &result).unwrap();
    assert_eq!(normalized.len(), 7);
    for level in &normalized {
        assert!(level.image.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    // The encoder metadata reconstructs the original cutoffs
    let (decode_scale, decode_offset) = result.reconstruction()[0];
    let raw_high = result.high[0] * result.scale[0] + result.offset[0];
    assert!((raw_high * decode_scale + decode_offset - result.high[0]).abs() < 1e-5);
    assert_eq!(result.metadata().len(), 2);
}

#[test]
fn test_material_job_packs_corrected_gloss() {
    init_tracing();
    let ao = Image::filled(64, 64, 1, 0.2);
    let gloss = Image::filled(64, 64, 1, 0.6);
    let normals = striped_normals(64);

    let gloss_settings = TextureSettings::parse(
        r#"
        semantic = "gloss"
        [toksvig]
        encoding = "gloss"
        composite_power = 1.0
        "#,
    )
    .unwrap();

    let job = MaterialJob::new(PackingMode::Ogm)
        .with_input(
            PackChannel::Occlusion,
            MaterialInput::new(&ao, TextureSettings::new(TextureSemantic::Occlusion)),
        )
        .with_input(PackChannel::Gloss, MaterialInput::new(&gloss, gloss_settings))
        .with_normal(MaterialInput::new(
            &normals,
            TextureSettings::new(TextureSemantic::Normal),
        ));

    let material = job.run(&CancelFlag::new()).unwrap();
    let packed = &material.packed;
    assert_eq!(packed.len(), 7);
    assert_eq!(packed.channels(), 3);
    assert!(material.normal.is_some());
    assert!(material.histograms.is_empty());

    // Level 0 passes through Toksvig untouched
    let base = &packed.base().image;
    assert!((base.get(10, 10, 0) - 0.2).abs() < 1e-5);
    assert!((base.get(10, 10, 1) - 0.6).abs() < 1e-5);
    assert_eq!(base.get(10, 10, 2), 0.0);

    // Striped normals still diverge at level 1, so gloss drops there
    let level1 = &packed.levels()[1].image;
    let min_gloss = level1
        .data()
        .chunks_exact(3)
        .map(|px| px[1])
        .fold(f32::INFINITY, f32::min);
    assert!(min_gloss < 0.6 - 1e-3, "min gloss {}", min_gloss);
    assert!(level1.data().chunks_exact(3).all(|px| px[1] <= 0.6 + 1e-5));
    assert!(level1.data().chunks_exact(3).all(|px| (px[0] - 0.2).abs() < 1e-4));
}

#[test]
fn test_material_job_mismatched_sizes() {
    let ao = Image::filled(64, 64, 1, 0.2);
    let gloss = Image::filled(32, 32, 1, 0.6);
    let job = MaterialJob::new(PackingMode::Og)
        .with_input(
            PackChannel::Occlusion,
            MaterialInput::new(&ao, TextureSettings::new(TextureSemantic::Occlusion)),
        )
        .with_input(
            PackChannel::Gloss,
            MaterialInput::new(&gloss, TextureSettings::new(TextureSemantic::Gloss)),
        );
    assert!(matches!(
        job.run(&CancelFlag::new()),
        Err(TextureError::DimensionMismatch {
            expected: (64, 64),
            found: (32, 32)
        })
    ));
}

#[test]
fn test_cancelled_job() {
    let ao = Image::filled(64, 64, 1, 0.2);
    let job = MaterialJob::new(PackingMode::Og).with_input(
        PackChannel::Occlusion,
        MaterialInput::new(&ao, TextureSettings::new(TextureSemantic::Occlusion)),
    );
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert!(matches!(job.run(&cancel), Err(TextureError::Cancelled)));
}

#[test]
fn test_cancelled_job_with_normal() {
    let gloss = Image::filled(64, 64, 1, 0.6);
    let normals = striped_normals(64);
    let job = MaterialJob::new(PackingMode::Og)
        .with_input(
            PackChannel::Gloss,
            MaterialInput::new(&gloss, TextureSettings::new(TextureSemantic::Gloss)),
        )
        .with_normal(MaterialInput::new(
            &normals,
            TextureSettings::new(TextureSemantic::Normal),
        ));
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert!(matches!(job.run(&cancel), Err(TextureError::Cancelled)));
}

#[test]
fn test_normalized_input_reports_histogram() {
    let ao = gradient(32);
    let settings = TextureSettings::parse(
        r#"
        semantic = "occlusion"
        [histogram]
        quality = "fast"
        "#,
    )
    .unwrap();
    let material = MaterialJob::new(PackingMode::Og)
        .with_input(PackChannel::Occlusion, MaterialInput::new(&ao, settings))
        .run(&CancelFlag::new())
        .unwrap();

    assert_eq!(material.histograms.len(), 1);
    let (channel, result) = &material.histograms[0];
    assert_eq!(*channel, PackChannel::Occlusion);
    assert!(result.scale[0] > 1.0);
    assert!(result.to_json().unwrap().contains("scale"));
}

#[test]
fn test_dynamic_image_color_round_trip() {
    init_tracing();
    let rgba = RgbaImage::from_pixel(16, 8, Rgba([200, 128, 64, 255]));
    let source = Image::from(DynamicImage::ImageRgba8(rgba));
    assert_eq!(source.color_space(), ColorSpace::Encoded);

    let chain = generate_mip_chain(
        &source,
        &GenerationProfile::for_semantic(TextureSemantic::Color),
    )
    .unwrap();
    assert_eq!(chain.len(), 5);

    // A flat color survives the linear-light round trip
    for level in &chain {
        assert_eq!(level.image.color_space(), ColorSpace::Encoded);
        let px = level.image.pixel(0, 0);
        assert!((px[0] - 200.0 / 255.0).abs() < 1e-3);
        assert!((px[2] - 64.0 / 255.0).abs() < 1e-3);
        assert!((px[3] - 1.0).abs() < 1e-5);
    }

    let out = chain.levels()[2].image.to_dynamic_image();
    assert_eq!((out.width(), out.height()), (4, 2));
}
