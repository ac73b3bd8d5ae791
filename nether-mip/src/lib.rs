//! Texture mip-chain pipeline for Nethercore asset export
//!
//! Pure in-memory pixel transforms that run ahead of GPU texture encoding:
//!
//! - [`generate_mip_chain`]: filtered, gamma-aware mip chains
//! - [`analyze_histogram`] / [`apply_histogram_normalization`]: percentile
//!   range normalization with a scale/offset pair for shader reconstruction
//! - [`apply_toksvig_correction`]: roughness from normal-map variance
//! - [`pack_channels`]: OG / OGM / OGMH channel packing
//!
//! # Example
//! ```no_run
//! use nether_mip::*;
//!
//! let gloss = Image::filled(256, 256, 1, 0.8);
//! let normals = Image::filled(256, 256, 3, 0.5);
//!
//! let gloss_chain = generate_mip_chain(&gloss, &GenerationProfile::for_semantic(TextureSemantic::Gloss))?;
//! let normal_chain = generate_mip_chain(&normals, &GenerationProfile::for_semantic(TextureSemantic::Normal))?;
//!
//! let toksvig = ToksvigSettings::new(RoughnessEncoding::Gloss);
//! let corrected = apply_toksvig_correction(&gloss_chain, &normal_chain, &toksvig)?;
//!
//! let packed = pack_channels(
//!     &ChannelPackingSettings::new(PackingMode::Og)
//!         .with_source(PackChannel::Gloss, ChannelSource::new(&corrected)),
//! )?;
//! assert_eq!(packed.channels(), 2);
//! # Ok::<(), TextureError>(())
//! ```

pub mod buffer;
pub mod chain;
pub mod color;
pub mod config;
pub mod error;
pub mod filter;
pub mod generate;
pub mod histogram;
pub mod normal;
pub mod pack;
pub mod pipeline;
pub mod profile;
pub mod toksvig;

pub use buffer::{ColorSpace, Image, Precision};
pub use chain::{MipChain, MipLevel, mip_dimensions};
pub use config::TextureSettings;
pub use error::{Result, TextureError};
pub use filter::{EdgeMode, FilterKind};
pub use generate::{generate_mip_chain, generate_mip_chain_cancellable};
pub use histogram::{
    HistogramChannelMode, HistogramQuality, HistogramResult, HistogramSettings, HistogramWarning,
    analyze_histogram, apply_histogram_normalization,
};
pub use pack::{
    ChannelPackingSettings, ChannelPreprocess, ChannelSource, PackChannel, PackingMode,
    pack_channels,
};
pub use pipeline::{
    CancelFlag, MaterialInput, MaterialJob, PackedMaterial, ProcessedTexture, generate_chains,
    process_texture,
};
pub use profile::{GenerationProfile, MipModifier, TextureSemantic};
pub use toksvig::{RoughnessEncoding, ToksvigSettings, apply_toksvig_correction};
