//! Job-level orchestration: cancellation, parallel chain generation and
//! material packing
//!
//! Independent chains are generated on the rayon pool. Everything a job
//! needs is validated before the first chain starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::buffer::Image;
use crate::chain::MipChain;
use crate::config::TextureSettings;
use crate::error::{Result, TextureError};
use crate::generate::generate_mip_chain_cancellable;
use crate::histogram::{HistogramResult, analyze_histogram, apply_histogram_normalization};
use crate::pack::{
    ChannelPackingSettings, ChannelPreprocess, ChannelSource, PackChannel, PackingMode,
    pack_channels,
};
use crate::profile::GenerationProfile;

/// Shared cancellation flag, checked between mip levels and between chains.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Generate independent chains in parallel, in input order.
pub fn generate_chains(
    jobs: &[(&Image, &GenerationProfile)],
    cancel: &CancelFlag,
) -> Result<Vec<MipChain>> {
    jobs.iter().try_for_each(|(_, profile)| profile.validate())?;

    jobs.par_iter()
        .map(|(image, profile)| {
            if cancel.is_cancelled() {
                return Err(TextureError::Cancelled);
            }
            generate_mip_chain_cancellable(image, profile, cancel)
        })
        .collect()
}

/// A generated (and possibly normalized) chain
#[derive(Debug, Clone)]
pub struct ProcessedTexture {
    pub chain: MipChain,
    /// Present when normalization ran; carries the decode pair for the encoder
    pub histogram: Option<HistogramResult>,
}

/// Generate a chain under `settings`, then normalize it when
/// `settings.histogram` is set. The histogram is measured on level 0.
pub fn process_texture(
    image: &Image,
    settings: &TextureSettings,
    cancel: &CancelFlag,
) -> Result<ProcessedTexture> {
    settings.validate()?;
    let chain = generate_mip_chain_cancellable(image, &settings.effective_profile(), cancel)?;

    let Some(histogram) = &settings.histogram else {
        return Ok(ProcessedTexture {
            chain,
            histogram: None,
        });
    };
    if cancel.is_cancelled() {
        return Err(TextureError::Cancelled);
    }
    let result = analyze_histogram(&chain.base().image, histogram)?;
    let chain = apply_histogram_normalization(chain, &result)?;
    Ok(ProcessedTexture {
        chain,
        histogram: Some(result),
    })
}

/// One source image of a material and how to treat it
#[derive(Debug, Clone)]
pub struct MaterialInput<'a> {
    pub image: &'a Image,
    pub settings: TextureSettings,
}

impl<'a> MaterialInput<'a> {
    pub fn new(image: &'a Image, settings: TextureSettings) -> Self {
        Self { image, settings }
    }
}

/// Source images for one packed material texture.
///
/// A `toksvig` block on any packed input corrects it against `normal`
/// before packing.
#[derive(Debug, Clone, Default)]
pub struct MaterialJob<'a> {
    pub mode: PackingMode,
    pub occlusion: Option<MaterialInput<'a>>,
    pub gloss: Option<MaterialInput<'a>>,
    pub metalness: Option<MaterialInput<'a>>,
    pub height: Option<MaterialInput<'a>>,
    pub normal: Option<MaterialInput<'a>>,
}

/// Output of a [`MaterialJob`]
#[derive(Debug, Clone)]
pub struct PackedMaterial {
    pub packed: MipChain,
    /// Generated normal chain, when the job had one
    pub normal: Option<MipChain>,
    /// Decode pairs of the inputs that were normalized
    pub histograms: Vec<(PackChannel, HistogramResult)>,
}

impl<'a> MaterialJob<'a> {
    pub fn new(mode: PackingMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_input(mut self, channel: PackChannel, input: MaterialInput<'a>) -> Self {
        let slot = match channel {
            PackChannel::Occlusion => &mut self.occlusion,
            PackChannel::Gloss => &mut self.gloss,
            PackChannel::Metalness => &mut self.metalness,
            PackChannel::Height => &mut self.height,
        };
        *slot = Some(input);
        self
    }

    pub fn with_normal(mut self, input: MaterialInput<'a>) -> Self {
        self.normal = Some(input);
        self
    }

    fn packed_inputs(&self) -> Vec<(PackChannel, &MaterialInput<'a>)> {
        [
            (PackChannel::Occlusion, &self.occlusion),
            (PackChannel::Gloss, &self.gloss),
            (PackChannel::Metalness, &self.metalness),
            (PackChannel::Height, &self.height),
        ]
        .into_iter()
        .filter_map(|(c, input)| input.as_ref().map(|i| (c, i)))
        .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let inputs = self.packed_inputs();
        if inputs.is_empty() {
            return Err(TextureError::invalid("inputs", "material has nothing to pack"));
        }
        for (channel, input) in &inputs {
            input.settings.validate()?;
            if self.mode.slot(*channel).is_none() {
                return Err(TextureError::invalid(
                    "inputs",
                    format!("{:?} has no slot in {:?} packing", channel, self.mode),
                ));
            }
            if input.settings.toksvig.is_some() && self.normal.is_none() {
                return Err(TextureError::invalid(
                    "toksvig",
                    format!("{:?} asks for Toksvig correction without a normal map", channel),
                ));
            }
        }
        if let Some(normal) = &self.normal {
            normal.settings.validate()?;
        }
        Ok(())
    }

    /// Generate every chain in parallel, then correct and pack.
    pub fn run(&self, cancel: &CancelFlag) -> Result<PackedMaterial> {
        self.validate()?;

        let inputs = self.packed_inputs();
        let (normal, processed) = rayon::join(
            || {
                self.normal
                    .as_ref()
                    .map(|n| process_texture(n.image, &n.settings, cancel))
                    .transpose()
            },
            || {
                inputs
                    .par_iter()
                    .map(|(_, input)| {
                        if cancel.is_cancelled() {
                            return Err(TextureError::Cancelled);
                        }
                        process_texture(input.image, &input.settings, cancel)
                    })
                    .collect::<Result<Vec<ProcessedTexture>>>()
            },
        );
        let normal = normal?.map(|p| p.chain);
        let processed = processed?;

        if cancel.is_cancelled() {
            return Err(TextureError::Cancelled);
        }

        let mut settings = ChannelPackingSettings::new(self.mode);
        for ((channel, input), texture) in inputs.iter().zip(&processed) {
            let mut source = ChannelSource::new(&texture.chain);
            if let (Some(toksvig), Some(normal)) = (&input.settings.toksvig, &normal) {
                source = source.with_preprocess(ChannelPreprocess::Toksvig {
                    normal,
                    settings: toksvig,
                });
            }
            settings = settings.with_source(*channel, source);
        }
        let packed = pack_channels(&settings)?;

        let histograms = inputs
            .iter()
            .zip(&processed)
            .filter_map(|((channel, _), texture)| {
                texture.histogram.clone().map(|h| (*channel, h))
            })
            .collect();

        tracing::debug!(
            "Material packed as {:?}: {} inputs, normal map {}",
            self.mode,
            inputs.len(),
            if normal.is_some() { "present" } else { "absent" }
        );

        Ok(PackedMaterial {
            packed,
            normal,
            histograms,
        })
    }
}
