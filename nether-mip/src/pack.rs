//! Multi-channel packing (OG / OGM / OGMH)
//!
//! Composes single-channel mip chains into one packed chain, one source
//! channel per destination slot. Sources must share level-0 dimensions; the
//! packer never resamples.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::{Image, Precision};
use crate::chain::{MipChain, MipLevel, mip_dimensions};
use crate::error::{Result, TextureError};
use crate::toksvig::{ToksvigSettings, apply_toksvig_correction};

/// Fill value for a missing occlusion source (unoccluded)
pub const DEFAULT_OCCLUSION: f32 = 1.0;
/// Fill value for a missing gloss source
pub const DEFAULT_GLOSS: f32 = 0.5;
/// Fill value for a missing metalness source (dielectric)
pub const DEFAULT_METALNESS: f32 = 0.0;
/// Fill value for a missing height source (mid-plane)
pub const DEFAULT_HEIGHT: f32 = 0.5;

/// Semantic channel that can occupy a packed slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackChannel {
    Occlusion,
    Gloss,
    Metalness,
    Height,
}

impl PackChannel {
    pub fn default_value(self) -> f32 {
        match self {
            Self::Occlusion => DEFAULT_OCCLUSION,
            Self::Gloss => DEFAULT_GLOSS,
            Self::Metalness => DEFAULT_METALNESS,
            Self::Height => DEFAULT_HEIGHT,
        }
    }
}

/// Packed layout, named after its channel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    /// R = occlusion, G = gloss
    Og,
    /// R = occlusion, G = gloss, B = metalness
    #[default]
    Ogm,
    /// R = occlusion, G = gloss, B = metalness, A = height
    Ogmh,
}

impl PackingMode {
    /// Destination channel order
    pub fn layout(self) -> &'static [PackChannel] {
        use PackChannel::*;
        match self {
            Self::Og => &[Occlusion, Gloss],
            Self::Ogm => &[Occlusion, Gloss, Metalness],
            Self::Ogmh => &[Occlusion, Gloss, Metalness, Height],
        }
    }

    pub fn channels(self) -> u8 {
        self.layout().len() as u8
    }

    /// Destination index of `channel`, if this layout has one
    pub fn slot(self, channel: PackChannel) -> Option<usize> {
        self.layout().iter().position(|&c| c == channel)
    }

    /// Fill value for a slot with no configured source
    pub fn default_value(self, channel: PackChannel) -> f32 {
        channel.default_value()
    }
}

/// Transform run on a source channel before it is packed
#[derive(Debug, Clone, Copy, Default)]
pub enum ChannelPreprocess<'a> {
    #[default]
    None,
    /// `1 - v`, e.g. roughness into a gloss slot
    Invert,
    /// Toksvig-correct the source chain against `normal` first
    Toksvig {
        normal: &'a MipChain,
        settings: &'a ToksvigSettings,
    },
}

/// One channel of one chain feeding a packed slot
#[derive(Debug, Clone, Copy)]
pub struct ChannelSource<'a> {
    pub chain: &'a MipChain,
    pub channel: u8,
    pub preprocess: ChannelPreprocess<'a>,
}

impl<'a> ChannelSource<'a> {
    /// Channel 0 of `chain`, no preprocessing
    pub fn new(chain: &'a MipChain) -> Self {
        Self {
            chain,
            channel: 0,
            preprocess: ChannelPreprocess::None,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_preprocess(mut self, preprocess: ChannelPreprocess<'a>) -> Self {
        self.preprocess = preprocess;
        self
    }
}

/// Packing request. Absent sources are filled with their default value.
#[derive(Debug, Clone, Default)]
pub struct ChannelPackingSettings<'a> {
    pub mode: PackingMode,
    pub occlusion: Option<ChannelSource<'a>>,
    pub gloss: Option<ChannelSource<'a>>,
    pub metalness: Option<ChannelSource<'a>>,
    pub height: Option<ChannelSource<'a>>,
}

impl<'a> ChannelPackingSettings<'a> {
    pub fn new(mode: PackingMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, channel: PackChannel, source: ChannelSource<'a>) -> Self {
        *self.source_mut(channel) = Some(source);
        self
    }

    pub fn source(&self, channel: PackChannel) -> Option<&ChannelSource<'a>> {
        match channel {
            PackChannel::Occlusion => self.occlusion.as_ref(),
            PackChannel::Gloss => self.gloss.as_ref(),
            PackChannel::Metalness => self.metalness.as_ref(),
            PackChannel::Height => self.height.as_ref(),
        }
    }

    fn source_mut(&mut self, channel: PackChannel) -> &mut Option<ChannelSource<'a>> {
        match channel {
            PackChannel::Occlusion => &mut self.occlusion,
            PackChannel::Gloss => &mut self.gloss,
            PackChannel::Metalness => &mut self.metalness,
            PackChannel::Height => &mut self.height,
        }
    }

    fn present(&self) -> impl Iterator<Item = (PackChannel, &ChannelSource<'a>)> {
        [
            PackChannel::Occlusion,
            PackChannel::Gloss,
            PackChannel::Metalness,
            PackChannel::Height,
        ]
        .into_iter()
        .filter_map(|c| self.source(c).map(|s| (c, s)))
    }

    /// Reject malformed source chains, sources the layout has no slot for,
    /// bad channel indices and mismatched base dimensions.
    pub fn validate(&self) -> Result<()> {
        let mut base: Option<&MipChain> = None;
        for (channel, source) in self.present() {
            source.chain.validate()?;
            if self.mode.slot(channel).is_none() {
                return Err(TextureError::invalid(
                    "sources",
                    format!("{:?} has no slot in {:?} packing", channel, self.mode),
                ));
            }
            if source.channel >= source.chain.channels() {
                return Err(TextureError::UnsupportedChannelLayout(format!(
                    "{:?} source channel {} requested from a {}-channel chain",
                    channel,
                    source.channel,
                    source.chain.channels()
                )));
            }
            match base {
                Some(first) => first.ensure_same_base(source.chain)?,
                None => base = Some(source.chain),
            }
        }
        if base.is_none() {
            return Err(TextureError::invalid("sources", "no source chains to pack"));
        }
        Ok(())
    }
}

/// One source reduced to its packed channel, per level
struct Plane {
    levels: Vec<Vec<f32>>,
    /// Mean of the last level, used past the end of a short chain
    tail: f32,
    precision: Precision,
}

impl Plane {
    fn prepare(source: &ChannelSource<'_>) -> Result<Self> {
        let corrected;
        let chain = match source.preprocess {
            ChannelPreprocess::Toksvig { normal, settings } => {
                let settings = ToksvigSettings {
                    channel: source.channel,
                    ..settings.clone()
                };
                corrected = apply_toksvig_correction(source.chain, normal, &settings)?;
                &corrected
            }
            _ => source.chain,
        };

        let stride = chain.channels() as usize;
        let c = source.channel as usize;
        let invert = matches!(source.preprocess, ChannelPreprocess::Invert);
        let levels: Vec<Vec<f32>> = chain
            .iter()
            .map(|level| {
                level
                    .image
                    .data()
                    .par_chunks_exact(stride)
                    .map(|px| if invert { 1.0 - px[c] } else { px[c] })
                    .collect()
            })
            .collect();
        let tail = levels
            .last()
            .map(|l| l.iter().sum::<f32>() / l.len().max(1) as f32)
            .unwrap_or(0.0);

        Ok(Self {
            levels,
            tail,
            precision: chain.base().image.precision(),
        })
    }

    #[inline]
    fn value(&self, level: usize, index: usize) -> f32 {
        self.levels.get(level).map_or(self.tail, |l| l[index])
    }
}

/// Pack the configured sources into a chain with `settings.mode.channels()`
/// channels.
///
/// The output has as many levels as the longest source. Shorter sources
/// are extended with the mean of their last level.
pub fn pack_channels(settings: &ChannelPackingSettings<'_>) -> Result<MipChain> {
    settings.validate()?;
    let mode = settings.mode;
    let layout = mode.layout();

    let planes: Vec<Option<Plane>> = layout
        .iter()
        .map(|&c| settings.source(c).map(Plane::prepare).transpose())
        .collect::<Result<_>>()?;

    let level_count = planes
        .iter()
        .flatten()
        .map(|p| p.levels.len())
        .max()
        .unwrap_or(1);
    let (base_w, base_h) = settings
        .present()
        .next()
        .map(|(_, s)| s.chain.base_dimensions())
        .unwrap_or((1, 1));

    for (channel, plane) in layout.iter().zip(&planes) {
        let Some(plane) = plane else { continue };
        if plane.levels.len() < level_count {
            tracing::warn!(
                "{:?} source has {} mip levels, extending to {} with its mean",
                channel,
                plane.levels.len(),
                level_count
            );
        }
    }

    let precision = if planes
        .iter()
        .flatten()
        .any(|p| p.precision == Precision::F32)
    {
        Precision::F32
    } else {
        Precision::U8
    };

    let channels = mode.channels() as usize;
    let defaults: Vec<f32> = layout.iter().map(|&c| mode.default_value(c)).collect();
    let mut levels = Vec::with_capacity(level_count);

    for l in 0..level_count {
        let (w, h) = mip_dimensions(base_w, base_h, l as u32);
        let mut image = Image::filled(w, h, channels as u8, 0.0).with_precision(precision);
        image
            .data_mut()
            .par_chunks_mut(channels)
            .enumerate()
            .for_each(|(i, px)| {
                for (slot, out) in px.iter_mut().enumerate() {
                    *out = match &planes[slot] {
                        Some(plane) => plane.value(l, i),
                        None => defaults[slot],
                    };
                }
            });
        levels.push(MipLevel::new(l as u32, image));
    }

    tracing::debug!(
        "Packed {:?} chain: {}x{}, {} levels, {} of {} slots sourced",
        mode,
        base_w,
        base_h,
        levels.len(),
        planes.iter().flatten().count(),
        layout.len()
    );

    Ok(MipChain::from_levels_unchecked(levels))
}
