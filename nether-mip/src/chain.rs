//! Mip levels and chains

use crate::buffer::Image;
use crate::error::{Result, TextureError};

/// Dimensions of mip `level` for a base of `width`×`height`.
///
/// Halving floors and never goes below 1, so non-power-of-two bases work.
#[inline]
pub fn mip_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shift = |d: u32| d.checked_shr(level).unwrap_or(0).max(1);
    (shift(width), shift(height))
}

/// Next level's dimensions
#[inline]
pub fn half_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// One level of a mip chain
#[derive(Debug, Clone, PartialEq)]
pub struct MipLevel {
    /// 0 = full resolution
    pub level: u32,
    pub image: Image,
}

impl MipLevel {
    pub fn new(level: u32, image: Image) -> Self {
        Self { level, image }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Ordered mip levels, level 0 first.
///
/// Never empty, and every level is the halving-with-floor of the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct MipChain {
    levels: Vec<MipLevel>,
}

impl MipChain {
    /// Build a chain from images ordered largest first.
    pub fn from_images(images: Vec<Image>) -> Result<Self> {
        let levels = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| MipLevel::new(i as u32, image))
            .collect();
        Self::from_levels(levels)
    }

    /// Build a chain from pre-made levels, checking the chain invariants.
    pub fn from_levels(levels: Vec<MipLevel>) -> Result<Self> {
        let chain = Self { levels };
        chain.validate()?;
        Ok(chain)
    }

    /// A single-level chain
    pub fn single(image: Image) -> Result<Self> {
        Self::from_levels(vec![MipLevel::new(0, image)])
    }

    /// Constructor for generators that uphold the invariants by construction
    pub(crate) fn from_levels_unchecked(levels: Vec<MipLevel>) -> Self {
        debug_assert!(!levels.is_empty());
        Self { levels }
    }

    /// Check non-emptiness, level indices, halving dimensions and a shared
    /// channel layout.
    pub fn validate(&self) -> Result<()> {
        let Some(base) = self.levels.first() else {
            return Err(TextureError::invalid("levels", "mip chain is empty"));
        };
        base.image.validate_kind()?;

        for (i, pair) in self.levels.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let expected = half_dimensions(prev.width(), prev.height());
            if next.dimensions() != expected {
                return Err(TextureError::DimensionMismatch {
                    expected,
                    found: next.dimensions(),
                });
            }
            if next.image.channels() != base.image.channels() {
                return Err(TextureError::UnsupportedChannelLayout(format!(
                    "level {} has {} channels, level 0 has {}",
                    i + 1,
                    next.image.channels(),
                    base.image.channels()
                )));
            }
        }

        for (i, level) in self.levels.iter().enumerate() {
            if level.level != i as u32 {
                return Err(TextureError::invalid(
                    "levels",
                    format!("level at position {} is tagged {}", i, level.level),
                ));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false for a constructed chain
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[inline]
    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }

    pub(crate) fn levels_mut(&mut self) -> &mut [MipLevel] {
        &mut self.levels
    }

    pub fn level(&self, index: usize) -> Option<&MipLevel> {
        self.levels.get(index)
    }

    /// Level 0
    pub fn base(&self) -> &MipLevel {
        &self.levels[0]
    }

    pub fn base_dimensions(&self) -> (u32, u32) {
        self.base().dimensions()
    }

    pub fn channels(&self) -> u8 {
        self.base().image.channels()
    }

    pub fn into_levels(self) -> Vec<MipLevel> {
        self.levels
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MipLevel> {
        self.levels.iter()
    }

    /// Apply `f` to every level image in order.
    pub fn map_levels<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(u32, &mut Image),
    {
        for level in &mut self.levels {
            f(level.level, &mut level.image);
        }
        self
    }

    /// Fail unless `other` has the same level-0 dimensions.
    pub fn ensure_same_base(&self, other: &MipChain) -> Result<()> {
        if self.base_dimensions() != other.base_dimensions() {
            return Err(TextureError::DimensionMismatch {
                expected: self.base_dimensions(),
                found: other.base_dimensions(),
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MipChain {
    type Item = &'a MipLevel;
    type IntoIter = std::slice::Iter<'a, MipLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}
