//! Mip generation profiles bound to a texture semantic

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::MipLevel;
use crate::error::{Result, TextureError, ensure_finite};
use crate::filter::{EdgeMode, FilterKind, MAX_BLUR_RADIUS, gaussian_blur};
use crate::normal;

/// What a texture's channels mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureSemantic {
    /// Albedo / base color
    Color,
    /// Tangent-space normal map
    Normal,
    Gloss,
    Roughness,
    Metallic,
    /// Ambient occlusion
    Occlusion,
    Height,
    #[default]
    Generic,
}

impl TextureSemantic {
    /// Color data goes back to gamma-encoded space after linear-light filtering.
    pub fn requires_encoded_output(self) -> bool {
        matches!(self, Self::Color)
    }
}

/// Closure-backed modifier for transforms outside the built-in set
#[derive(Clone)]
pub struct CustomModifier(Arc<dyn Fn(&mut MipLevel) + Send + Sync>);

impl CustomModifier {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut MipLevel) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for CustomModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomModifier(..)")
    }
}

/// Per-level transform run after filtering, in registration order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MipModifier {
    /// Gaussian blur with the given standard deviation in pixels
    Blur { radius: f32 },
    /// Rescale encoded normals to unit length
    RenormalizeNormals,
    /// Not representable in settings files
    #[serde(skip)]
    Custom(CustomModifier),
}

impl MipModifier {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut MipLevel) + Send + Sync + 'static,
    {
        Self::Custom(CustomModifier::new(f))
    }

    pub fn apply(&self, level: &mut MipLevel, edge: EdgeMode) -> Result<()> {
        match self {
            Self::Blur { radius } => gaussian_blur(&mut level.image, *radius, edge),
            Self::RenormalizeNormals => normal::renormalize(&mut level.image)?,
            Self::Custom(f) => (f.0)(level),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::Blur { radius } = *self {
            ensure_finite("modifier.radius", radius)?;
            if !(0.0..=MAX_BLUR_RADIUS).contains(&radius) {
                return Err(TextureError::invalid(
                    "modifier.radius",
                    format!("must be in [0, {}]", MAX_BLUR_RADIUS),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable mip generation settings for one texture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationProfile {
    pub semantic: TextureSemantic,
    pub filter: FilterKind,
    pub edge_mode: EdgeMode,
    /// Filter gamma-encoded sources in linear light
    pub apply_gamma_correction: bool,
    pub gamma: f32,
    /// Extra gaussian blur on every filtered level
    pub blur_radius: Option<f32>,
    /// Levels whose larger side falls below this are not produced
    pub min_mip_size: u32,
    /// Keep the smallest level
    pub include_last_level: bool,
    /// Renormalize encoded normals after filtering
    pub normalize_normals: bool,
    pub modifiers: Vec<MipModifier>,
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self {
            semantic: TextureSemantic::Generic,
            filter: FilterKind::Box,
            edge_mode: EdgeMode::Clamp,
            apply_gamma_correction: false,
            gamma: 2.2,
            blur_radius: None,
            min_mip_size: 1,
            include_last_level: true,
            normalize_normals: false,
            modifiers: Vec::new(),
        }
    }
}

impl GenerationProfile {
    /// Preset for a texture semantic
    pub fn for_semantic(semantic: TextureSemantic) -> Self {
        let base = Self {
            semantic,
            ..Self::default()
        };
        match semantic {
            TextureSemantic::Color => Self {
                filter: FilterKind::Mitchell,
                apply_gamma_correction: true,
                ..base
            },
            TextureSemantic::Normal => Self {
                filter: FilterKind::KAISER,
                normalize_normals: true,
                ..base
            },
            TextureSemantic::Gloss
            | TextureSemantic::Roughness
            | TextureSemantic::Metallic
            | TextureSemantic::Occlusion => Self {
                filter: FilterKind::KAISER,
                ..base
            },
            // Height keeps the box filter so the mean surface level is preserved
            TextureSemantic::Height | TextureSemantic::Generic => base,
        }
    }

    pub fn with_filter(mut self, filter: FilterKind) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_min_mip_size(mut self, min_mip_size: u32) -> Self {
        self.min_mip_size = min_mip_size;
        self
    }

    pub fn with_edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.edge_mode = edge_mode;
        self
    }

    pub fn with_modifier(mut self, modifier: MipModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        ensure_finite("gamma", self.gamma)?;
        if self.gamma <= 0.0 {
            return Err(TextureError::invalid("gamma", "must be positive"));
        }
        if let Some(radius) = self.blur_radius {
            ensure_finite("blur_radius", radius)?;
            if !(0.0..=MAX_BLUR_RADIUS).contains(&radius) {
                return Err(TextureError::invalid(
                    "blur_radius",
                    format!("must be in [0, {}]", MAX_BLUR_RADIUS),
                ));
            }
        }
        if self.min_mip_size == 0 {
            return Err(TextureError::invalid("min_mip_size", "must be at least 1"));
        }
        self.modifiers.iter().try_for_each(MipModifier::validate)
    }
}
