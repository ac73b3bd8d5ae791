//! Per-texture settings loaded from TOML
//!
//! ```toml
//! semantic = "gloss"
//!
//! [profile]
//! min_mip_size = 4
//! filter = { kind = "kaiser", width = 3.0, alpha = 4.0 }
//!
//! [histogram]
//! quality = "fast"
//!
//! [toksvig]
//! encoding = "gloss"
//! composite_power = 0.75
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextureError};
use crate::histogram::HistogramSettings;
use crate::profile::{GenerationProfile, TextureSemantic};
use crate::toksvig::ToksvigSettings;

/// Everything the pipeline needs to know about one texture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureSettings {
    #[serde(default)]
    pub semantic: TextureSemantic,
    /// Explicit generation profile; the semantic preset when absent
    #[serde(default)]
    pub profile: Option<GenerationProfile>,
    /// Run histogram normalization when present
    #[serde(default)]
    pub histogram: Option<HistogramSettings>,
    /// Toksvig-correct against a normal map when present
    #[serde(default)]
    pub toksvig: Option<ToksvigSettings>,
}

impl TextureSettings {
    pub fn new(semantic: TextureSemantic) -> Self {
        Self {
            semantic,
            ..Default::default()
        }
    }

    /// Parse and validate settings from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The explicit profile, else the preset for `semantic`.
    ///
    /// An explicit profile keeps its own fields but takes the outer semantic.
    pub fn effective_profile(&self) -> GenerationProfile {
        match &self.profile {
            Some(profile) => GenerationProfile {
                semantic: self.semantic,
                ..profile.clone()
            },
            None => GenerationProfile::for_semantic(self.semantic),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.effective_profile().validate()?;
        if let Some(histogram) = &self.histogram {
            histogram.validate()?;
        }
        if let Some(toksvig) = &self.toksvig {
            toksvig.validate()?;
            if matches!(
                self.semantic,
                TextureSemantic::Color | TextureSemantic::Normal
            ) {
                return Err(TextureError::invalid(
                    "toksvig",
                    format!("cannot correct a {:?} texture", self.semantic),
                ));
            }
        }
        Ok(())
    }
}
