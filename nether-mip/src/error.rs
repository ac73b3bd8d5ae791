//! Error types for the texture pipeline

/// Errors returned by mip generation, normalization, Toksvig correction and packing.
///
/// Every variant is raised before any pixel work starts, so a failed call
/// never leaves partially written output behind.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Zero-area image or a channel count outside 1-4
    #[error("unsupported image: {width}x{height} with {channels} channel(s)")]
    UnsupportedImageKind {
        width: u32,
        height: u32,
        channels: u8,
    },

    /// Paired inputs whose dimensions differ
    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    /// Channel layout cannot support the requested operation
    #[error("unsupported channel layout: {0}")]
    UnsupportedChannelLayout(String),

    /// Out-of-range or non-finite setting
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Cancellation was requested between levels or chains
    #[error("texture processing cancelled")]
    Cancelled,

    /// Settings file could not be parsed
    #[error("failed to parse texture settings: {0}")]
    Config(#[from] toml::de::Error),
}

impl TextureError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TextureError>;

/// Reject NaN and infinities.
pub(crate) fn ensure_finite(name: &'static str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TextureError::invalid(name, format!("must be finite, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TextureError::DimensionMismatch {
            expected: (64, 64),
            found: (32, 32),
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: expected (64, 64), found (32, 32)"
        );

        let err = TextureError::invalid("percentile_low", "must be in [0, 100]");
        assert_eq!(
            err.to_string(),
            "invalid parameter `percentile_low`: must be in [0, 100]"
        );
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite("x", 1.0).is_ok());
        assert!(ensure_finite("x", f32::NAN).is_err());
        assert!(ensure_finite("x", f32::INFINITY).is_err());
    }
}
