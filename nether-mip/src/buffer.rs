//! In-memory image buffer shared by every pipeline stage
//!
//! Samples are stored as `f32` regardless of the declared [`Precision`]; the
//! precision tag only decides how the buffer is quantized when it is handed
//! to an encoder ([`Image::to_u8_bytes`]).

use ::image::{
    DynamicImage, GrayAlphaImage, GrayImage, Rgb32FImage, RgbImage, Rgba32FImage, RgbaImage,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TextureError};

/// Largest supported channel count (RGBA)
pub const MAX_CHANNELS: u8 = 4;

/// Color-space hint carried by an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// Values are proportional to light (normals, masks, float data)
    #[default]
    Linear,
    /// Values are gamma encoded (typical 8-bit albedo)
    Encoded,
}

/// Declared storage precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// 8 bits per channel
    #[default]
    U8,
    /// 32-bit float per channel
    F32,
}

/// 2D pixel grid with 1-4 interleaved channels, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u8,
    precision: Precision,
    color_space: ColorSpace,
    data: Vec<f32>,
}

impl Image {
    /// Create an image with every sample set to `value`
    pub fn filled(width: u32, height: u32, channels: u8, value: f32) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            precision: Precision::F32,
            color_space: ColorSpace::Linear,
            data: vec![value; len],
        }
    }

    /// Wrap float samples. `data.len()` must equal `width * height * channels`.
    pub fn from_f32(width: u32, height: u32, channels: u8, data: Vec<f32>) -> Result<Self> {
        check_len(width, height, channels, data.len())?;
        Ok(Self {
            width,
            height,
            channels,
            precision: Precision::F32,
            color_space: ColorSpace::Linear,
            data,
        })
    }

    /// Convert 8-bit samples to the [0, 1] float range.
    pub fn from_u8(width: u32, height: u32, channels: u8, bytes: &[u8]) -> Result<Self> {
        check_len(width, height, channels, bytes.len())?;
        Ok(Self {
            width,
            height,
            channels,
            precision: Precision::U8,
            color_space: ColorSpace::Linear,
            data: unorm8(bytes),
        })
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// New zero-filled image sharing this image's channel layout and tags
    pub(crate) fn blank_like(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: self.channels,
            precision: self.precision,
            color_space: self.color_space,
            data: vec![0.0; width as usize * height as usize * self.channels as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    #[inline]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[inline]
    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub(crate) fn set_color_space(&mut self, color_space: ColorSpace) {
        self.color_space = color_space;
    }

    /// Number of pixels (not samples)
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True for zero-area images
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Interleaved samples, row-major
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Samples per row
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Channel samples of pixel (x, y)
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let idx = self.index(x, y);
        &self.data[idx..idx + self.channels as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let idx = self.index(x, y);
        let channels = self.channels as usize;
        &mut self.data[idx..idx + channels]
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, channel: u8) -> f32 {
        self.data[self.index(x, y) + channel as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, channel: u8, value: f32) {
        let idx = self.index(x, y) + channel as usize;
        self.data[idx] = value;
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// Number of color channels; alpha is excluded for 2- and 4-channel images.
    pub fn color_channels(&self) -> u8 {
        match self.channels {
            2 => 1,
            4 => 3,
            n => n,
        }
    }

    /// Fail with [`TextureError::UnsupportedImageKind`] for zero-area images
    /// or channel counts outside 1-4.
    pub fn validate_kind(&self) -> Result<()> {
        if self.is_empty() || self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(TextureError::UnsupportedImageKind {
                width: self.width,
                height: self.height,
                channels: self.channels,
            });
        }
        Ok(())
    }

    /// Copy a single channel out as a one-channel image.
    pub fn extract_channel(&self, channel: u8) -> Result<Image> {
        if channel >= self.channels {
            return Err(TextureError::UnsupportedChannelLayout(format!(
                "channel {} requested from a {}-channel image",
                channel, self.channels
            )));
        }
        let data = self
            .data
            .chunks_exact(self.channels as usize)
            .map(|px| px[channel as usize])
            .collect();
        Ok(Self {
            width: self.width,
            height: self.height,
            channels: 1,
            precision: self.precision,
            color_space: self.color_space,
            data,
        })
    }

    /// Quantize to 8 bits per sample, clamping to [0, 1].
    pub fn to_u8_bytes(&self) -> Vec<u8> {
        self.data.iter().map(|&v| quantize_u8(v)).collect()
    }

    /// Convert into an `image` crate buffer.
    ///
    /// 8-bit images keep their channel layout. Float images become
    /// `Rgb32F`/`Rgba32F`; 1- and 2-channel float data is splatted to gray.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        let (w, h) = (self.width, self.height);
        match self.precision {
            Precision::U8 => {
                let bytes = self.to_u8_bytes();
                let img = match self.channels {
                    1 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
                    2 => GrayAlphaImage::from_raw(w, h, bytes).map(DynamicImage::ImageLumaA8),
                    3 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
                    _ => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
                };
                img.unwrap_or_else(|| DynamicImage::new_rgba8(w, h))
            }
            Precision::F32 => {
                let img = match self.channels {
                    1 => Rgb32FImage::from_raw(
                        w,
                        h,
                        self.data.iter().flat_map(|&v| [v, v, v]).collect(),
                    )
                    .map(DynamicImage::ImageRgb32F),
                    2 => Rgba32FImage::from_raw(
                        w,
                        h,
                        self.data
                            .chunks_exact(2)
                            .flat_map(|p| [p[0], p[0], p[0], p[1]])
                            .collect(),
                    )
                    .map(DynamicImage::ImageRgba32F),
                    3 => Rgb32FImage::from_raw(w, h, self.data.clone())
                        .map(DynamicImage::ImageRgb32F),
                    _ => Rgba32FImage::from_raw(w, h, self.data.clone())
                        .map(DynamicImage::ImageRgba32F),
                };
                img.unwrap_or_else(|| DynamicImage::new_rgba32f(w, h))
            }
        }
    }
}

/// Decoded images from the `image` crate.
///
/// 8-bit buffers are tagged [`ColorSpace::Encoded`] (the PNG/JPEG convention);
/// 16-bit and float buffers are tagged [`Precision::F32`] and linear.
impl From<&DynamicImage> for Image {
    fn from(img: &DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (channels, data): (u8, Vec<f32>) = match img {
            DynamicImage::ImageLuma8(b) => (1, unorm8(b.as_raw())),
            DynamicImage::ImageLumaA8(b) => (2, unorm8(b.as_raw())),
            DynamicImage::ImageRgb8(b) => (3, unorm8(b.as_raw())),
            DynamicImage::ImageRgba8(b) => (4, unorm8(b.as_raw())),
            DynamicImage::ImageLuma16(b) => (1, unorm16(b.as_raw())),
            DynamicImage::ImageLumaA16(b) => (2, unorm16(b.as_raw())),
            DynamicImage::ImageRgb16(b) => (3, unorm16(b.as_raw())),
            DynamicImage::ImageRgba16(b) => (4, unorm16(b.as_raw())),
            DynamicImage::ImageRgb32F(b) => (3, b.as_raw().clone()),
            DynamicImage::ImageRgba32F(b) => (4, b.as_raw().clone()),
            other => (4, other.to_rgba32f().into_raw()),
        };

        let eight_bit = matches!(
            img,
            DynamicImage::ImageLuma8(_)
                | DynamicImage::ImageLumaA8(_)
                | DynamicImage::ImageRgb8(_)
                | DynamicImage::ImageRgba8(_)
        );
        let (precision, color_space) = if eight_bit {
            (Precision::U8, ColorSpace::Encoded)
        } else {
            (Precision::F32, ColorSpace::Linear)
        };

        Image {
            width,
            height,
            channels,
            precision,
            color_space,
            data,
        }
    }
}

impl From<DynamicImage> for Image {
    fn from(img: DynamicImage) -> Self {
        Image::from(&img)
    }
}

fn unorm8(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| b as f32 / 255.0).collect()
}

fn unorm16(words: &[u16]) -> Vec<f32> {
    words.iter().map(|&w| w as f32 / 65535.0).collect()
}

#[inline]
pub(crate) fn quantize_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn check_len(width: u32, height: u32, channels: u8, len: usize) -> Result<()> {
    let expected = width as usize * height as usize * channels as usize;
    if len != expected {
        return Err(TextureError::invalid(
            "data",
            format!(
                "expected {} samples ({}x{}x{}), got {}",
                expected, width, height, channels, len
            ),
        ));
    }
    Ok(())
}
