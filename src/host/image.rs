//! Float RGBA images held by the scene store, plus encoding to disk.

use crate::error::{BakeError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba32FImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Channels per pixel.
pub const CHANNELS: usize = 4;

/// A named RGBA float image, row-major with the first row at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl ImageBuffer {
    /// Transparent black image.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pixels: vec![0.0; width as usize * height as usize * CHANNELS],
        }
    }

    /// Image filled with one color.
    pub fn filled(name: impl Into<String>, width: u32, height: u32, rgba: [f32; 4]) -> Self {
        let mut image = Self::new(name, width, height);
        for px in image.pixels.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&rgba);
        }
        image
    }

    pub fn from_pixels(
        name: impl Into<String>,
        width: u32,
        height: u32,
        pixels: Vec<f32>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(BakeError::SharedBuffer(format!(
                "pixel count {} does not match {}x{} RGBA ({})",
                pixels.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            pixels,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let mut px = [0.0; 4];
        px.copy_from_slice(&self.pixels[i..i + CHANNELS]);
        Some(px)
    }

    pub fn pixels_rgba(&self) -> impl Iterator<Item = &[f32]> {
        self.pixels.chunks_exact(CHANNELS)
    }

    pub fn pixels_rgba_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.pixels.chunks_exact_mut(CHANNELS)
    }

    fn to_rgba32f(&self) -> Result<Rgba32FImage> {
        Rgba32FImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            BakeError::Serialization(format!("image {} has inconsistent pixel data", self.name))
        })
    }

    /// Resample to a new size.
    pub fn resized(&self, width: u32, height: u32) -> Result<ImageBuffer> {
        if (width, height) == self.size() {
            return Ok(self.clone());
        }
        let scaled = image::imageops::resize(&self.to_rgba32f()?, width, height, FilterType::Triangle);
        Ok(ImageBuffer {
            name: self.name.clone(),
            width,
            height,
            pixels: scaled.into_raw(),
        })
    }

    /// Encode to `path` with the given settings, replacing any existing file.
    pub fn save(&self, path: &Path, settings: &ImageSettings) -> Result<()> {
        // Stored bottom-up; files are top-down.
        let rgba = DynamicImage::ImageRgba32F(self.to_rgba32f()?).flipv();
        let with_alpha = settings.color_mode == ColorMode::Rgba;
        let wide = settings.color_depth > 8;

        let encoded = match settings.file_format {
            ImageFileFormat::Jpeg => {
                let writer = BufWriter::new(File::create(path)?);
                let encoder = JpegEncoder::new_with_quality(writer, settings.quality.clamp(1, 100));
                DynamicImage::ImageRgb8(rgba.to_rgb8()).write_with_encoder(encoder)?;
                return Ok(());
            }
            ImageFileFormat::OpenExr if with_alpha => rgba,
            ImageFileFormat::OpenExr => DynamicImage::ImageRgb32F(rgba.to_rgb32f()),
            ImageFileFormat::Png | ImageFileFormat::Tiff if wide && with_alpha => {
                DynamicImage::ImageRgba16(rgba.to_rgba16())
            }
            ImageFileFormat::Png | ImageFileFormat::Tiff if wide => {
                DynamicImage::ImageRgb16(rgba.to_rgb16())
            }
            _ if with_alpha => DynamicImage::ImageRgba8(rgba.to_rgba8()),
            _ => DynamicImage::ImageRgb8(rgba.to_rgb8()),
        };
        encoded.save_with_format(path, settings.file_format.image_format())?;
        Ok(())
    }
}

// ==================== Save settings ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageFileFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tiff,
    #[serde(alias = "TGA")]
    Targa,
    OpenExr,
}

impl ImageFileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFileFormat::Png => "png",
            ImageFileFormat::Jpeg => "jpeg",
            ImageFileFormat::Bmp => "bmp",
            ImageFileFormat::Tiff => "tiff",
            ImageFileFormat::Targa => "tga",
            ImageFileFormat::OpenExr => "exr",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            ImageFileFormat::Png => ImageFormat::Png,
            ImageFileFormat::Jpeg => ImageFormat::Jpeg,
            ImageFileFormat::Bmp => ImageFormat::Bmp,
            ImageFileFormat::Tiff => ImageFormat::Tiff,
            ImageFileFormat::Targa => ImageFormat::Tga,
            ImageFileFormat::OpenExr => ImageFormat::OpenExr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorMode {
    Rgb,
    #[default]
    Rgba,
}

/// How `SaveToImage` encodes files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub file_format: ImageFileFormat,
    pub color_mode: ColorMode,
    /// Bits per channel; 8 or 16 for integer formats.
    pub color_depth: u8,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            file_format: ImageFileFormat::Png,
            color_mode: ColorMode::Rgba,
            color_depth: 16,
            quality: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_pixels_checks_len() {
        assert!(ImageBuffer::from_pixels("a", 2, 2, vec![0.0; 16]).is_ok());
        assert!(ImageBuffer::from_pixels("a", 2, 2, vec![0.0; 15]).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut image = ImageBuffer::new("a", 2, 2);
        image.pixels[4..8].copy_from_slice(&[1.0, 0.5, 0.25, 1.0]);
        assert_eq!(image.pixel(1, 0), Some([1.0, 0.5, 0.25, 1.0]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn test_resized_keeps_flat_color() {
        let image = ImageBuffer::filled("a", 4, 4, [0.5, 0.5, 1.0, 1.0]);
        let scaled = image.resized(2, 8).unwrap();
        assert_eq!(scaled.size(), (2, 8));
        for px in scaled.pixels_rgba() {
            assert!((px[0] - 0.5).abs() < 1e-5);
            assert!((px[2] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_settings_serde_names() {
        let settings: ImageSettings =
            serde_json::from_value(json!({"file_format": "OPEN_EXR", "color_mode": "RGB"})).unwrap();
        assert_eq!(settings.file_format, ImageFileFormat::OpenExr);
        assert_eq!(settings.file_format.extension(), "exr");
        assert_eq!(settings.color_depth, 16);

        let tga: ImageSettings = serde_json::from_value(json!({"file_format": "TGA"})).unwrap();
        assert_eq!(tga.file_format, ImageFileFormat::Targa);
    }

    #[test]
    fn test_save_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let image = ImageBuffer::filled("a", 8, 8, [1.0, 0.0, 0.0, 1.0]);

        let png = dir.path().join("a.png");
        image.save(&png, &ImageSettings::default()).unwrap();
        let decoded = image::open(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));

        let jpg = dir.path().join("a.jpg");
        let settings = ImageSettings {
            file_format: ImageFileFormat::Jpeg,
            ..Default::default()
        };
        image.save(&jpg, &settings).unwrap();
        assert!(jpg.exists());
    }
}
