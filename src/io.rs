// ============================================================================
// IMAGE I/O — decode inputs, encode results
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, GrayImage, ImageError, RgbaImage};

// -- Error type ------------------------------------------------------------

/// Error type for file decode/encode operations.
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Image(ImageError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "I/O error: {}", e),
            IoError::Image(e) => write!(f, "image error: {}", e),
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e)
    }
}

impl From<ImageError> for IoError {
    fn from(e: ImageError) -> Self {
        IoError::Image(e)
    }
}

// -- Save formats ----------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name or file extension; `None` for anything unknown.
    pub fn from_name(name: &str) -> Option<SaveFormat> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpeg" | "jpg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tiff" | "tif" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }
}

// -- Decode ----------------------------------------------------------------

/// Decode any supported still-image file into RGBA.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, IoError> {
    Ok(image::open(path)?.into_rgba8())
}

/// Decode a mask file into a single-channel intensity image.
pub fn load_mask(path: &Path) -> Result<GrayImage, IoError> {
    Ok(image::open(path)?.into_luma8())
}

// -- Encode ----------------------------------------------------------------

/// Encode `image` to `path` in the requested format.
/// `quality` (1–100) applies to JPEG only.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), IoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG carries no alpha; flatten to RGB first
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Webp => {
            DynamicImage::ImageRgba8(image.clone()).save(path)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tiff => {
            let encoder = TiffEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }

    Ok(())
}
