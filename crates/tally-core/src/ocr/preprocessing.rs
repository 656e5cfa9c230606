//! Image normalization ahead of OCR.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use tracing::debug;

use crate::error::ImageError;

/// Suffix appended to the base name of a normalized image.
pub const NORMALIZED_SUFFIX: &str = "_processed";

/// Header-level facts about an input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    /// Container format guessed from the content.
    pub format: Option<ImageFormat>,
    /// Color representation of the decoded pixels.
    pub color: ColorType,
    /// Image dimensions (width, height).
    pub dimensions: (u32, u32),
}

impl ImageProbe {
    /// Already a three-channel PNG, so OCR can read it as-is.
    pub fn is_canonical(&self) -> bool {
        self.format == Some(ImageFormat::Png) && self.color == ColorType::Rgb8
    }
}

/// A three-channel image persisted for the OCR backend.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Location of the staged PNG.
    pub path: PathBuf,
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Whether the color representation had to be converted.
    pub converted: bool,
}

/// Canonicalizes arbitrary input images into RGB8 PNG files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageNormalizer;

impl ImageNormalizer {
    /// Create a new normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Read the image header without decoding pixels.
    pub fn probe(&self, bytes: &[u8]) -> Result<ImageProbe, ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;

        let format = reader.format();
        let decoder = reader.into_decoder().map_err(ImageError::Decode)?;

        Ok(ImageProbe {
            format,
            color: decoder.color_type(),
            dimensions: decoder.dimensions(),
        })
    }

    /// Path a normalized image is written to for a given input path.
    ///
    /// Same directory and base name, with [`NORMALIZED_SUFFIX`] and a `.png`
    /// extension.
    pub fn derived_path(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        input.with_file_name(format!("{}{}.png", stem, NORMALIZED_SUFFIX))
    }

    /// Decode `bytes`, convert to RGB8 if needed, and write the result next
    /// to `input` under [`Self::derived_path`].
    pub fn normalize(&self, bytes: &[u8], input: &Path) -> Result<NormalizedImage, ImageError> {
        let image = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
        let (width, height) = image.dimensions();

        let converted = image.color() != ColorType::Rgb8;
        let image = if converted {
            debug!("Converting {:?} image to RGB8", image.color());
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };

        let path = Self::derived_path(input);
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => ImageError::Io(io),
                other => ImageError::Encode(other),
            })?;

        debug!("Normalized {}x{} image to {}", width, height, path.display());

        Ok(NormalizedImage {
            path,
            width,
            height,
            converted,
        })
    }
}
