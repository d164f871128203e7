use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use serde::Serialize;

/// A PNG-encoded image with its dimensions.
///
/// The bytes are not serialized; JSON output carries only the metadata and the
/// caller decides where the PNG goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub png: Vec<u8>,
}

impl EncodedImage {
    pub fn encode(image: &RgbImage) -> Result<Self> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode PNG")?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            png,
        })
    }

    pub fn decode(&self) -> Result<RgbImage> {
        let image = image::load_from_memory_with_format(&self.png, ImageFormat::Png)
            .context("failed to decode PNG")?;
        Ok(image.to_rgb8())
    }

    pub fn byte_len(&self) -> usize {
        self.png.len()
    }
}
