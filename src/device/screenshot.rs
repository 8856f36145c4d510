//! Device screenshots captured with `screencap -p`

use base64::Engine;
use image::ImageFormat;

use super::types::ScreenSize;

/// A decoded-and-validated PNG screenshot
#[derive(Debug, Clone)]
pub struct Screenshot {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl Screenshot {
    /// Validate PNG bytes and read their dimensions
    pub fn from_png(png: Vec<u8>) -> anyhow::Result<Self> {
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("Failed to decode screenshot: {}", e))?;

        Ok(Self {
            width: image.width(),
            height: image.height(),
            png,
        })
    }

    pub fn size(&self) -> ScreenSize {
        ScreenSize::new(self.width, self.height)
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png(self) -> Vec<u8> {
        self.png
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }
}
