/// Destination bitmap.

use crate::error::{ConvertError, Result};

/// Pixel layouts a host may hand in. Only [`BitmapFormat::Rgba8888`] can
/// receive conversion output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitmapFormat {
    /// 4 channels, 8 bits each, bytes ordered R, G, B, A
    Rgba8888,
    Rgb565,
    Alpha8,
}

impl BitmapFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8888 => 4,
            Self::Rgb565 => 2,
            Self::Alpha8 => 1,
        }
    }
}

/// A caller-allocated pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub format: BitmapFormat,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Zero-filled bitmap of the given size.
    pub fn new(width: u32, height: u32, format: BitmapFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: vec![0; len],
        }
    }

    /// Check the bitmap can receive RGBA output.
    pub fn validate(&self) -> Result<()> {
        if self.format != BitmapFormat::Rgba8888 {
            return Err(ConvertError::invalid(format!(
                "Output bitmap is {:?}, not Rgba8888",
                self.format
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConvertError::invalid("Output bitmap is empty"));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(ConvertError::invalid(format!(
                "Output bitmap holds {} bytes, {} expected",
                self.pixels.len(),
                expected
            )));
        }
        Ok(())
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Hand the pixels to the `image` crate for encoding.
    pub fn into_rgba_image(self) -> Option<image::RgbaImage> {
        if self.format != BitmapFormat::Rgba8888 {
            return None;
        }
        image::RgbaImage::from_raw(self.width, self.height, self.pixels)
    }
}
