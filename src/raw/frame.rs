/// RAW16 sensor frame
///
/// A frame is the untouched Bayer mosaic as the sensor recorded it: one
/// 16-bit sample per photosite, rows padded to `stride` bytes.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Color of a single photosite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfaColor {
    Red = 0,
    Green = 1,
    Blue = 2,
}

/// The four Bayer orderings, named by the 2x2 tile read left-to-right,
/// top-to-bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfaPattern {
    Rggb = 0,
    Grbg = 1,
    Gbrg = 2,
    Bggr = 3,
}

impl CfaPattern {
    pub const ALL: [CfaPattern; 4] = [Self::Rggb, Self::Grbg, Self::Gbrg, Self::Bggr];

    /// Pattern from the sensor's CFA arrangement code (0-3).
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| ConvertError::invalid(format!("Unsupported cfa pattern {} used", code)))
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// The 2x2 tile, indexed by `(y & 1) * 2 + (x & 1)`.
    pub fn tile(&self) -> [CfaColor; 4] {
        use CfaColor::{Blue as B, Green as G, Red as R};
        match self {
            Self::Rggb => [R, G, G, B],
            Self::Grbg => [G, R, B, G],
            Self::Gbrg => [G, B, R, G],
            Self::Bggr => [B, G, G, R],
        }
    }

    /// Pattern whose tile matches `tile`, if any.
    pub fn from_tile(tile: [CfaColor; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tile() == tile)
    }

    pub fn color_at(&self, x: u32, y: u32) -> CfaColor {
        self.tile()[site_index(x, y)]
    }

    /// Tile packed two bits per site, the form the stage 1 shader reads.
    pub fn packed_layout(&self) -> u32 {
        self.tile()
            .iter()
            .enumerate()
            .fold(0, |acc, (site, color)| acc | (*color as u32) << (site * 2))
    }
}

/// Position inside the 2x2 CFA tile
pub fn site_index(x: u32, y: u32) -> usize {
    ((y & 1) * 2 + (x & 1)) as usize
}

/// A RAW16 capture
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
    pub cfa: CfaPattern,
    /// Black level per CFA tile site, indexed like [`CfaPattern::tile`]
    pub black_level: [i32; 4],
    pub white_level: i32,
    pub samples: Vec<u16>,
}

impl RawFrame {
    /// Tightly packed frame (stride = 2 × width)
    pub fn packed(
        width: u32,
        height: u32,
        cfa: CfaPattern,
        black_level: [i32; 4],
        white_level: i32,
        samples: Vec<u16>,
    ) -> Self {
        Self {
            width,
            height,
            stride: width * 2,
            cfa,
            black_level,
            white_level,
            samples,
        }
    }

    /// Check the geometry and level invariants.
    pub fn validate(&self) -> Result<()> {
        if self.width < 2 || self.height < 2 {
            return Err(ConvertError::invalid(format!(
                "Raw image with dimensions (w={}, h={}) is smaller than one CFA tile",
                self.width, self.height
            )));
        }
        if self.stride % 2 != 0 {
            return Err(ConvertError::invalid(
                "Invalid stride for RAW16 format, stride must be even",
            ));
        }
        if self.stride / 2 < self.width {
            return Err(ConvertError::invalid(format!(
                "Stride too small: {} bytes for width {}",
                self.stride, self.width
            )));
        }
        let required = u64::from(self.stride) * u64::from(self.height);
        let available = self.samples.len() as u64 * 2;
        if available < required {
            return Err(ConvertError::invalid(format!(
                "Raw buffer holds {} bytes, {} required",
                available, required
            )));
        }
        let max_black = self.black_level.iter().copied().max().unwrap_or(0);
        if self.white_level <= max_black {
            return Err(ConvertError::invalid(format!(
                "White level {} must exceed black level {}",
                self.white_level, max_black
            )));
        }
        Ok(())
    }

    /// Sample at a photosite, honoring the stride.
    pub fn sample(&self, x: u32, y: u32) -> u16 {
        self.samples[(y * self.stride / 2 + x) as usize]
    }
}

/// Per-channel gain grid correcting lens vignetting.
///
/// Gains are stored row-major, four per grid point, in the order
/// red, green on red rows, green on blue rows, blue.
#[derive(Debug, Clone, PartialEq)]
pub struct LensShadingMap {
    pub columns: u32,
    pub rows: u32,
    pub gains: Vec<f32>,
}

impl LensShadingMap {
    /// A 1x1 map of unit gains.
    pub fn unit() -> Self {
        Self {
            columns: 1,
            rows: 1,
            gains: vec![1.0; 4],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 || self.rows == 0 {
            return Err(ConvertError::invalid("Lens shading map has no grid points"));
        }
        let expected = self.columns as usize * self.rows as usize * 4;
        if self.gains.len() != expected {
            return Err(ConvertError::invalid(format!(
                "Lens shading map has {} gains, {} expected",
                self.gains.len(),
                expected
            )));
        }
        if !self.gains.iter().all(|g| g.is_finite()) {
            return Err(ConvertError::invalid("Lens shading map has non-finite gains"));
        }
        Ok(())
    }
}
