/// Luminance analysis between the two GPU stages
///
/// Stage 1's working image is read back over the output region, binned by
/// luminance, and turned into an equalization lookup table that stage 2
/// blends toward. Bin placement must match the `equalize` lookup in the
/// stage 2 shader.

pub const BINS: usize = 256;

/// Bin index of a luminance value, rounding to the nearest of 256 levels.
pub fn bin_of(luminance: f32) -> usize {
    // NaN saturates to 0 on the cast
    (luminance.clamp(0.0, 1.0) * 255.0 + 0.5) as usize
}

/// 256-bin histogram of Y over a region of the working image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceHistogram {
    counts: [u32; BINS],
    total: u64,
}

impl Default for LuminanceHistogram {
    fn default() -> Self {
        Self {
            counts: [0; BINS],
            total: 0,
        }
    }
}

impl LuminanceHistogram {
    pub fn from_luminance(values: impl IntoIterator<Item = f32>) -> Self {
        let mut histogram = Self::default();
        for y in values {
            histogram.counts[bin_of(y)] += 1;
            histogram.total += 1;
        }
        histogram
    }

    /// Histogram of the Y channel of tightly packed RGBA f32 pixels.
    pub fn from_xyz_pixels(pixels: &[f32]) -> Self {
        Self::from_luminance(pixels.chunks_exact(4).map(|px| px[1]))
    }

    pub fn counts(&self) -> &[u32; BINS] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Cumulative-distribution equalization table.
    ///
    /// Maps each bin to its normalized rank, so the darkest occupied bin lands
    /// on 0 and the brightest on 1. `None` when the histogram is empty or all
    /// samples share one bin, since there is no range to stretch.
    pub fn equalization_lut(&self) -> Option<[f32; BINS]> {
        let mut cdf = [0u64; BINS];
        let mut running = 0u64;
        for (i, count) in self.counts.iter().enumerate() {
            running += u64::from(*count);
            cdf[i] = running;
        }

        let cdf_min = cdf.iter().copied().find(|c| *c > 0).unwrap_or(0);
        if self.total == 0 || self.total == cdf_min {
            return None;
        }

        let range = (self.total - cdf_min) as f64;
        let mut lut = [0.0; BINS];
        for (value, c) in lut.iter_mut().zip(cdf) {
            *value = (c.saturating_sub(cdf_min) as f64 / range) as f32;
        }
        Some(lut)
    }
}

/// Table uploaded when there is nothing to equalize
pub fn identity_lut() -> [f32; BINS] {
    std::array::from_fn(|i| i as f32 / (BINS - 1) as f32)
}

/// Pack a table four entries per `vec4`, the uniform array layout.
pub fn pack_lut(lut: &[f32; BINS]) -> [[f32; 4]; BINS / 4] {
    std::array::from_fn(|i| [lut[i * 4], lut[i * 4 + 1], lut[i * 4 + 2], lut[i * 4 + 3]])
}
