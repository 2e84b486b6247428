use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::shape::RasterImage;

/// Samples per image side used by transparency detection
const TRANSPARENCY_SAMPLES_PER_SIDE: u32 = 32;
/// Share of non-opaque samples above which an image counts as transparent
const TRANSPARENT_SAMPLE_FRACTION: f32 = 0.01;

/// Operator override for how solid pixels are decided
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SolidityMode {
    Auto,
    Alpha,
    Rgb,
}

impl Default for SolidityMode {
    fn default() -> Self {
        SolidityMode::Auto
    }
}

/// Which test a classifier ended up using
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SolidityDecision {
    Alpha,
    Rgb,
}

/// Per pixel foreground test over a raster, together with the decision that produced it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SolidityClassifier {
    pub decision: SolidityDecision,
    /// Alpha must exceed this to be solid
    pub alpha_threshold: u8,
    /// Pixels with every channel at or above `255 - white_tolerance` are not solid in rgb mode
    pub white_tolerance: u8,
}

impl SolidityClassifier {
    /// Picks alpha or rgb testing for `raster`. In auto mode alpha wins for processed (keyed)
    /// canvases and for rasters that show transparency.
    pub fn choose(
        raster: &RasterImage,
        processed: bool,
        mode: SolidityMode,
        alpha_threshold: u8,
        white_tolerance: u8,
    ) -> SolidityClassifier {
        let decision = match mode {
            SolidityMode::Alpha => SolidityDecision::Alpha,
            SolidityMode::Rgb => SolidityDecision::Rgb,
            SolidityMode::Auto => {
                if processed || has_transparency(raster) {
                    SolidityDecision::Alpha
                } else {
                    SolidityDecision::Rgb
                }
            }
        };
        SolidityClassifier {
            decision,
            alpha_threshold,
            white_tolerance,
        }
    }

    /// Out of bounds coordinates are never solid
    #[inline]
    pub fn is_solid(&self, raster: &RasterImage, x: i32, y: i32) -> bool {
        if !raster.contains(x, y) {
            return false;
        }
        let [r, g, b, a] = raster.pixel(x as u32, y as u32);
        match self.decision {
            SolidityDecision::Alpha => a > self.alpha_threshold,
            SolidityDecision::Rgb => {
                // Fully transparent pixels carry no color to judge
                if a == 0 {
                    return false;
                }
                let white_cut = 255 - self.white_tolerance;
                !(r >= white_cut && g >= white_cut && b >= white_cut)
            }
        }
    }

    pub fn count_solid(&self, raster: &RasterImage) -> usize {
        let mut count = 0;
        for y in 0..raster.height() as i32 {
            for x in 0..raster.width() as i32 {
                if self.is_solid(raster, x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Solidity as a bitmap of 1.0s and 0.0s, row-major
    pub fn bitmap(&self, raster: &RasterImage) -> Vec<f64> {
        let mut bitmap = vec![0.0; raster.width() as usize * raster.height() as usize];
        for y in 0..raster.height() {
            for x in 0..raster.width() {
                if self.is_solid(raster, x as i32, y as i32) {
                    bitmap[(y * raster.width() + x) as usize] = 1.0;
                }
            }
        }
        bitmap
    }
}

/// Cheap transparency check over the border and a coarse interior grid
pub fn has_transparency(raster: &RasterImage) -> bool {
    if raster.is_empty() {
        return false;
    }
    let (w, h) = (raster.width(), raster.height());
    let stride = (w.max(h) / TRANSPARENCY_SAMPLES_PER_SIDE).max(1);
    let mut samples = 0u32;
    let mut non_opaque = 0u32;
    let mut sample = |x: u32, y: u32| {
        samples += 1;
        if raster.pixel(x, y)[3] < 255 {
            non_opaque += 1;
        }
    };
    for x in (0..w).step_by(stride as usize) {
        sample(x, 0);
        sample(x, h - 1);
    }
    for y in (0..h).step_by(stride as usize) {
        sample(0, y);
        sample(w - 1, y);
    }
    for y in (stride..h.saturating_sub(1)).step_by(stride as usize) {
        for x in (stride..w.saturating_sub(1)).step_by(stride as usize) {
            sample(x, y);
        }
    }
    non_opaque as f32 > samples as f32 * TRANSPARENT_SAMPLE_FRACTION
}
