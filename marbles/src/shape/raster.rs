use anyhow::*;
use image::RgbaImage;

/// Immutable 32 bit RGBA raster, row-major with y pointing down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<RasterImage> {
        let expected = width as usize * height as usize * 4;
        ensure!(
            data.len() == expected,
            "Raster of {}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            data.len()
        );
        Ok(RasterImage {
            data,
            width,
            height,
        })
    }

    /// Raster filled with one color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> RasterImage {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        RasterImage {
            data,
            width,
            height,
        }
    }

    /// Decodes an image file held in memory. Sources without alpha become fully opaque.
    pub fn from_file_bytes(file_bytes: &[u8]) -> Result<RasterImage> {
        let img = image::load_from_memory(file_bytes).context("Failed to decode image")?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        ensure!(width > 0 && height > 0, "Image has no pixels");
        RasterImage::new(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte index of the pixel's red channel
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.index(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Copy of the raster with alpha replaced by `alpha` (one byte per pixel).
    /// Color channels are never touched.
    pub fn with_alpha(&self, alpha: &[u8]) -> Result<RasterImage> {
        ensure!(
            alpha.len() == self.width as usize * self.height as usize,
            "Alpha mask does not match raster size"
        );
        let mut data = self.data.clone();
        for (pixel, a) in data.chunks_exact_mut(4).zip(alpha.iter()) {
            pixel[3] = *a;
        }
        Ok(RasterImage {
            data,
            width: self.width,
            height: self.height,
        })
    }

    pub fn alpha_channel(&self) -> Vec<u8> {
        self.data.chunks_exact(4).map(|p| p[3]).collect()
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("Raster buffer does not match its dimensions"))
    }
}

/// Raster whose background has been keyed out into alpha. Read only once built.
#[derive(Debug, Clone)]
pub struct AlphaCanvas {
    raster: RasterImage,
    tolerance: Option<u8>,
}

impl AlphaCanvas {
    pub(crate) fn keyed(raster: RasterImage, tolerance: u8) -> AlphaCanvas {
        AlphaCanvas {
            raster,
            tolerance: Some(tolerance),
        }
    }

    /// Wraps a raster that already carries meaningful alpha (e.g. text drawn on transparency)
    pub fn from_transparent(raster: RasterImage) -> AlphaCanvas {
        AlphaCanvas {
            raster,
            tolerance: None,
        }
    }

    pub fn raster(&self) -> &RasterImage {
        &self.raster
    }

    /// Keying tolerance used, `None` when the raster was taken as is
    pub fn tolerance(&self) -> Option<u8> {
        self.tolerance
    }

    pub fn width(&self) -> u32 {
        self.raster.width
    }

    pub fn height(&self) -> u32 {
        self.raster.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        assert!(RasterImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(RasterImage::new(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_pixel_access() {
        #[rustfmt::skip]
        let raster = RasterImage::new(2, 1, vec![
            1, 2, 3, 4,
            5, 6, 7, 8,
        ])
        .unwrap();
        assert_eq!(raster.pixel(1, 0), [5, 6, 7, 8]);
        assert!(raster.contains(1, 0));
        assert!(!raster.contains(2, 0));
        assert!(!raster.contains(-1, 0));
    }

    #[test]
    fn test_with_alpha_keeps_colors() {
        let raster = RasterImage::filled(3, 2, [10, 20, 30, 255]);
        let masked = raster.with_alpha(&[0, 255, 0, 255, 0, 255]).unwrap();
        for (a, b) in raster.data().chunks(4).zip(masked.data().chunks(4)) {
            assert_eq!(a[..3], b[..3]);
        }
        assert_eq!(masked.alpha_channel(), vec![0, 255, 0, 255, 0, 255]);
    }

    #[test]
    fn test_decode_png_bytes() {
        let raster = RasterImage::filled(4, 3, [200, 10, 10, 128]);
        let mut bytes = vec![];
        image::DynamicImage::ImageRgba8(raster.to_rgba_image().unwrap())
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .unwrap();
        let decoded = RasterImage::from_file_bytes(&bytes).unwrap();
        assert_eq!(decoded, raster);
        assert!(RasterImage::from_file_bytes(&[1, 2, 3]).is_err());
    }
}
