use std::collections::VecDeque;

use crate::shape::{AlphaCanvas, RasterImage};

/// Pixels this close in brightness to the sampled background may be keyed by color distance
const BRIGHTNESS_WINDOW: f32 = 30.0;
const MIN_COLOR_TOLERANCE: f32 = 20.0;
/// Max spread between channels for a pixel to count as a washed out white during flood fill
const LOOSE_WHITE_CHROMA: u8 = 30;

/// Background color estimate from the four corner pixels
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BackgroundSample {
    pub color: [f32; 3],
    pub brightness: f32,
}

impl BackgroundSample {
    pub fn from_corners(image: &RasterImage) -> BackgroundSample {
        let (w, h) = (image.width(), image.height());
        if w == 0 || h == 0 {
            return BackgroundSample {
                color: [0.0; 3],
                brightness: 0.0,
            };
        }
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
        let mut color = [0.0f32; 3];
        for &(x, y) in corners.iter() {
            let p = image.pixel(x, y);
            for c in 0..3 {
                color[c] += p[c] as f32 / corners.len() as f32;
            }
        }
        BackgroundSample {
            color,
            brightness: (color[0] + color[1] + color[2]) / 3.0,
        }
    }

    fn distance(&self, rgb: &[u8]) -> f32 {
        let dr = rgb[0] as f32 - self.color[0];
        let dg = rgb[1] as f32 - self.color[1];
        let db = rgb[2] as f32 - self.color[2];
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

fn brightness(rgb: &[u8]) -> f32 {
    (rgb[0] as f32 + rgb[1] as f32 + rgb[2] as f32) / 3.0
}

/// Keys the background of `image` out into alpha.
///
/// Near white pixels and pixels close to the corner-sampled background color are cleared first.
/// Then a 4-connected flood fill from the border clears every background-like region that leaks in
/// from outside, while regions enclosed by foreground stay untouched. Only alpha changes.
pub fn key_to_alpha(image: &RasterImage, tolerance: u8) -> AlphaCanvas {
    if image.is_empty() {
        return AlphaCanvas::keyed(image.clone(), tolerance);
    }
    let width = image.width() as usize;
    let height = image.height() as usize;
    let background = BackgroundSample::from_corners(image);
    let white_cut = 255 - tolerance;
    let color_tolerance = MIN_COLOR_TOLERANCE.max((tolerance as f32 * 1.25).floor());
    let loose_white_brightness = (255.0 - tolerance as f32 * 1.5).max(0.0);

    let mut alpha = image.alpha_channel();
    for (i, pixel) in image.data().chunks_exact(4).enumerate() {
        let rgb = &pixel[..3];
        let near_white = rgb.iter().all(|&c| c >= white_cut);
        let near_background = background.distance(rgb) < color_tolerance
            && (brightness(rgb) - background.brightness).abs() <= BRIGHTNESS_WINDOW;
        if near_white || near_background {
            alpha[i] = 0;
        }
    }

    let background_like = |i: usize, alpha: &[u8]| -> bool {
        if alpha[i] == 0 {
            return true;
        }
        let rgb = &image.data()[i * 4..i * 4 + 3];
        let max = *rgb.iter().max().unwrap_or(&0);
        let min = *rgb.iter().min().unwrap_or(&0);
        let loose_white =
            brightness(rgb) >= loose_white_brightness && max - min <= LOOSE_WHITE_CHROMA;
        loose_white || background.distance(rgb) < color_tolerance
    };

    let mut visited = vec![false; width * height];
    let mut queue = VecDeque::new();
    for x in 0..width {
        queue.push_back((x, 0));
        queue.push_back((x, height - 1));
    }
    for y in 0..height {
        queue.push_back((0, y));
        queue.push_back((width - 1, y));
    }
    while let Some((x, y)) = queue.pop_front() {
        let i = y * width + x;
        if visited[i] {
            continue;
        }
        visited[i] = true;
        if !background_like(i, &alpha) {
            continue;
        }
        alpha[i] = 0;
        if x > 0 {
            queue.push_back((x - 1, y));
        }
        if x + 1 < width {
            queue.push_back((x + 1, y));
        }
        if y > 0 {
            queue.push_back((x, y - 1));
        }
        if y + 1 < height {
            queue.push_back((x, y + 1));
        }
    }

    let keyed = image
        .with_alpha(&alpha)
        .unwrap_or_else(|_| image.clone());
    let cleared = alpha.iter().filter(|&&a| a == 0).count();
    debug!(
        "Keyed {}x{} raster at tolerance {}: {} of {} pixels transparent",
        width,
        height,
        tolerance,
        cleared,
        alpha.len()
    );
    AlphaCanvas::keyed(keyed, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint(data: &mut [u8], width: u32, x: u32, y: u32, rgba: [u8; 4]) {
        let i = ((y * width + x) * 4) as usize;
        data[i..i + 4].copy_from_slice(&rgba);
    }

    #[test]
    fn test_all_white_becomes_transparent() {
        let image = RasterImage::filled(17, 9, [255, 255, 255, 255]);
        let canvas = key_to_alpha(&image, 10);
        assert_eq!(canvas.width(), 17);
        assert_eq!(canvas.height(), 9);
        assert!(canvas.raster().alpha_channel().iter().all(|&a| a == 0));
        assert_eq!(canvas.tolerance(), Some(10));
    }

    #[test]
    fn test_keying_only_touches_alpha() {
        let (w, h) = (16, 12);
        let mut data = vec![0; (w * h * 4) as usize];
        for y in 0..h {
            for x in 0..w {
                let v = ((x * 37 + y * 91) % 256) as u8;
                paint(&mut data, w, x, y, [v, 255 - v, v / 2, 255]);
            }
        }
        let image = RasterImage::new(w, h, data).unwrap();
        let canvas = key_to_alpha(&image, 60);
        for (before, after) in image
            .data()
            .chunks_exact(4)
            .zip(canvas.raster().data().chunks_exact(4))
        {
            assert_eq!(before[..3], after[..3]);
        }
    }

    #[test]
    fn test_square_on_colored_background() {
        let (w, h) = (20, 20);
        let mut data = RasterImage::filled(w, h, [90, 140, 200, 255]).data().to_vec();
        for y in 5..15 {
            for x in 5..15 {
                paint(&mut data, w, x, y, [220, 30, 30, 255]);
            }
        }
        let image = RasterImage::new(w, h, data).unwrap();
        let background = BackgroundSample::from_corners(&image);
        assert_eq!(background.color, [90.0, 140.0, 200.0]);

        let canvas = key_to_alpha(&image, 20);
        let raster = canvas.raster();
        for y in 0..h {
            for x in 0..w {
                let inside = (5..15).contains(&x) && (5..15).contains(&y);
                assert_eq!(raster.pixel(x, y)[3] == 255, inside, "pixel {} {}", x, y);
            }
        }
    }

    #[test]
    fn test_flood_fill_spares_enclosed_regions() {
        let (w, h) = (12, 12);
        let dark = [30, 30, 30, 255];
        let light = [205, 200, 210, 255];
        let red = [200, 20, 20, 255];
        let mut data = RasterImage::filled(w, h, dark).data().to_vec();
        // Light band leaking in from the left border
        for y in 3..9 {
            for x in 0..3 {
                paint(&mut data, w, x, y, light);
            }
        }
        // Red ring enclosing the same light color
        for y in 3..9 {
            for x in 5..11 {
                let edge = y == 3 || y == 8 || x == 5 || x == 10;
                paint(&mut data, w, x, y, if edge { red } else { light });
            }
        }
        let image = RasterImage::new(w, h, data).unwrap();
        let canvas = key_to_alpha(&image, 40);
        let raster = canvas.raster();
        // Border connected light band is gone
        assert_eq!(raster.pixel(1, 5)[3], 0);
        assert_eq!(raster.pixel(2, 5)[3], 0);
        // Ring and its enclosed interior stay
        assert_eq!(raster.pixel(5, 5)[3], 255);
        assert_eq!(raster.pixel(7, 5)[3], 255);
        assert_eq!(raster.pixel(8, 6)[3], 255);
        // Dark background keyed by color distance
        assert_eq!(raster.pixel(0, 0)[3], 0);
        assert_eq!(raster.pixel(11, 11)[3], 0);
    }
}
