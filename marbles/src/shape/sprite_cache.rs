use std::{collections::BTreeMap, sync::Arc};

use crate::shape::{key_to_alpha, AlphaCanvas, RasterImage};

/// Keyed canvases by sprite name. A canvas is rebuilt only when its tolerance changes or the
/// cache is invalidated.
#[derive(Default)]
pub struct SpriteCache {
    canvases: BTreeMap<String, Arc<AlphaCanvas>>,
}

impl SpriteCache {
    pub fn new() -> SpriteCache {
        SpriteCache::default()
    }

    /// Canvas for `name`. With `key_background` off the raster is used as is.
    pub fn canvas_for(
        &mut self,
        name: &str,
        raster: &RasterImage,
        tolerance: u8,
        key_background: bool,
    ) -> Arc<AlphaCanvas> {
        let wanted = if key_background { Some(tolerance) } else { None };
        if let Some(canvas) = self.canvases.get(name) {
            if canvas.tolerance() == wanted {
                return canvas.clone();
            }
        }
        let canvas = Arc::new(if key_background {
            key_to_alpha(raster, tolerance)
        } else {
            AlphaCanvas::from_transparent(raster.clone())
        });
        self.canvases.insert(name.to_string(), canvas.clone());
        canvas
    }

    pub fn invalidate_all(&mut self) {
        self.canvases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_until_tolerance_changes() {
        let raster = RasterImage::filled(4, 4, [255, 255, 255, 255]);
        let mut cache = SpriteCache::new();
        let first = cache.canvas_for("cloud", &raster, 10, true);
        let again = cache.canvas_for("cloud", &raster, 10, true);
        assert!(Arc::ptr_eq(&first, &again));
        let rekeyed = cache.canvas_for("cloud", &raster, 30, true);
        assert!(!Arc::ptr_eq(&first, &rekeyed));
        assert_eq!(rekeyed.tolerance(), Some(30));
        cache.invalidate_all();
        let fresh = cache.canvas_for("cloud", &raster, 30, true);
        assert!(!Arc::ptr_eq(&rekeyed, &fresh));
    }

    #[test]
    fn test_unkeyed_canvas_keeps_alpha() {
        let raster = RasterImage::filled(4, 4, [255, 255, 255, 255]);
        let mut cache = SpriteCache::new();
        let canvas = cache.canvas_for("label", &raster, 10, false);
        assert_eq!(canvas.tolerance(), None);
        assert!(canvas.raster().alpha_channel().iter().all(|&a| a == 255));
    }
}
