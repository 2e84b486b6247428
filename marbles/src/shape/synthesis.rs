use anyhow::*;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};

use crate::{
    settings::DebugConfig,
    shape::{
        assemble, assemble_polygons, bounding_box_shape, build_grid_body, polygon_area,
        trace_outlines, AlphaCanvas, CollisionCell, CompoundShape, GridParams, SolidityClassifier,
        SolidityDecision,
    },
};

/// Tunable parameters of collision shape synthesis
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    pub cell_size: u32,
    pub inclusion_ratio: f32,
    pub alpha_threshold: u8,
    pub white_tolerance: u8,
    pub key_tolerance: u8,
    pub simplify_tolerance: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        SynthesisParams {
            cell_size: 4,
            inclusion_ratio: 0.7,
            alpha_threshold: 128,
            white_tolerance: 20,
            key_tolerance: 40,
            simplify_tolerance: 2.0,
        }
    }
}

impl SynthesisParams {
    pub fn grid(&self) -> GridParams {
        GridParams {
            cell_size: self.cell_size,
            inclusion_ratio: self.inclusion_ratio,
        }
    }
}

/// How a sprite's outline becomes collision geometry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShapeStrategy {
    /// Box per solid grid cell, for images
    Grid,
    /// Traced polygon, for crisp text
    Contour,
}

#[derive(Debug, Clone)]
pub struct SynthesizedShape {
    pub compound: CompoundShape,
    /// Grid cells for the debug overlay, grid strategy only
    pub cells: Option<Vec<CollisionCell>>,
    pub decision: SolidityDecision,
}

/// Outlines whose area covers less than this share of the solid pixels are replaced by grid cells
const MIN_OUTLINE_COVERAGE: f32 = 0.5;

fn grid_shape(
    canvas: &AlphaCanvas,
    solidity: &SolidityClassifier,
    params: &SynthesisParams,
    display_size: Vector2<f32>,
    pixels_per_meter: f32,
) -> Result<(CompoundShape, Option<Vec<CollisionCell>>)> {
    let grid = build_grid_body(canvas.raster(), solidity, &params.grid(), display_size)?;
    let compound = assemble(&grid.primitives, pixels_per_meter)?;
    Ok((compound, Some(grid.cells)))
}

fn contour_shape(
    canvas: &AlphaCanvas,
    solidity: &SolidityClassifier,
    params: &SynthesisParams,
    display_size: Vector2<f32>,
    pixels_per_meter: f32,
) -> Result<(CompoundShape, Option<Vec<CollisionCell>>)> {
    let raster = canvas.raster();
    let outlines = trace_outlines(raster, solidity, params.simplify_tolerance);
    ensure!(!outlines.is_empty(), "No solid pixels to trace");
    let solid_pixels = outlines.iter().map(|o| o.pixel_count).sum::<usize>() as f32;
    let covered = outlines
        .iter()
        .map(|o| polygon_area(&o.vertices).abs())
        .sum::<f32>();
    if covered < solid_pixels * MIN_OUTLINE_COVERAGE {
        debug!(
            "Outlines cover {:.0} of {:.0} solid pixels, using grid cells",
            covered, solid_pixels
        );
        return grid_shape(canvas, solidity, params, display_size, pixels_per_meter);
    }
    let scale = Vector2::new(
        display_size.x / raster.width() as f32,
        display_size.y / raster.height() as f32,
    );
    let rings = outlines
        .iter()
        .map(|outline| {
            outline
                .vertices
                .iter()
                .map(|v| {
                    let p = *v + outline.center;
                    Vector2::new(p.x * scale.x, p.y * scale.y)
                })
                .collect::<Vec<Vector2<f32>>>()
        })
        .collect::<Vec<Vec<Vector2<f32>>>>();
    let compound = assemble_polygons(&rings, pixels_per_meter)?;
    Ok((compound, None))
}

fn try_synthesize(
    canvas: &AlphaCanvas,
    strategy: ShapeStrategy,
    solidity: &SolidityClassifier,
    params: &SynthesisParams,
    display_size: Vector2<f32>,
    pixels_per_meter: f32,
) -> Result<(CompoundShape, Option<Vec<CollisionCell>>)> {
    match strategy {
        ShapeStrategy::Grid => grid_shape(canvas, solidity, params, display_size, pixels_per_meter),
        ShapeStrategy::Contour => {
            contour_shape(canvas, solidity, params, display_size, pixels_per_meter)
        }
    }
}

/// Builds the collision shape for a sprite canvas drawn at `display_size`.
/// Any synthesis failure yields a box covering the whole sprite, so this never fails.
pub fn synthesize_shape(
    canvas: &AlphaCanvas,
    strategy: ShapeStrategy,
    params: &SynthesisParams,
    debug: &DebugConfig,
    display_size: Vector2<f32>,
    pixels_per_meter: f32,
) -> SynthesizedShape {
    let solidity = SolidityClassifier::choose(
        canvas.raster(),
        canvas.tolerance().is_some(),
        debug.solidity_mode,
        params.alpha_threshold,
        params.white_tolerance,
    );
    match try_synthesize(
        canvas,
        strategy,
        &solidity,
        params,
        display_size,
        pixels_per_meter,
    ) {
        std::result::Result::Ok((compound, cells)) => SynthesizedShape {
            compound,
            cells,
            decision: solidity.decision,
        },
        Err(e) => {
            warn!(
                "Shape synthesis failed ({:?}, {} mode), using bounding box: {:#}",
                strategy, solidity.decision, e
            );
            SynthesizedShape {
                compound: bounding_box_shape(display_size, pixels_per_meter),
                cells: None,
                decision: solidity.decision,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier2d::{
        parry::query::PointQuery,
        prelude::{point, Isometry},
    };

    use crate::shape::{key_to_alpha, RasterImage, SolidityMode};

    const PPM: f32 = 50.0;

    /// Opaque black where `solid` holds, transparent elsewhere
    fn mask_canvas(width: u32, height: u32, solid: impl Fn(u32, u32) -> bool) -> AlphaCanvas {
        let mut data = vec![0; (width * height * 4) as usize];
        for y in 0..height {
            for x in 0..width {
                if solid(x, y) {
                    let i = ((y * width + x) * 4) as usize;
                    data[i..i + 4].copy_from_slice(&[0, 0, 0, 255]);
                }
            }
        }
        AlphaCanvas::from_transparent(RasterImage::new(width, height, data).unwrap())
    }

    #[test]
    fn test_grid_strategy_on_keyed_image() {
        let (w, h) = (32u32, 32u32);
        let mut data = RasterImage::filled(w, h, [255, 255, 255, 255]).data().to_vec();
        for y in 8..24 {
            for x in 8..24 {
                let i = ((y * w + x) * 4) as usize;
                data[i..i + 4].copy_from_slice(&[20, 120, 20, 255]);
            }
        }
        let canvas = key_to_alpha(&RasterImage::new(w, h, data).unwrap(), 30);
        let shape = synthesize_shape(
            &canvas,
            ShapeStrategy::Grid,
            &SynthesisParams::default(),
            &DebugConfig::default(),
            Vector2::new(64.0, 64.0),
            PPM,
        );
        assert!(shape.compound.synthesized);
        assert_eq!(shape.decision, SolidityDecision::Alpha);
        assert_eq!(shape.compound.part_count, 16);
        assert_eq!(shape.cells.unwrap().len(), 64);
    }

    #[test]
    fn test_contour_strategy_on_text_like_raster() {
        let raster = RasterImage::filled(40, 10, [0, 0, 0, 255]);
        let canvas = AlphaCanvas::from_transparent(raster);
        let shape = synthesize_shape(
            &canvas,
            ShapeStrategy::Contour,
            &SynthesisParams::default(),
            &DebugConfig::default(),
            Vector2::new(40.0, 10.0),
            PPM,
        );
        assert!(shape.compound.synthesized);
        assert!(shape.cells.is_none());
    }

    #[test]
    fn test_forced_rgb_on_transparent_black_falls_back() {
        let canvas = AlphaCanvas::from_transparent(RasterImage::filled(20, 10, [0, 0, 0, 0]));
        let debug = DebugConfig {
            solidity_mode: SolidityMode::Rgb,
            ..DebugConfig::default()
        };
        for strategy in [ShapeStrategy::Grid, ShapeStrategy::Contour].iter() {
            let shape = synthesize_shape(
                &canvas,
                *strategy,
                &SynthesisParams::default(),
                &debug,
                Vector2::new(20.0, 10.0),
                PPM,
            );
            assert_eq!(shape.decision, SolidityDecision::Rgb);
            assert!(!shape.compound.synthesized);
            let cuboid = shape.compound.parts()[0].1.as_cuboid().unwrap().half_extents;
            assert!((cuboid.x - 10.0 / PPM).abs() < 1e-6);
            assert!((cuboid.y - 5.0 / PPM).abs() < 1e-6);
        }
    }

    #[test]
    fn test_contour_covers_every_letter() {
        // Two glyph-like blocks with a gap, as in a rendered word
        let canvas = mask_canvas(40, 12, |x, y| {
            (2..12).contains(&y) && ((2..14).contains(&x) || (26..38).contains(&x))
        });
        let shape = synthesize_shape(
            &canvas,
            ShapeStrategy::Contour,
            &SynthesisParams::default(),
            &DebugConfig::default(),
            Vector2::new(40.0, 12.0),
            PPM,
        );
        assert!(shape.compound.synthesized);
        assert!(shape.cells.is_none());
        assert!(shape.compound.part_count >= 2);
        // Solid pixels span x 2..38, centered on the sprite
        assert!(shape.compound.geometric_center.x.abs() < 1e-4);
        let offset = shape.compound.render_offset();
        let body = Isometry::identity();
        for sprite_x in [8.0f32, 32.0].iter() {
            let p = point![(sprite_x - 20.0 - offset.x) / PPM, (7.0 - 6.0 - offset.y) / PPM];
            assert!(
                shape.compound.shape.contains_point(&body, &p),
                "letter at {} is not solid",
                sprite_x
            );
        }
        let gap = point![(20.0 - 20.0 - offset.x) / PPM, (7.0 - 6.0 - offset.y) / PPM];
        assert!(!shape.compound.shape.contains_point(&body, &gap));
    }

    #[test]
    fn test_hairline_outline_uses_grid_cells() {
        // One pixel wide caret traces to a polygon with no area
        let canvas = mask_canvas(41, 21, |x, y| {
            let (x, y) = (x as i32, y as i32);
            x - 20 == y || 20 - x == y
        });
        let params = SynthesisParams {
            cell_size: 1,
            ..SynthesisParams::default()
        };
        let shape = synthesize_shape(
            &canvas,
            ShapeStrategy::Contour,
            &params,
            &DebugConfig::default(),
            Vector2::new(41.0, 21.0),
            PPM,
        );
        assert!(shape.compound.synthesized);
        assert_eq!(shape.cells.unwrap().len(), 41 * 21);
        assert_eq!(shape.compound.part_count, 41);
    }

    #[test]
    fn test_uniform_background_keys_out_and_falls_back() {
        let raster = RasterImage::filled(24, 16, [40, 90, 200, 255]);
        let canvas = key_to_alpha(&raster, SynthesisParams::default().key_tolerance);
        assert_eq!(canvas.width(), 24);
        assert_eq!(canvas.height(), 16);
        assert!(canvas.raster().alpha_channel().iter().all(|&a| a == 0));
        let shape = synthesize_shape(
            &canvas,
            ShapeStrategy::Grid,
            &SynthesisParams::default(),
            &DebugConfig::default(),
            Vector2::new(24.0, 16.0),
            PPM,
        );
        assert!(!shape.compound.synthesized);
        assert!(shape.cells.is_none());
        let cuboid = shape.compound.parts()[0].1.as_cuboid().unwrap().half_extents;
        assert!((cuboid.x - 12.0 / PPM).abs() < 1e-6);
        assert!((cuboid.y - 8.0 / PPM).abs() < 1e-6);
    }
}
