use anyhow::*;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};

use crate::shape::{RasterImage, SolidityClassifier};

/// One grid square of a sprite and whether it became a collision primitive
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionCell {
    pub gx: u32,
    pub gy: u32,
    pub ratio: f32,
    pub included: bool,
}

/// Axis aligned box in sprite pixels, relative to the sprite's geometric center
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoxPrimitive {
    pub center: Vector2<f32>,
    pub half_extents: Vector2<f32>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GridParams {
    /// Cell edge in raster pixels
    pub cell_size: u32,
    /// A cell is kept when its solid ratio is strictly above this
    pub inclusion_ratio: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        GridParams {
            cell_size: 4,
            inclusion_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridBody {
    pub primitives: Vec<BoxPrimitive>,
    /// Every cell in row-major order, kept for debug overlays
    pub cells: Vec<CollisionCell>,
    pub cell_size: u32,
    /// Display pixels per raster pixel on each axis
    pub scale: Vector2<f32>,
}

impl GridBody {
    pub fn included_cells(&self) -> impl Iterator<Item = &CollisionCell> {
        self.cells.iter().filter(|c| c.included)
    }
}

/// Splits the raster into square cells and emits one box per mostly solid cell.
///
/// `display_size` is the size the sprite is drawn at; primitives are expressed in those pixels
/// relative to `(display_size / 2)`. Edge cells are clipped to the raster. Errors when no cell
/// qualifies.
pub fn build_grid_body(
    raster: &RasterImage,
    solidity: &SolidityClassifier,
    params: &GridParams,
    display_size: Vector2<f32>,
) -> Result<GridBody> {
    ensure!(params.cell_size > 0, "Cell size must be positive");
    ensure!(!raster.is_empty(), "Cannot build a grid body from an empty raster");
    let (width, height) = (raster.width(), raster.height());
    let cell = params.cell_size;
    let scale = Vector2::new(
        display_size.x / width as f32,
        display_size.y / height as f32,
    );
    let half_size = Vector2::new(width as f32 * 0.5, height as f32 * 0.5);
    let cols = (width + cell - 1) / cell;
    let rows = (height + cell - 1) / cell;

    let mut cells = Vec::with_capacity((cols * rows) as usize);
    let mut primitives = vec![];
    for gy in 0..rows {
        for gx in 0..cols {
            let x0 = gx * cell;
            let y0 = gy * cell;
            let w = cell.min(width - x0);
            let h = cell.min(height - y0);
            let mut solid = 0;
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    if solidity.is_solid(raster, x as i32, y as i32) {
                        solid += 1;
                    }
                }
            }
            let ratio = solid as f32 / (w * h) as f32;
            let included = solid > 0 && ratio > params.inclusion_ratio;
            if included {
                let center = Vector2::new(
                    x0 as f32 + w as f32 * 0.5 - half_size.x,
                    y0 as f32 + h as f32 * 0.5 - half_size.y,
                );
                primitives.push(BoxPrimitive {
                    center: Vector2::new(center.x * scale.x, center.y * scale.y),
                    half_extents: Vector2::new(
                        w as f32 * 0.5 * scale.x,
                        h as f32 * 0.5 * scale.y,
                    ),
                });
            }
            cells.push(CollisionCell {
                gx,
                gy,
                ratio,
                included,
            });
        }
    }
    if primitives.is_empty() {
        bail!(
            "No cell of the {}x{} raster is above {:.2} solid ({} mode)",
            width,
            height,
            params.inclusion_ratio,
            solidity.decision
        );
    }
    debug!(
        "Grid body: {} of {} cells included",
        primitives.len(),
        cells.len()
    );
    Ok(GridBody {
        primitives,
        cells,
        cell_size: cell,
        scale,
    })
}
