use std::{collections::BTreeSet, fs, path::PathBuf};

use anyhow::*;
use cgmath::Vector2;
use rapier2d::prelude::*;
use toybox::api::EngineApi;

use crate::{
    object::{Angle, DebugCells, Marble, Position, SceneObject, SpriteVisual},
    scene::{GamePhase, ScoreBoard},
    settings::DebugConfig,
    utils::rotate_radians,
};

const COLLIDER_COLOR: [f32; 4] = [0.1, 0.9, 0.2, 1.0];
const SENSOR_COLOR: [f32; 4] = [0.95, 0.8, 0.1, 1.0];

/// Line segment in pixels with an rgba color
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Line(pub Vector2<f32>, pub Vector2<f32>, pub [f32; 4]);

/// Draw call for one scene object's sprite
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDraw {
    pub name: String,
    /// Body origin in pixels
    pub position: Vector2<f32>,
    pub rotation: f32,
    pub render_offset: Vector2<f32>,
    pub display_size: Vector2<f32>,
}

impl SpriteDraw {
    /// Where the sprite's center must be drawn so that it lines up with the collision shape
    pub fn draw_center(&self) -> Vector2<f32> {
        self.position + rotate_radians(-self.render_offset, self.rotation)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarbleDraw {
    pub position: Vector2<f32>,
    pub radius: f32,
}

/// One grid cell of the collision overlay, in pixels
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CellOverlay {
    pub center: Vector2<f32>,
    pub half_extents: Vector2<f32>,
    pub rotation: f32,
    pub ratio: f32,
    pub included: bool,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub frame: u64,
    pub phase: GamePhase,
    pub score: u32,
    pub sprites: Vec<SpriteDraw>,
    pub marbles: Vec<MarbleDraw>,
    pub lines: Vec<Line>,
    pub cells: Vec<CellOverlay>,
}

fn polygon_lines(points: &[Point<Real>], iso: &Isometry<Real>, scale: f32, color: [f32; 4]) -> Vec<Line> {
    let to_px = |p: &Point<Real>| {
        let p = iso * p;
        Vector2::new(p.x, p.y) * scale
    };
    (0..points.len())
        .map(|i| {
            Line(
                to_px(&points[i]),
                to_px(&points[(i + 1) % points.len()]),
                color,
            )
        })
        .collect()
}

fn shape_lines(shape: &dyn Shape, iso: &Isometry<Real>, scale: f32, color: [f32; 4]) -> Vec<Line> {
    if let Some(cuboid) = shape.as_cuboid() {
        let h = cuboid.half_extents;
        let corners = [
            point![-h.x, -h.y],
            point![h.x, -h.y],
            point![h.x, h.y],
            point![-h.x, h.y],
        ];
        polygon_lines(&corners, iso, scale, color)
    } else if let Some(poly) = shape.as_convex_polygon() {
        polygon_lines(poly.points(), iso, scale, color)
    } else {
        vec![]
    }
}

/// Outline of every collider part in pixels. Balls are skipped, marbles are drawn on their own.
pub fn get_collider_lines(collider: &Collider, pixels_per_meter: f32) -> Vec<Line> {
    let color = if collider.is_sensor() {
        SENSOR_COLOR
    } else {
        COLLIDER_COLOR
    };
    let position = collider.position();
    match collider.shape().as_compound() {
        Some(compound) => compound
            .shapes()
            .iter()
            .flat_map(|(iso, part)| {
                shape_lines(&**part, &(position * iso), pixels_per_meter, color)
            })
            .collect(),
        None => shape_lines(collider.shape(), position, pixels_per_meter, color),
    }
}

/// Cells mapped from sprite space into world pixels
pub fn cell_overlays(
    cells: &DebugCells,
    visual: &SpriteVisual,
    body_pos: Vector2<f32>,
    angle: f32,
) -> Vec<CellOverlay> {
    let cell_size = cells.cell_size as f32;
    let raster_size = Vector2::new(
        visual.canvas.width() as f32,
        visual.canvas.height() as f32,
    );
    cells
        .cells
        .iter()
        .map(|cell| {
            let x0 = cell.gx as f32 * cell_size;
            let y0 = cell.gy as f32 * cell_size;
            let w = cell_size.min(raster_size.x - x0);
            let h = cell_size.min(raster_size.y - y0);
            let local = Vector2::new(
                (x0 + w * 0.5 - raster_size.x * 0.5) * cells.scale.x,
                (y0 + h * 0.5 - raster_size.y * 0.5) * cells.scale.y,
            ) - visual.render_offset;
            CellOverlay {
                center: body_pos + rotate_radians(local, angle),
                half_extents: Vector2::new(w * 0.5 * cells.scale.x, h * 0.5 * cells.scale.y),
                rotation: angle,
                ratio: cell.ratio,
                included: cell.included,
            }
        })
        .collect()
}

/// Collects the frame from the ecs world. Overlay data is only gathered when the overlay is on.
pub fn build_frame(
    api: &EngineApi,
    pixels_per_meter: f32,
    marble_radius: f32,
    score: &ScoreBoard,
    debug: &DebugConfig,
) -> RenderFrame {
    let mut sprites = api
        .ecs_world
        .query::<(&SceneObject, &SpriteVisual, &Position, &Angle)>()
        .iter()
        .map(|(id, (object, visual, pos, angle))| {
            (id.id(), SpriteDraw {
                name: object.name.clone(),
                position: pos.0 * pixels_per_meter,
                rotation: angle.0,
                render_offset: visual.render_offset,
                display_size: visual.display_size,
            })
        })
        .collect::<Vec<(u32, SpriteDraw)>>();
    sprites.sort_by_key(|(id, _)| *id);
    let marbles = api
        .ecs_world
        .query::<(&Marble, &Position)>()
        .iter()
        .map(|(_, (_, pos))| MarbleDraw {
            position: pos.0 * pixels_per_meter,
            radius: marble_radius,
        })
        .collect();
    let mut lines = vec![];
    let mut cells = vec![];
    if debug.collision_overlay {
        for (_, collider) in api.physics_world.physics.colliders.iter() {
            lines.extend(get_collider_lines(collider, pixels_per_meter));
        }
        for (_, (debug_cells, visual, pos, angle)) in api
            .ecs_world
            .query::<(&DebugCells, &SpriteVisual, &Position, &Angle)>()
            .iter()
        {
            cells.extend(cell_overlays(
                debug_cells,
                visual,
                pos.0 * pixels_per_meter,
                angle.0,
            ));
        }
    }
    RenderFrame {
        frame: api.time.frames(),
        phase: score.phase,
        score: score.score,
        sprites: sprites.into_iter().map(|(_, s)| s).collect(),
        marbles,
        lines,
        cells,
    }
}

/// Writes each keyed canvas once as a png, so keying can be inspected
pub struct AlphaPreviewWriter {
    dir: PathBuf,
    written: BTreeSet<String>,
}

impl AlphaPreviewWriter {
    pub fn new(dir: impl Into<PathBuf>) -> AlphaPreviewWriter {
        AlphaPreviewWriter {
            dir: dir.into(),
            written: BTreeSet::new(),
        }
    }

    /// Forget what was written, canvases are rekeyed after a rebuild
    pub fn reset(&mut self) {
        self.written.clear();
    }

    fn write_one(&self, name: &str, visual: &SpriteVisual) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create preview directory {:?}", self.dir))?;
        let path = self.dir.join(format!("alpha_{}.png", name));
        visual
            .canvas
            .raster()
            .to_rgba_image()?
            .save(&path)
            .with_context(|| format!("Failed to write alpha preview {:?}", path))?;
        Ok(path)
    }

    /// Writes a preview for every sprite not written yet and returns how many were written.
    /// A sprite whose preview fails is logged and not retried until the next `reset`.
    pub fn write_missing(&mut self, api: &EngineApi) -> usize {
        let mut count = 0;
        for (_, (object, visual)) in api
            .ecs_world
            .query::<(&SceneObject, &SpriteVisual)>()
            .iter()
        {
            if self.written.contains(&object.name) {
                continue;
            }
            match self.write_one(&object.name, visual) {
                std::result::Result::Ok(path) => {
                    info!("Wrote alpha preview {:?}", path);
                    count += 1;
                }
                Err(e) => warn!("No alpha preview for {}: {:#}", object.name, e),
            }
            self.written.insert(object.name.clone());
        }
        count
    }
}
