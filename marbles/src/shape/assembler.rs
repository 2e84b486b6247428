use anyhow::*;
use cgmath::Vector2;
use rapier2d::{parry::transformation::vhacd::VHACDParameters, prelude::*};

use crate::shape::BoxPrimitive;

/// A rigid shape made of several parts whose center of mass sits at the local origin.
#[derive(Clone)]
pub struct CompoundShape {
    pub shape: SharedShape,
    /// Mean of the primitive centers in sprite pixels, relative to the sprite center
    pub geometric_center: Vector2<f32>,
    /// Center of mass the physics engine reported after geometric centering, in sprite pixels
    pub center_of_mass: Vector2<f32>,
    pub part_count: usize,
    /// False for the bounding box stand-in used when synthesis failed
    pub synthesized: bool,
}

impl CompoundShape {
    /// Translation from the sprite's center to the body's local origin, in sprite pixels.
    /// Renderers subtract it (rotated with the body) from the body position to place the sprite.
    pub fn render_offset(&self) -> Vector2<f32> {
        self.geometric_center + self.center_of_mass
    }

    /// Parts with their local isometries, in world units
    pub fn parts(&self) -> &[(Isometry<Real>, SharedShape)] {
        self.shape
            .as_compound()
            .map(|c| c.shapes())
            .unwrap_or(&[])
    }
}

impl std::fmt::Debug for CompoundShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompoundShape")
            .field("geometric_center", &self.geometric_center)
            .field("center_of_mass", &self.center_of_mass)
            .field("part_count", &self.part_count)
            .field("synthesized", &self.synthesized)
            .finish()
    }
}

/// Moves parts so that their combined center of mass is the origin. Returns the shape and the
/// center of mass before the move.
fn normalize_center_of_mass(
    parts: Vec<(Isometry<Real>, SharedShape)>,
) -> (SharedShape, Vector2<f32>) {
    let local_com = SharedShape::compound(parts.clone())
        .mass_properties(1.0)
        .local_com;
    let shift = Isometry::translation(-local_com.x, -local_com.y);
    let parts = parts
        .into_iter()
        .map(|(iso, shape)| (shift * iso, shape))
        .collect::<Vec<(Isometry<Real>, SharedShape)>>();
    (
        SharedShape::compound(parts),
        Vector2::new(local_com.x, local_com.y),
    )
}

/// Merges box primitives (sprite pixels) into one compound shape in world units.
///
/// Primitives are first centered on their mean position, then the whole shape is shifted so the
/// reported center of mass is the local origin. Both translations end up in `render_offset`.
pub fn assemble(primitives: &[BoxPrimitive], pixels_per_meter: f32) -> Result<CompoundShape> {
    ensure!(!primitives.is_empty(), "Nothing to assemble");
    ensure!(pixels_per_meter > 0.0, "Pixels per meter must be positive");
    let geometric_center = primitives
        .iter()
        .fold(Vector2::new(0.0, 0.0), |sum, p| sum + p.center)
        / primitives.len() as f32;
    let parts = primitives
        .iter()
        .map(|p| {
            let local = (p.center - geometric_center) / pixels_per_meter;
            (
                Isometry::translation(local.x, local.y),
                SharedShape::cuboid(
                    p.half_extents.x / pixels_per_meter,
                    p.half_extents.y / pixels_per_meter,
                ),
            )
        })
        .collect::<Vec<(Isometry<Real>, SharedShape)>>();
    let (shape, center_of_mass) = normalize_center_of_mass(parts);
    Ok(CompoundShape {
        shape,
        geometric_center,
        center_of_mass: center_of_mass * pixels_per_meter,
        part_count: primitives.len(),
        synthesized: true,
    })
}

fn convex_parts(points: &[Point<Real>]) -> Result<Vec<(Isometry<Real>, SharedShape)>> {
    let n = points.len() as u32;
    let indices = (0..n).map(|i| [i, (i + 1) % n]).collect::<Vec<[u32; 2]>>();
    let decomposed = SharedShape::convex_decomposition_with_params(points, &indices, &VHACDParameters {
        resolution: 32,
        ..VHACDParameters::default()
    });
    let parts = decomposed
        .as_compound()
        .map(|c| c.shapes().to_vec())
        .unwrap_or_default();
    if !parts.is_empty() {
        return Ok(parts);
    }
    // Tiny outlines can vanish in the voxelization, their hull is close enough
    let hull = SharedShape::convex_hull(points)
        .ok_or_else(|| anyhow!("Outline of {} vertices is degenerate", points.len()))?;
    Ok(vec![(Isometry::identity(), hull)])
}

/// Builds one compound shape from closed outlines given in sprite pixels relative to the sprite
/// center. Concave outlines are split into convex parts. The geometric center is the center of the
/// bounds of all outlines.
pub fn assemble_polygons(rings: &[Vec<Vector2<f32>>], pixels_per_meter: f32) -> Result<CompoundShape> {
    ensure!(!rings.is_empty(), "Nothing to assemble");
    ensure!(pixels_per_meter > 0.0, "Pixels per meter must be positive");
    ensure!(
        rings.iter().all(|ring| ring.len() >= 3),
        "Polygon needs at least 3 vertices"
    );
    let (min, max) = rings.iter().flatten().fold(
        (
            Vector2::new(f32::MAX, f32::MAX),
            Vector2::new(f32::MIN, f32::MIN),
        ),
        |(min, max), v| {
            (
                Vector2::new(min.x.min(v.x), min.y.min(v.y)),
                Vector2::new(max.x.max(v.x), max.y.max(v.y)),
            )
        },
    );
    let geometric_center = (min + max) * 0.5;
    let mut parts = vec![];
    for ring in rings {
        let points = ring
            .iter()
            .map(|v| {
                let local = (*v - geometric_center) / pixels_per_meter;
                point![local.x, local.y]
            })
            .collect::<Vec<Point<Real>>>();
        parts.extend(convex_parts(&points)?);
    }
    let part_count = parts.len();
    let (shape, center_of_mass) = normalize_center_of_mass(parts);
    Ok(CompoundShape {
        shape,
        geometric_center,
        center_of_mass: center_of_mass * pixels_per_meter,
        part_count,
        synthesized: true,
    })
}

/// Single box covering the whole sprite, used when synthesis produced nothing usable
pub fn bounding_box_shape(display_size: Vector2<f32>, pixels_per_meter: f32) -> CompoundShape {
    let half = Vector2::new(
        (display_size.x * 0.5).max(0.5),
        (display_size.y * 0.5).max(0.5),
    ) / pixels_per_meter;
    CompoundShape {
        shape: SharedShape::compound(vec![(
            Isometry::identity(),
            SharedShape::cuboid(half.x, half.y),
        )]),
        geometric_center: Vector2::new(0.0, 0.0),
        center_of_mass: Vector2::new(0.0, 0.0),
        part_count: 1,
        synthesized: false,
    }
}
