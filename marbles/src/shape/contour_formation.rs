use std::collections::VecDeque;

use cgmath::Vector2;

use crate::shape::{RasterImage, SolidityClassifier};

/// 8-connected neighbor offsets, clockwise on screen (y down) starting east
const MOORE_DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

/// Inclusive pixel bounds of the solid pixels
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl PixelBounds {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    /// Center in pixel edge coordinates
    pub fn center(&self) -> Vector2<f32> {
        Vector2::new(
            (self.min_x + self.max_x + 1) as f32 * 0.5,
            (self.min_y + self.max_y + 1) as f32 * 0.5,
        )
    }
}

/// Outline of one solid piece
#[derive(Debug, Clone)]
pub struct ContourOutline {
    /// Closed polygon in raster pixels relative to `center`. The closing edge is implicit.
    pub vertices: Vec<Vector2<f32>>,
    /// Center of the piece's pixel bounds relative to the raster center
    pub center: Vector2<f32>,
    /// Boundary pixels visited before simplification
    pub raw_len: usize,
    pub pixel_count: usize,
    /// False when the outline is the bounding rectangle stand-in
    pub traced: bool,
}

/// One 8-connected group of solid pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidPiece {
    /// First pixel of the piece in row-major order
    pub start: (i32, i32),
    pub bounds: PixelBounds,
    pub pixel_count: usize,
}

/// Labels the 8-connected pieces of solid pixels, ordered by their first pixel in row-major order
pub fn solid_pieces(raster: &RasterImage, solidity: &SolidityClassifier) -> Vec<SolidPiece> {
    let (width, height) = (raster.width() as i32, raster.height() as i32);
    let mut visited = vec![false; (width * height) as usize];
    let mut pieces = vec![];
    let mut queue = VecDeque::new();
    for y in 0..height {
        for x in 0..width {
            if visited[(y * width + x) as usize] || !solidity.is_solid(raster, x, y) {
                continue;
            }
            visited[(y * width + x) as usize] = true;
            queue.push_back((x, y));
            let mut piece = SolidPiece {
                start: (x, y),
                bounds: PixelBounds {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                pixel_count: 0,
            };
            while let Some((px, py)) = queue.pop_front() {
                piece.pixel_count += 1;
                piece.bounds.min_x = piece.bounds.min_x.min(px);
                piece.bounds.min_y = piece.bounds.min_y.min(py);
                piece.bounds.max_x = piece.bounds.max_x.max(px);
                piece.bounds.max_y = piece.bounds.max_y.max(py);
                for (dx, dy) in MOORE_DIRECTIONS.iter() {
                    let (nx, ny) = (px + dx, py + dy);
                    if !raster.contains(nx, ny) || visited[(ny * width + nx) as usize] {
                        continue;
                    }
                    if solidity.is_solid(raster, nx, ny) {
                        visited[(ny * width + nx) as usize] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
            pieces.push(piece);
        }
    }
    pieces
}

/// Walks the outer boundary of the piece starting at `start` with Moore neighborhood following.
/// `start` must be the first solid pixel of its piece in row-major order.
///
/// The walk ends when it is about to leave `start` the same way it first did, so pixels that
/// join several arms are passed more than once. Returns the boundary pixels in visiting order;
/// a lone pixel yields just the start.
pub fn moore_trace(
    raster: &RasterImage,
    solidity: &SolidityClassifier,
    start: (i32, i32),
) -> Vec<(i32, i32)> {
    let mut contour = vec![start];
    let mut current = start;
    // Nothing solid lies west of the first pixel in row-major order
    let mut search_from = WEST;
    let mut first_move = None;
    let max_steps = 4 * raster.width() as usize * raster.height() as usize + 8;
    for _ in 0..max_steps {
        let next = (0..8).map(|i| (search_from + i) % 8).find_map(|dir| {
            let (dx, dy) = MOORE_DIRECTIONS[dir];
            let neighbor = (current.0 + dx, current.1 + dy);
            if solidity.is_solid(raster, neighbor.0, neighbor.1) {
                Some((neighbor, dir))
            } else {
                None
            }
        });
        let (neighbor, dir) = match next {
            Some(found) => found,
            None => return contour,
        };
        if current == start {
            match first_move {
                None => first_move = Some(neighbor),
                Some(first) if first == neighbor => {
                    // Walk closed, the start was pushed again on arrival
                    contour.pop();
                    return contour;
                }
                Some(_) => {}
            }
        }
        contour.push(neighbor);
        current = neighbor;
        // Opposite of the move, one step further clockwise
        search_from = (dir + 5) % 8;
    }
    warn!("Contour trace hit its step limit at {} points", contour.len());
    contour
}

fn bounds_rectangle(bounds: &PixelBounds) -> Vec<Vector2<f32>> {
    let hw = bounds.width() as f32 * 0.5;
    let hh = bounds.height() as f32 * 0.5;
    vec![
        Vector2::new(-hw, -hh),
        Vector2::new(hw, -hh),
        Vector2::new(hw, hh),
        Vector2::new(-hw, hh),
    ]
}

fn trace_piece(
    raster: &RasterImage,
    solidity: &SolidityClassifier,
    piece: &SolidPiece,
    simplify_tolerance: f32,
) -> ContourOutline {
    let raster_center = Vector2::new(raster.width() as f32 * 0.5, raster.height() as f32 * 0.5);
    let bounds = &piece.bounds;
    let center = bounds.center();
    let rectangle = |raw_len| ContourOutline {
        vertices: bounds_rectangle(bounds),
        center: center - raster_center,
        raw_len,
        pixel_count: piece.pixel_count,
        traced: false,
    };
    let boundary = moore_trace(raster, solidity, piece.start);
    if boundary.len() < 3 {
        return rectangle(boundary.len());
    }
    // Pixel centers sit half a pixel inside the silhouette, stretch them to the pixel bounds
    let stretch = Vector2::new(
        bounds.width() as f32 / (bounds.width() - 1).max(1) as f32,
        bounds.height() as f32 / (bounds.height() - 1).max(1) as f32,
    );
    let mut points = boundary
        .iter()
        .map(|&(x, y)| {
            let p = Vector2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
            Vector2::new(p.x * stretch.x, p.y * stretch.y)
        })
        .collect::<Vec<Vector2<f32>>>();
    // Close the ring so the simplification keeps the start as an anchor on both ends
    points.push(points[0]);
    let mut vertices = douglas_peucker_simplify(&points, simplify_tolerance);
    vertices.pop();
    if vertices.len() < 3 {
        return rectangle(boundary.len());
    }
    ContourOutline {
        vertices,
        center: center - raster_center,
        raw_len: boundary.len(),
        pixel_count: piece.pixel_count,
        traced: true,
    }
}

/// Traces every solid piece of the raster into its own simplified closed polygon.
/// Pieces too thin to give 3 vertices become their bounding rectangle. Returns nothing when no
/// pixel is solid.
pub fn trace_outlines(
    raster: &RasterImage,
    solidity: &SolidityClassifier,
    simplify_tolerance: f32,
) -> Vec<ContourOutline> {
    let outlines = solid_pieces(raster, solidity)
        .iter()
        .map(|piece| trace_piece(raster, solidity, piece, simplify_tolerance))
        .collect::<Vec<ContourOutline>>();
    debug!(
        "Traced {} pieces into {} vertices",
        outlines.len(),
        outlines.iter().map(|o| o.vertices.len()).sum::<usize>()
    );
    outlines
}

/// Squared distance of `point` from the segment `line`
fn perpendicular_squared_distance(point: Vector2<f32>, line: (Vector2<f32>, Vector2<f32>)) -> f32 {
    let (a, b) = line;
    let ab = b - a;
    let ap = point - a;
    let len_squared = ab.x * ab.x + ab.y * ab.y;
    if len_squared <= f32::EPSILON {
        return ap.x * ap.x + ap.y * ap.y;
    }
    let t = ((ap.x * ab.x + ap.y * ab.y) / len_squared).clamp(0.0, 1.0);
    let d = ap - ab * t;
    d.x * d.x + d.y * d.y
}

/// Using recursive Ramer-Douglas-Peucker algorithm https://en.wikipedia.org/wiki/Ramer%E2%80%93Douglas%E2%80%93Peucker_algorithm
/// Keeps the first and last vertex and every vertex farther than `epsilon` from the simplified line.
pub fn douglas_peucker_simplify(vertices: &[Vector2<f32>], epsilon: f32) -> Vec<Vector2<f32>> {
    if vertices.len() < 3 {
        return vertices.to_vec();
    }
    let end = vertices.len() - 1;
    let line = (vertices[0], vertices[end]);
    let mut d_squared_max = 0.0;
    let mut farthest_point_index = 0;
    for (i, vertex) in vertices.iter().enumerate().take(end).skip(1) {
        let d_squared = perpendicular_squared_distance(*vertex, line);
        if d_squared > d_squared_max {
            farthest_point_index = i;
            d_squared_max = d_squared;
        }
    }
    if d_squared_max > epsilon * epsilon {
        let mut simplified =
            douglas_peucker_simplify(&vertices[..=farthest_point_index], epsilon);
        let rest = douglas_peucker_simplify(&vertices[farthest_point_index..], epsilon);
        simplified.pop();
        simplified.extend(rest);
        simplified
    } else {
        vec![vertices[0], vertices[end]]
    }
}

/// Signed area of a closed polygon, positive when clockwise on screen
pub fn polygon_area(vertices: &[Vector2<f32>]) -> f32 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f32>()
        * 0.5
}
