use std::{env::current_dir, path::PathBuf};

use anyhow::*;
use cgmath::Vector2;

/// Rotates `v` counter clockwise by `angle` radians (clockwise on screen, where y points down)
pub fn rotate_radians(v: Vector2<f32>, angle: f32) -> Vector2<f32> {
    let (sin, cos) = angle.sin_cos();
    Vector2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Directory sprite paths are resolved against
pub fn asset_root() -> Result<PathBuf> {
    Ok(current_dir()?.join("assets"))
}
