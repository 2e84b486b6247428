mod assembler;
mod contour_formation;
mod grid;
mod keying;
mod raster;
mod solidity;
mod sprite_cache;
mod synthesis;

pub use assembler::*;
pub use contour_formation::*;
pub use grid::*;
pub use keying::*;
pub use raster::*;
pub use solidity::*;
pub use sprite_cache::*;
pub use synthesis::*;
