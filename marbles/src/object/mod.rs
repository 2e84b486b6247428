mod objects;
mod physics_components;
mod placement;

pub use objects::*;
pub use physics_components::*;
pub use placement::*;
