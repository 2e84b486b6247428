mod game;
mod layout;
mod marbles;
mod scoring;

pub use game::*;
pub use layout::*;
pub use marbles::*;
pub use scoring::*;
