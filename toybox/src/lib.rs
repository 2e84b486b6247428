#[macro_use]
extern crate log;

pub mod api;
pub mod assets;
pub mod engine;
pub mod logger;
pub mod physics;
pub mod time;
