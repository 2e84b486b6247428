#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod app;
pub mod config;
pub mod interact;
pub mod object;
pub mod render;
pub mod scene;
pub mod settings;
pub mod shape;
pub mod utils;
