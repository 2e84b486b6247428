use anyhow::*;
use marbles::{
    app::{App, AppOptions},
    settings,
};
use simplelog::LevelFilter;
use toybox::{
    engine::{EngineOptions, Toybox},
    logger::initialize_logger,
};

/// Frames a headless run lasts unless `MARBLES_FRAMES` says otherwise
const DEFAULT_FRAMES: u64 = 1800;

fn max_frames() -> Result<u64> {
    match std::env::var("MARBLES_FRAMES") {
        std::result::Result::Ok(frames) => frames
            .parse::<u64>()
            .with_context(|| format!("MARBLES_FRAMES is not a frame count: {:?}", frames)),
        Err(_) => Ok(DEFAULT_FRAMES),
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    initialize_logger(LevelFilter::Debug, "marbles_run.log")?;
    #[cfg(not(debug_assertions))]
    initialize_logger(LevelFilter::Info, "marbles_run.log")?;

    settings::apply_env();
    let options = AppOptions::from_env()?;
    let max_frames = max_frames()?;
    Toybox::run(App::new(options)?, EngineOptions {
        max_frames: Some(max_frames),
        ..EngineOptions::default()
    })?;
    Ok(())
}
