use anyhow::*;
use rapier2d::prelude::*;

use crate::{
    api::EngineApi,
    time::{ClockSource, FrameClock},
};

/// The engine wrapper struct for running the engine functions
pub struct Toybox {}

#[derive(Debug, Copy, Clone)]
pub struct EngineOptions {
    pub fixed_update_fps: f64,
    /// Stop after this many frames. `None` runs until the app asks to quit.
    pub max_frames: Option<u64>,
    /// Pace frames by the wall clock. When off, every frame advances the clock by one fixed step.
    pub realtime: bool,
    pub gravity: Vector<f32>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            fixed_update_fps: 60.0,
            max_frames: None,
            realtime: false,
            gravity: vector![0.0, 9.81],
        }
    }
}

impl Toybox {
    /// Run the engine application for `application` without a window.
    /// 1. `start`
    /// 2. `update`
    /// 3. `fixed_update` (by default 60 times per second)
    /// 4. `render`
    /// 5. `end_of_frame` (if you need something to occur last)
    /// 6. `shutdown`
    pub fn run<S: Engine>(mut application: S, opts: EngineOptions) -> Result<EngineApi> {
        let mut api = EngineApi::new(opts.gravity);
        Self::run_with_api(&mut application, &mut api, opts)?;
        Ok(api)
    }

    /// Same as `run` but on an existing context
    pub fn run_with_api<S: Engine>(
        application: &mut S,
        api: &mut EngineApi,
        opts: EngineOptions,
    ) -> Result<()> {
        let fixed_step_ms = 1000.0 / opts.fixed_update_fps;
        api.physics_world.physics.integration_parameters.dt = (1.0 / opts.fixed_update_fps) as f32;
        api.time = FrameClock::new(if opts.realtime {
            ClockSource::Realtime
        } else {
            ClockSource::Simulated(fixed_step_ms)
        });
        application.start(api)?;
        let mut frames = 0;
        loop {
            if let Some(max_frames) = opts.max_frames {
                if frames >= max_frames {
                    break;
                }
            }
            if application.should_quit(api) {
                info!("Quit requested after {} frames", frames);
                break;
            }
            application.update(api)?;
            if api.time.consume_fixed(fixed_step_ms) {
                application.fixed_update(api)?;
            }
            application.render(api)?;
            api.time.tick();
            application.end_of_frame(api)?;
            frames += 1;
        }
        application.shutdown(api)?;
        Ok(())
    }
}

/// Engine state trait implementing all stages of a main loop for the engine
pub trait Engine {
    /// Run at start
    fn start(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
    /// Run each frame
    fn update(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
    /// Run each frame at fixed interval
    fn fixed_update(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
    /// Produce whatever the frame should show
    fn render(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
    /// Run each frame after everyting else
    fn end_of_frame(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
    /// Checked before each frame
    fn should_quit(&self, _api: &EngineApi) -> bool {
        false
    }
    /// Run at shutdown
    fn shutdown(&mut self, _api: &mut EngineApi) -> Result<()> {
        Ok(())
    }
}
