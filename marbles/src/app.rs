use std::{path::PathBuf, time::Duration};

use anyhow::*;
use rapier2d::prelude::*;
use toybox::{api::EngineApi, engine::Engine, time::PerformanceTimer};

use crate::{
    config::SceneConfig,
    render::{build_frame, AlphaPreviewWriter, RenderFrame},
    scene::{Layout, Scene},
    settings::{debug_config, take_rebuild_request},
    utils::asset_root,
};

/// Interval between performance log lines, in ms
const PERF_LOG_INTERVAL_MS: f64 = 5000.0;

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub scene_path: PathBuf,
    pub layout_path: PathBuf,
    pub asset_root: PathBuf,
    /// Write the layout back to `layout_path` on shutdown
    pub save_layout: bool,
    pub alpha_preview_dir: PathBuf,
    /// How long start-up waits for sprites before running with whatever has loaded
    pub asset_timeout: Duration,
}

impl AppOptions {
    /// Reads `MARBLES_SCENE`, `MARBLES_LAYOUT`, `MARBLES_SAVE_LAYOUT` and `MARBLES_ALPHA_PREVIEW`
    pub fn from_env() -> Result<AppOptions> {
        let root = asset_root()?;
        let scene_path = std::env::var("MARBLES_SCENE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("scenes/classic.json"));
        let layout_path = std::env::var("MARBLES_LAYOUT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("layout.json"));
        let alpha_preview_dir = std::env::var("MARBLES_ALPHA_PREVIEW")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("alpha_preview"));
        Ok(AppOptions {
            scene_path,
            layout_path,
            asset_root: root,
            save_layout: std::env::var("MARBLES_SAVE_LAYOUT").is_ok(),
            alpha_preview_dir,
            asset_timeout: Duration::from_secs(10),
        })
    }
}

pub struct App {
    options: AppOptions,
    scene: Scene,
    preview: AlphaPreviewWriter,
    last_frame: Option<RenderFrame>,
    time_since_last_perf: f64,
    simulation_timer: PerformanceTimer,
    render_timer: PerformanceTimer,
}

impl App {
    pub fn new(options: AppOptions) -> Result<App> {
        let config = SceneConfig::load(&options.scene_path)?;
        Ok(App::with_config(options, config))
    }

    pub fn with_config(options: AppOptions, config: SceneConfig) -> App {
        let scene = Scene::new(config, options.asset_root.clone());
        let preview = AlphaPreviewWriter::new(options.alpha_preview_dir.clone());
        App {
            options,
            scene,
            preview,
            last_frame: None,
            time_since_last_perf: 0.0,
            simulation_timer: PerformanceTimer::new(),
            render_timer: PerformanceTimer::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last_frame.as_ref()
    }

    fn startup_layout(&self) -> Result<Layout> {
        if let Some(layout) = Layout::load(&self.options.layout_path)? {
            return Ok(layout);
        }
        Ok(match &self.scene.config.layout {
            Some(layout) => layout.clone(),
            None => {
                info!("No layout file, using the default layout");
                Layout::default_layout()
            }
        })
    }

    fn log_performance(&mut self, api: &EngineApi) {
        debug!(
            "Performance: fps {:.1}, sim {:.3} ms, render {:.3} ms, marbles {}",
            api.time.avg_fps(),
            self.simulation_timer.time_average_ms(),
            self.render_timer.time_average_ms(),
            self.scene.alive_marbles(api)
        );
    }
}

impl Engine for App {
    fn start(&mut self, api: &mut EngineApi) -> Result<()> {
        let debug = debug_config();
        api.set_gravity(vector![0.0, self.scene.config.gravity]);
        info!(
            "Starting scene {} ({} sprites, solidity {})",
            self.scene.config.name,
            self.scene.config.sprites.len(),
            debug.solidity_mode
        );
        self.scene.request_assets();
        let layout = self.startup_layout()?;
        self.scene.place_layout(api, &layout, &debug)?;
        let created = self
            .scene
            .wait_for_assets(api, self.options.asset_timeout, &debug)?;
        info!(
            "{} objects created, {} still waiting",
            self.scene.body_index.len(),
            self.scene.pending_placements()
        );
        debug!("{} objects created after loading", created);
        Ok(())
    }

    fn update(&mut self, api: &mut EngineApi) -> Result<()> {
        let debug = debug_config();
        self.scene.poll_assets(api, &debug)?;
        if take_rebuild_request() {
            self.scene.rebuild_all(api, &debug);
            self.preview.reset();
        }
        Ok(())
    }

    fn fixed_update(&mut self, api: &mut EngineApi) -> Result<()> {
        self.simulation_timer.start();
        self.scene.step(api)?;
        self.simulation_timer.time_it();
        Ok(())
    }

    fn render(&mut self, api: &mut EngineApi) -> Result<()> {
        let debug = debug_config();
        self.render_timer.start();
        self.last_frame = Some(build_frame(
            api,
            self.scene.config.pixels_per_meter,
            self.scene.config.marbles.radius,
            &self.scene.score,
            &debug,
        ));
        if debug.alpha_preview {
            self.preview.write_missing(api);
        }
        self.render_timer.time_it();
        Ok(())
    }

    fn end_of_frame(&mut self, api: &mut EngineApi) -> Result<()> {
        self.time_since_last_perf += api.time.dt();
        if self.time_since_last_perf >= PERF_LOG_INTERVAL_MS {
            self.log_performance(api);
            self.time_since_last_perf = 0.0;
        }
        Ok(())
    }

    fn should_quit(&self, api: &EngineApi) -> bool {
        self.scene.is_finished(api)
    }

    fn shutdown(&mut self, api: &mut EngineApi) -> Result<()> {
        let score = &self.scene.score;
        info!(
            "Scene {} ended in {} phase: score {}, {} marbles spawned, {} lost, {} wasted",
            self.scene.config.name,
            score.phase,
            score.score,
            score.marbles_spawned,
            score.marbles_lost,
            score.marbles_wasted
        );
        if self.options.save_layout {
            self.scene.layout(api).save(&self.options.layout_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use toybox::engine::{EngineOptions, Toybox};

    use super::*;
    use crate::{config::SpriteAsset, object::ObjectKind, scene::LayoutObject};

    fn options(dir: &std::path::Path) -> AppOptions {
        AppOptions {
            scene_path: dir.join("scene.json"),
            layout_path: dir.join("layout.json"),
            asset_root: dir.to_path_buf(),
            save_layout: true,
            alpha_preview_dir: dir.join("preview"),
            asset_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_headless_run_saves_layout() {
        let dir = std::env::temp_dir().join(format!("marbles_app_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let block = crate::shape::RasterImage::filled(12, 12, [40, 40, 200, 255]);
        block
            .to_rgba_image()
            .unwrap()
            .save(dir.join("block.png"))
            .unwrap();
        let mut plank = LayoutObject::new("block", 300.0, 400.0);
        plank.rotation = 0.2;
        let config = SceneConfig {
            sprites: vec![SpriteAsset::new("block", "block.png", ObjectKind::Image, true)],
            layout: Some(Layout {
                objects: vec![plank.clone()],
            }),
            ..SceneConfig::default()
        };
        let app = App::with_config(options(&dir), config);
        let api = Toybox::run(app, EngineOptions {
            max_frames: Some(30),
            ..EngineOptions::default()
        })
        .unwrap();
        assert_eq!(api.time.frames(), 30);
        let saved = Layout::load(dir.join("layout.json")).unwrap().unwrap();
        assert_eq!(saved.objects.len(), 1);
        assert!((saved.objects[0].x - plank.x).abs() < 1e-3);
        assert!((saved.objects[0].rotation - plank.rotation).abs() < 1e-5);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unwritable_alpha_preview_still_shuts_down() {
        let dir = std::env::temp_dir().join(format!("marbles_app_preview_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        crate::shape::RasterImage::filled(12, 12, [200, 40, 40, 255])
            .to_rgba_image()
            .unwrap()
            .save(dir.join("block.png"))
            .unwrap();
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, b"regular file").unwrap();
        let mut options = options(&dir);
        options.alpha_preview_dir = blocker.join("preview");
        let config = SceneConfig {
            sprites: vec![SpriteAsset::new("block", "block.png", ObjectKind::Image, true)],
            layout: Some(Layout {
                objects: vec![LayoutObject::new("block", 200.0, 300.0)],
            }),
            ..SceneConfig::default()
        };
        // Only turns on preview writing, which other tests tolerate
        crate::settings::set_alpha_preview(true);
        let app = App::with_config(options, config);
        let api = Toybox::run(app, EngineOptions {
            max_frames: Some(5),
            ..EngineOptions::default()
        })
        .unwrap();
        assert_eq!(api.time.frames(), 5);
        // The layout is saved in shutdown
        assert!(Layout::load(dir.join("layout.json")).unwrap().is_some());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
