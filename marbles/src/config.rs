use std::{fs, path::Path};

use anyhow::*;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};

use crate::{object::ObjectKind, scene::Layout, shape::SynthesisParams};

/// Axis aligned play area in pixels, with the origin at the top left corner
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayArea {
    pub width: f32,
    pub height: f32,
    /// Marbles further than this outside the area are lost
    pub margin: f32,
}

impl Default for PlayArea {
    fn default() -> Self {
        PlayArea {
            width: 1280.0,
            height: 720.0,
            margin: 100.0,
        }
    }
}

impl PlayArea {
    pub fn contains(&self, pos: Vector2<f32>) -> bool {
        pos.x >= -self.margin
            && pos.x <= self.width + self.margin
            && pos.y >= -self.margin
            && pos.y <= self.height + self.margin
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarbleParams {
    /// Pixels
    pub radius: f32,
    pub restitution: f32,
    pub density: f32,
    pub spawn_interval_secs: f32,
    /// Maximum horizontal spawn offset in pixels
    pub jitter: f32,
}

impl Default for MarbleParams {
    fn default() -> Self {
        MarbleParams {
            radius: 8.0,
            restitution: 0.5,
            density: 1.0,
            spawn_interval_secs: 1.0,
            jitter: 4.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Marbles released once the first marble lands in a cup
    pub final_burst: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            final_burst: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteAsset {
    pub name: String,
    /// Relative to the asset root
    pub path: String,
    #[serde(default)]
    pub kind: ObjectKind,
    /// Key out the background. Off for sprites that already carry transparency.
    #[serde(default = "default_true")]
    pub key_background: bool,
}

fn default_true() -> bool {
    true
}

impl SpriteAsset {
    pub fn new(name: &str, path: &str, kind: ObjectKind, key_background: bool) -> SpriteAsset {
        SpriteAsset {
            name: name.to_string(),
            path: path.to_string(),
            kind,
            key_background,
        }
    }
}

/// Everything that differs between scenes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub name: String,
    pub pixels_per_meter: f32,
    /// Downwards, m/s²
    pub gravity: f32,
    pub play_area: PlayArea,
    /// Pixels
    pub spawn_point: Vector2<f32>,
    pub synthesis: SynthesisParams,
    pub marbles: MarbleParams,
    pub scoring: ScoringRules,
    pub sprites: Vec<SpriteAsset>,
    /// Used when no layout file exists
    pub layout: Option<Layout>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            name: "classic".to_string(),
            pixels_per_meter: 50.0,
            gravity: 9.81,
            play_area: PlayArea::default(),
            spawn_point: Vector2::new(640.0, 40.0),
            synthesis: SynthesisParams::default(),
            marbles: MarbleParams::default(),
            scoring: ScoringRules::default(),
            sprites: vec![
                SpriteAsset::new("cup", "sprites/cup.png", ObjectKind::Image, true),
                SpriteAsset::new("plank", "sprites/plank.png", ObjectKind::Image, true),
                SpriteAsset::new("bin", "sprites/bin.png", ObjectKind::Image, true),
                SpriteAsset::new("label", "sprites/label.png", ObjectKind::Text, false),
            ],
            layout: None,
        }
    }
}

impl SceneConfig {
    pub fn sprite(&self, name: &str) -> Option<&SpriteAsset> {
        self.sprites.iter().find(|s| s.name == name)
    }

    /// Reads a scene document. A missing file gives the default scene.
    pub fn load(path: impl AsRef<Path>) -> Result<SceneConfig> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No scene config at {:?}, using defaults", path);
            return Ok(SceneConfig::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene config {:?}", path))?;
        let config = SceneConfig::from_json(&data)
            .with_context(|| format!("Malformed scene config {:?}", path))?;
        info!("Loaded scene {} from {:?}", config.name, path);
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<SceneConfig> {
        let config: SceneConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.pixels_per_meter > 0.0, "pixels_per_meter must be positive");
        ensure!(self.synthesis.cell_size > 0, "cell_size must be positive");
        ensure!(
            (0.0..1.0).contains(&self.synthesis.inclusion_ratio),
            "inclusion_ratio must be in [0, 1)"
        );
        ensure!(self.marbles.radius > 0.0, "marble radius must be positive");
        Ok(())
    }
}
