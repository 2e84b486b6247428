use std::{str::FromStr, sync::Mutex};

use crate::shape::SolidityMode;

/// Immutable snapshot of the debug toggles, handed to synthesis and rendering per call
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DebugConfig {
    pub collision_overlay: bool,
    pub alpha_preview: bool,
    pub solidity_mode: SolidityMode,
}

/// Debug toggles plus a pending rebuild-all request. Mutated only through its setters.
#[derive(Debug, Default)]
pub struct DebugSettings {
    config: DebugConfig,
    rebuild_requested: bool,
}

impl DebugSettings {
    pub fn config(&self) -> DebugConfig {
        self.config
    }

    pub fn set_collision_overlay(&mut self, on: bool) {
        if self.config.collision_overlay != on {
            info!("Collision overlay {}", if on { "on" } else { "off" });
        }
        self.config.collision_overlay = on;
    }

    pub fn set_alpha_preview(&mut self, on: bool) {
        if self.config.alpha_preview != on {
            info!("Alpha preview {}", if on { "on" } else { "off" });
        }
        self.config.alpha_preview = on;
    }

    /// Changing the mode invalidates every synthesized body, so it also requests a rebuild
    pub fn set_solidity_mode(&mut self, mode: SolidityMode) {
        if self.config.solidity_mode != mode {
            info!("Solidity mode {} -> {}", self.config.solidity_mode, mode);
            self.config.solidity_mode = mode;
            self.rebuild_requested = true;
        }
    }

    pub fn request_rebuild_all(&mut self) {
        info!("Rebuild of all bodies requested");
        self.rebuild_requested = true;
    }

    /// Returns whether a rebuild was pending and clears it
    pub fn take_rebuild_request(&mut self) -> bool {
        std::mem::replace(&mut self.rebuild_requested, false)
    }

    /// Reads `MARBLES_OVERLAY`, `MARBLES_ALPHA_PREVIEW` and `MARBLES_SOLIDITY`
    pub fn apply_env(&mut self) {
        if std::env::var("MARBLES_OVERLAY").is_ok() {
            self.set_collision_overlay(true);
        }
        if std::env::var("MARBLES_ALPHA_PREVIEW").is_ok() {
            self.set_alpha_preview(true);
        }
        if let std::result::Result::Ok(mode) = std::env::var("MARBLES_SOLIDITY") {
            match SolidityMode::from_str(&mode.to_lowercase()) {
                std::result::Result::Ok(mode) => self.set_solidity_mode(mode),
                Err(_) => warn!("Unknown solidity mode {:?}, keeping {}", mode, self.config.solidity_mode),
            }
        }
    }
}

lazy_static! {
    static ref DEBUG_SETTINGS: Mutex<DebugSettings> = Mutex::new(DebugSettings::default());
}

fn with_settings<R>(f: impl FnOnce(&mut DebugSettings) -> R) -> R {
    // A panic while holding the lock leaves plain flags behind, which are still usable
    let mut settings = DEBUG_SETTINGS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut settings)
}

pub fn debug_config() -> DebugConfig {
    with_settings(|s| s.config())
}

pub fn set_collision_overlay(on: bool) {
    with_settings(|s| s.set_collision_overlay(on))
}

pub fn set_alpha_preview(on: bool) {
    with_settings(|s| s.set_alpha_preview(on))
}

pub fn set_solidity_mode(mode: SolidityMode) {
    with_settings(|s| s.set_solidity_mode(mode))
}

pub fn request_rebuild_all() {
    with_settings(|s| s.request_rebuild_all())
}

pub fn take_rebuild_request() -> bool {
    with_settings(|s| s.take_rebuild_request())
}

pub fn apply_env() {
    with_settings(|s| s.apply_env())
}
