//! shadertool - a declarative multi-pass render graph engine
//!
//! A scene description (JSON or RON) names objects, textures, a camera and
//! an ordered list of passes. The engine compiles it into a render graph:
//! - Names are resolved once into typed handles
//! - Pass order is inferred from the textures passes write and read
//! - Render targets follow the viewport and are reallocated on resize
//! - Every frame binds targets, textures and uniforms and issues draws
//!
//! Rendering goes through the [`backend::RenderDevice`] trait; the
//! [`backend::HeadlessDevice`] records commands instead of touching a GPU.

pub mod backend;
pub mod engine;
pub mod error;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod watcher;

use std::path::Path;

use serde::Deserialize;

pub use engine::{Engine, EngineState, LoadedScene};
pub use error::{DrawError, ErrorCategory, SceneError, SceneResult};
pub use render_graph::{FrameInput, FrameReport};
pub use watcher::SceneWatcher;

use crate::scene::ControlSettings;

/// Near clip plane of every camera
pub const NEAR_PLANE: f32 = 0.01;
/// Far clip plane of every camera
pub const FAR_PLANE: f32 = 100.0;

/// Configuration for initializing the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial viewport width
    pub width: u32,
    /// Initial viewport height
    pub height: u32,
    /// Color the first framebuffer pass clears to
    pub clear_color: [f32; 4],
    /// Degrees of camera rotation per dragged pixel
    pub orbit_sensitivity: f32,
    /// Maximum absolute orbital pitch in degrees
    pub pitch_limit: f32,
    pub zoom_step: f32,
    pub min_distance: f32,
    pub move_speed: f32,
    /// Reload the scene when its files change
    pub watch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let controls = ControlSettings::default();
        Self {
            width: 1280,
            height: 720,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            orbit_sensitivity: controls.sensitivity,
            pitch_limit: controls.pitch_limit,
            zoom_step: controls.zoom_step,
            min_distance: controls.min_distance,
            move_speed: controls.move_speed,
            watch: false,
        }
    }
}

impl EngineConfig {
    /// Read a RON config file; missing fields keep their defaults
    pub fn load_from_file(path: &Path) -> SceneResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = ron::from_str(&text).map_err(|e| SceneError::Parse {
            origin: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject camera tuning that would break the camera invariants
    pub fn validate(&self) -> SceneResult<()> {
        let invalid = |field: &str, value: f32, expected: &str| SceneError::InvalidConfig {
            path: field.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        };
        if !(self.pitch_limit > 0.0 && self.pitch_limit < 90.0) {
            return Err(invalid(
                "pitch_limit",
                self.pitch_limit,
                "an angle between 0 and 90 degrees",
            ));
        }
        if !(self.min_distance > 0.0) {
            return Err(invalid("min_distance", self.min_distance, "a distance greater than 0"));
        }
        if !(self.orbit_sensitivity > 0.0) {
            return Err(invalid(
                "orbit_sensitivity",
                self.orbit_sensitivity,
                "a number greater than 0",
            ));
        }
        Ok(())
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            sensitivity: self.orbit_sensitivity,
            pitch_limit: self.pitch_limit,
            zoom_step: self.zoom_step,
            min_distance: self.min_distance,
            move_speed: self.move_speed,
        }
    }
}
