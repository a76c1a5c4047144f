//! Camera controller system
//!
//! Input deltas are supplied by the host every frame; controllers turn them
//! into camera state changes:
//! - Orbital: drag rotates around the center, scroll zooms
//! - Free: drag looks around, movement flags fly
//! - LookAt: fixed, ignores input

use glam::{Vec2, Vec3};

use super::camera::{CameraKind, CameraModel, FreeCamera, LookAtCamera, OrbitalCamera};

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, QE for up/down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether a drag is active (e.g., left mouse button held)
    pub dragging: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input that only drags the mouse by the given pixel delta
    pub fn drag(delta: Vec2) -> Self {
        Self {
            mouse_delta: delta,
            dragging: true,
            ..Default::default()
        }
    }
}

/// Tuning shared by all controllers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    /// Degrees of rotation per dragged pixel
    pub sensitivity: f32,
    /// Maximum absolute pitch in degrees
    pub pitch_limit: f32,
    /// Distance change per scroll unit
    pub zoom_step: f32,
    pub min_distance: f32,
    /// Free camera speed in units per second
    pub move_speed: f32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            sensitivity: 0.25,
            pitch_limit: 89.0,
            zoom_step: 0.5,
            min_distance: 0.1,
            move_speed: 5.0,
        }
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera state based on input and delta time
    fn update(&mut self, input: &CameraInput, settings: &ControlSettings, dt: f32);

    /// Get the controller name for debugging
    fn name(&self) -> &'static str;
}

impl CameraController for OrbitalCamera {
    fn update(&mut self, input: &CameraInput, settings: &ControlSettings, _dt: f32) {
        if input.dragging && input.mouse_delta != Vec2::ZERO {
            // Dragging right orbits counter-clockwise seen from above
            self.rotate(
                -input.mouse_delta.x * settings.sensitivity,
                input.mouse_delta.y * settings.sensitivity,
                settings.pitch_limit,
            );
        }

        if input.scroll_delta != 0.0 {
            self.distance = (self.distance - input.scroll_delta * settings.zoom_step)
                .max(settings.min_distance);
        }
    }

    fn name(&self) -> &'static str {
        "Orbital"
    }
}

impl CameraController for FreeCamera {
    fn update(&mut self, input: &CameraInput, settings: &ControlSettings, dt: f32) {
        if input.dragging && input.mouse_delta != Vec2::ZERO {
            self.yaw = (self.yaw - input.mouse_delta.x * settings.sensitivity).rem_euclid(360.0);
            self.pitch = (self.pitch - input.mouse_delta.y * settings.sensitivity)
                .clamp(-settings.pitch_limit, settings.pitch_limit);
        }

        let forward = self.forward();
        let right = self.right();
        let mut velocity = Vec3::ZERO;

        if input.forward {
            velocity += forward;
        }
        if input.backward {
            velocity -= forward;
        }
        if input.right {
            velocity += right;
        }
        if input.left {
            velocity -= right;
        }
        if input.up {
            velocity += Vec3::Y;
        }
        if input.down {
            velocity -= Vec3::Y;
        }

        // Normalize if moving diagonally
        if velocity.length_squared() > 0.0 {
            self.position += velocity.normalize() * settings.move_speed * dt;
        }
    }

    fn name(&self) -> &'static str {
        "Free"
    }
}

impl CameraController for LookAtCamera {
    fn update(&mut self, _input: &CameraInput, _settings: &ControlSettings, _dt: f32) {}

    fn name(&self) -> &'static str {
        "LookAt"
    }
}

impl CameraModel {
    /// Apply one frame of input to whichever controller this camera uses
    pub fn update(&mut self, input: &CameraInput, settings: &ControlSettings, dt: f32) {
        let settings = ControlSettings {
            sensitivity: self.sensitivity.unwrap_or(settings.sensitivity),
            ..*settings
        };
        self.controller_mut().update(input, &settings, dt);
    }

    pub fn controller_mut(&mut self) -> &mut dyn CameraController {
        match &mut self.kind {
            CameraKind::Orbital(orbit) => orbit,
            CameraKind::Free(free) => free,
            CameraKind::LookAt(look) => look,
        }
    }
}
