//! Camera model

use glam::{Mat4, Vec3};

use crate::{FAR_PLANE, NEAR_PLANE};

/// Camera orbiting a fixed center point, angles in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalCamera {
    pub center: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl OrbitalCamera {
    pub fn new(center: Vec3, distance: f32) -> Self {
        Self {
            center,
            distance,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Rotate by the given deltas. Pitch is clamped to `±pitch_limit`, yaw
    /// wraps into `[0, 360)`.
    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32, pitch_limit: f32) {
        self.yaw = (self.yaw + yaw_delta).rem_euclid(360.0);
        self.pitch = (self.pitch + pitch_delta).clamp(-pitch_limit, pitch_limit);
    }

    /// Unit vector from the center towards the eye
    pub fn direction(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        )
    }

    pub fn eye(&self) -> Vec3 {
        self.center + self.distance * self.direction()
    }
}

/// Free-flying camera, angles in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl FreeCamera {
    /// Get the forward direction based on yaw/pitch
    pub fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            -pitch.cos() * yaw.sin(),
            pitch.sin(),
            -pitch.cos() * yaw.cos(),
        )
    }

    /// Get the right direction (perpendicular to forward, on XZ plane)
    pub fn right(&self) -> Vec3 {
        let yaw = self.yaw.to_radians();
        Vec3::new(yaw.cos(), 0.0, -yaw.sin())
    }
}

/// Fixed camera looking from one point at another
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAtCamera {
    pub from: Vec3,
    pub to: Vec3,
    pub up: Vec3,
}

/// Camera kinds a scene can declare
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    Orbital(OrbitalCamera),
    Free(FreeCamera),
    LookAt(LookAtCamera),
}

/// The scene camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub kind: CameraKind,
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Mouse sensitivity override in degrees per pixel
    pub sensitivity: Option<f32>,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            kind: CameraKind::Orbital(OrbitalCamera::new(Vec3::ZERO, 10.0)),
            fov: 60.0,
            sensitivity: None,
        }
    }
}

impl CameraModel {
    pub fn new(kind: CameraKind, fov: f32) -> Self {
        Self {
            kind,
            fov,
            sensitivity: None,
        }
    }

    /// World-space eye position
    pub fn position(&self) -> Vec3 {
        match &self.kind {
            CameraKind::Orbital(orbit) => orbit.eye(),
            CameraKind::Free(free) => free.position,
            CameraKind::LookAt(look) => look.from,
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        match &self.kind {
            CameraKind::Orbital(orbit) => Mat4::look_at_rh(orbit.eye(), orbit.center, Vec3::Y),
            CameraKind::Free(free) => {
                Mat4::look_to_rh(free.position, free.forward(), Vec3::Y)
            }
            CameraKind::LookAt(look) => Mat4::look_at_rh(look.from, look.to, look.up),
        }
    }

    /// Get the projection matrix for the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, NEAR_PLANE, FAR_PLANE)
    }

    /// Clamp the pitch of orbital and free cameras to `±limit` degrees
    pub fn clamp_pitch(&mut self, limit: f32) {
        match &mut self.kind {
            CameraKind::Orbital(OrbitalCamera { pitch, .. })
            | CameraKind::Free(FreeCamera { pitch, .. }) => *pitch = pitch.clamp(-limit, limit),
            CameraKind::LookAt(_) => {}
        }
    }

    /// Whether two cameras are of the same kind, ignoring their state
    pub fn same_kind(&self, other: &CameraModel) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }
}
