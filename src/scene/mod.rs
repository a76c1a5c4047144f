//! Scene management
//!
//! Parsing of scene descriptions, the registry of named entities they
//! declare, and the camera driven by host input.

mod camera;
mod camera_controller;
mod description;
mod registry;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use description::*;
pub use registry::*;
pub use transform::*;
