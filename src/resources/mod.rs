//! Resource management
//!
//! Handles loading of meshes, textures and shader programs.

mod loader;
mod mesh;
mod shader;
mod texture;

pub use loader::*;
pub use mesh::*;
pub use shader::*;
pub use texture::*;
