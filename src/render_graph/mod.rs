//! Render Graph System
//!
//! Passes declared in a scene become a directed acyclic graph whose edges
//! are inferred from the textures they write and read. The graph is
//! compiled once per scene load; resources and execution follow its order.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
