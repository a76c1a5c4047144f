//! Backend abstraction layer
//!
//! Provides the device trait the engine renders through, the descriptor
//! types it exchanges, and a headless implementation that records commands.

pub mod headless;
pub mod traits;
pub mod types;

pub use headless::{Command, HeadlessDevice};
pub use traits::*;
pub use types::*;
