//! Foundational types for the Rig renderer: errors, device handles, matrix
//! helpers and renderer settings.

pub mod errors;
pub mod handles;
pub mod math;
pub mod settings;

pub use errors::{Result, RigError};
pub use handles::{PipelineHandle, PrimitiveHandle, TargetHandle, TextureHandle};
pub use settings::RendererSettings;
