//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`RigError`] covers the failure modes a graphics
//! backend can report back to the frame orchestrator:
//! - GPU initialization failures
//! - Pipeline and shader construction errors
//! - Texture and render target allocation errors
//!
//! Expected absence (an entity without geometry, an image source that is not
//! ready yet) is never an error; those paths are plain control flow.
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RigError>`.
//!
//! ```rust,ignore
//! use rig_core::errors::{RigError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Rig renderer.
#[derive(Error, Debug)]
pub enum RigError {
    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request GPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreateFailed(String),

    // ========================================================================
    // Pipeline & Shader Errors
    // ========================================================================
    /// Shader template expansion failed.
    #[error("Shader template error in '{template}': {reason}")]
    ShaderTemplate {
        /// Name of the template being expanded
        template: String,
        /// Message reported by the template engine
        reason: String,
    },

    /// The backend rejected a pipeline description.
    #[error("Pipeline creation failed for '{label}': {reason}")]
    PipelineCreation {
        /// Debug label of the pipeline
        label: String,
        /// Backend-specific failure description
        reason: String,
    },

    /// A handle did not refer to a live backend object.
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle {
        /// Kind of handle (pipeline, texture, primitive, target)
        kind: &'static str,
        /// Raw handle id
        index: u64,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Texture allocation failed.
    #[error("Texture allocation failed: {0}")]
    TextureAllocation(String),

    /// Offscreen render target allocation failed.
    #[error("Render target allocation failed ({width}x{height}): {reason}")]
    TargetAllocation {
        width: u32,
        height: u32,
        reason: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Renderer settings could not be parsed.
    #[error("Invalid renderer settings: {0}")]
    InvalidSettings(String),
}

/// Alias for `Result<T, RigError>`.
pub type Result<T> = std::result::Result<T, RigError>;
