//! Frame orchestration for Rig scenes.
//!
//! A frame walks the scene once per render pass. Traversal logs drawable
//! entities into a [`RenderJournal`]; flushing the journal sorts the entries
//! by depth, resolves a pipeline for each entity from the [`PipelineCache`]
//! and draws through a [`RenderDevice`].
//!
//! Passes run in a fixed order: the shadow map, then (with depth of field)
//! the blur mask, then the unblended and blended color passes. See
//! [`Renderer::render_frame`].

pub mod backend;
pub mod cache;
pub mod device;
pub mod dof;
pub mod events;
pub mod journal;
pub mod pass;
pub mod pipeline;
pub mod renderer;
pub mod resolver;
pub mod uniforms;

pub use cache::{PipelineCache, Released};
pub use device::{Rect, RenderDevice, TargetFrame};
pub use dof::DofEffect;
pub use events::{EventQueue, RenderEvent};
pub use journal::{FlushParams, JournalEntry, RenderJournal};
pub use pass::{CacheSlot, RenderPass};
pub use pipeline::{PipelineDesc, RenderResources, Snippets};
pub use renderer::{Frame, FrameStats, Renderer};
pub use resolver::{LightContext, Resolver};
pub use uniforms::{Uniform, UniformBlock, UniformValue};
