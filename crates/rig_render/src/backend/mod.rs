//! [`RenderDevice`](crate::device::RenderDevice) implementations.
//!
//! - [`headless`]: records calls without a GPU; always available.
//! - [`wgpu`]: draws through wgpu; behind the `wgpu-backend` feature.

pub mod headless;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu;

pub use headless::{DeviceCall, DrawRecord, HeadlessDevice};
#[cfg(feature = "wgpu-backend")]
pub use self::wgpu::WgpuDevice;
