//! Cameo wgpu backend
//!
//! Implements [`cameo_core::RenderBackend`] on a wgpu device with an
//! offscreen default target.
//!
//! ```ignore
//! use cameo_core::{Compositor, CompositorConfig, LayerTree};
//! use cameo_gpu::{GpuConfig, WgpuBackend};
//!
//! let mut backend = WgpuBackend::new(GpuConfig::default().with_env_overrides())?;
//! let mut compositor = Compositor::new(&backend, CompositorConfig::default());
//! let mut tree = LayerTree::new();
//! compositor.render_frame(&mut backend, &mut tree, 0.0);
//! let pixels = backend.read_pixels(None)?;
//! ```

mod arena;
mod backend;
pub mod config;
pub mod error;
mod pipeline;
mod timer;

pub use backend::WgpuBackend;
pub use config::{preferred_backends, GpuConfig};
pub use error::GpuError;
pub use pipeline::validate_wgsl;
