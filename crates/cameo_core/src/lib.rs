//! Cameo Compositor
//!
//! GPU layer compositor for virtual camera pipelines. A [`LayerTree`] of
//! textured, transformed layers is drawn each frame through per-layer filter
//! chains onto a [`RenderBackend`]:
//!
//! - **Layers**: position, anchor, 3D transform, opacity, mask and filters
//! - **Filters**: WGSL fragment programs with per-draw parameters, chained
//!   through pooled offscreen targets
//! - **Occlusion**: layers hidden behind opaque layers are skipped
//! - **Timing**: asynchronous GPU timer queries per filter or per frame
//!
//! The wgpu backend lives in `cameo_gpu`; [`headless::HeadlessBackend`]
//! records commands without a device.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use cameo_core::headless::HeadlessBackend;
//! use cameo_core::{Compositor, CompositorConfig, ImageContent, Layer, LayerTree, PixelSize, Rect};
//!
//! let mut backend = HeadlessBackend::new();
//! let mut compositor = Compositor::new(&backend, CompositorConfig::default());
//!
//! let mut tree = LayerTree::new();
//! let mut layer = Layer::with_frame(Rect::new(0.0, 0.0, 320.0, 180.0));
//! layer.set_contents(Some(Rc::new(ImageContent::solid(PixelSize::new(2, 2), [255, 0, 0, 255]))));
//! let id = tree.insert(layer);
//! tree.add_sublayer(tree.root(), id);
//!
//! compositor.render_frame(&mut backend, &mut tree, 0.0);
//! assert_eq!(backend.stats().draws, 1);
//! ```

pub mod backend;
pub mod compositor;
pub mod config;
pub mod content;
pub mod error;
pub mod filter;
pub mod filters;
pub mod geometry;
pub mod headless;
pub mod layer;
pub mod pool;
pub mod program_cache;
pub mod shader;
pub mod texture_cache;
pub mod timing;
pub mod visibility;

pub use backend::{
    BlendMode, Capabilities, DrawCall, Geometry, GpuTier, ImageData, PixelFormat, ProgramId,
    QueryId, QueryStatus, RenderBackend, TargetHandles, TargetId, TextureId,
};
pub use compositor::{Compositor, CompositorStats, FrameTimingCallback};
pub use config::CompositorConfig;
pub use content::{ContentId, ContentRef, ContentSource, ImageContent, LayerDelegate};
pub use error::{BackendError, CompositorError, ConfigError, Result, UploadError};
pub use filter::{Filter, FilterContext, FilterId, FilterRef, ProgramIdentity};
pub use geometry::{Color, Mat4, PixelSize, Point, Rect, Size};
pub use layer::{Layer, LayerId, LayerTree};
pub use pool::{PoolStats, RenderTarget, RenderTargetPool};
pub use program_cache::{ProgramCache, ProgramCacheStats};
pub use shader::{LayerUniforms, ProgramSource, QuadVertex, VertexLayout};
pub use texture_cache::{TextureCache, TextureCacheStats, TextureLookup};
pub use timing::{GpuTimer, TimerStats, TimerTarget};
pub use visibility::{compute_visible_set, VisibleEntry, VisibleSet};
