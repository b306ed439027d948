//! GPU backend abstraction
//!
//! The compositor never talks to a device directly. Every operation receives
//! a `&mut dyn RenderBackend` and addresses GPU objects through the handles
//! defined here. `cameo_gpu` implements the trait on wgpu and
//! [`HeadlessBackend`](crate::headless::HeadlessBackend) records calls for
//! tests.

use std::borrow::Cow;

use slotmap::new_key_type;

use crate::error::{BackendError, UploadError};
use crate::geometry::{Color, PixelSize};
use crate::shader::{LayerUniforms, ProgramSource, QuadVertex};

new_key_type! {
    /// Sampled texture: uploaded contents or the color attachment of a target
    pub struct TextureId;
    /// Renderable target (framebuffer)
    pub struct TargetId;
    /// Compiled program
    pub struct ProgramId;
    /// GPU timer query
    pub struct QueryId;
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse GPU performance class, picked once per session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuTier {
    High,
    #[default]
    Low,
}

impl GpuTier {
    /// Classify a vendor/renderer string such as `"Apple M1 Pro"` or
    /// `"NVIDIA GeForce RTX 3060"`.
    pub fn from_renderer(renderer: &str) -> Self {
        let high = if renderer.contains("Apple") {
            renderer.contains("Apple M") || renderer == "Apple GPU"
        } else if renderer.contains("Intel") {
            renderer.contains("Iris")
        } else if renderer.contains("ATI") || renderer.contains("AMD") {
            false
        } else {
            renderer.contains("NVIDIA")
        };
        if high {
            GpuTier::High
        } else {
            GpuTier::Low
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, GpuTier::High)
    }
}

/// What the backend can do, fixed for the lifetime of the backend
#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub renderer: String,
    pub tier: GpuTier,
    /// Offscreen targets store rows bottom-up relative to the default target,
    /// so projections used to fill them must be flipped
    pub offscreen_y_flipped: bool,
    pub timer_queries: bool,
    pub max_texture_size: u32,
}

impl Capabilities {
    pub fn from_renderer(renderer: impl Into<String>) -> Self {
        let renderer = renderer.into();
        Self {
            tier: GpuTier::from_renderer(&renderer),
            renderer,
            offscreen_y_flipped: false,
            timer_queries: false,
            max_texture_size: 8192,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pixel Data
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, straight alpha
    Rgba8,
    /// 8-bit coverage, uploaded as white with this alpha
    Alpha8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Alpha8 => 1,
        }
    }
}

/// Pixels to upload into a texture
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData<'a> {
    pub size: PixelSize,
    pub format: PixelFormat,
    pub bytes: Cow<'a, [u8]>,
}

impl<'a> ImageData<'a> {
    pub fn rgba(size: PixelSize, bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            size,
            format: PixelFormat::Rgba8,
            bytes: bytes.into(),
        }
    }

    pub fn alpha(size: PixelSize, bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            size,
            format: PixelFormat::Alpha8,
            bytes: bytes.into(),
        }
    }

    /// 1x1 image of a single color
    pub fn solid(color: [u8; 4]) -> ImageData<'static> {
        ImageData::rgba(PixelSize::new(1, 1), color.to_vec())
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        let expected = self.size.area() as usize * self.format.bytes_per_pixel();
        if self.size.width == 0 || self.size.height == 0 {
            return Err(UploadError::InvalidData(format!(
                "zero-sized image {}x{}",
                self.size.width, self.size.height
            )));
        }
        if self.bytes.len() != expected {
            return Err(UploadError::InvalidData(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                self.size.width,
                self.size.height,
                self.bytes.len()
            )));
        }
        Ok(())
    }

    /// Expand to RGBA8, the only format backends store
    pub fn to_rgba(&self) -> Cow<'_, [u8]> {
        match self.format {
            PixelFormat::Rgba8 => Cow::Borrowed(&self.bytes),
            PixelFormat::Alpha8 => Cow::Owned(
                self.bytes
                    .iter()
                    .flat_map(|&a| [255, 255, 255, a])
                    .collect(),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Draw Calls
// ─────────────────────────────────────────────────────────────────────────────

/// Blend function used for a draw
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Overwrite the destination (ONE, ZERO); the first draw into a freshly
    /// pushed target
    Replace,
    /// Straight-alpha source-over
    #[default]
    SourceOver,
}

/// Vertex data for a draw
#[derive(Clone, Copy, Debug)]
pub enum Geometry<'a> {
    Quad(&'a [QuadVertex; 6]),
    /// (x, y, t) per instance, drawn with a [`VertexLayout::PointSprites`](crate::shader::VertexLayout) program
    PointSprites(&'a [[f32; 3]]),
}

/// One draw with the currently bound program
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    /// `None` draws into the default (output) target
    pub target: Option<TargetId>,
    pub blend: BlendMode,
    pub uniforms: LayerUniforms,
    pub geometry: Geometry<'a>,
    /// `None` binds a transparent placeholder
    pub texture: Option<TextureId>,
    pub mask: Option<TextureId>,
    /// Filter parameter block for `@group(1) @binding(0)`
    pub params: &'a [u8],
}

/// State of a timer query
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryStatus {
    Pending,
    /// Elapsed GPU time in nanoseconds
    Ready(u64),
    /// The measurement was invalidated and will never resolve
    Disjoint,
}

/// Backend handles of a freshly allocated render target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetHandles {
    pub target: TargetId,
    pub texture: TextureId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// GPU device used by the compositor
pub trait RenderBackend {
    fn capabilities(&self) -> &Capabilities;

    /// True while the device is lost; rendering is suppressed until the
    /// owner recreates the device and calls
    /// [`Compositor::context_restored`](crate::compositor::Compositor::context_restored)
    fn is_context_lost(&self) -> bool;

    /// Size of the default target in pixels
    fn output_size(&self) -> PixelSize;

    fn resize_output(&mut self, size: PixelSize);

    fn begin_frame(&mut self) {}

    /// Submit everything recorded since [`begin_frame`](Self::begin_frame)
    fn end_frame(&mut self) {}

    /// Create a texture cleared to transparent
    fn create_texture(&mut self, size: PixelSize, label: &str) -> Result<TextureId, BackendError>;

    /// Replace a texture's pixels, reallocating when the size changes
    fn upload_texture(&mut self, texture: TextureId, image: &ImageData<'_>) -> Result<(), BackendError>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_render_target(&mut self, size: PixelSize, alpha: bool) -> Result<TargetHandles, BackendError>;

    /// Destroy a target and its color texture
    fn destroy_render_target(&mut self, target: TargetId);

    fn clear(&mut self, target: Option<TargetId>, color: Color);

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, BackendError>;

    fn destroy_program(&mut self, program: ProgramId);

    /// Make `program` current for subsequent draws
    fn bind_program(&mut self, program: ProgramId);

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError>;

    /// Read back RGBA8 rows, top row first
    fn read_pixels(&mut self, target: Option<TargetId>) -> Result<Vec<u8>, BackendError>;

    /// Poll for an asynchronous device error raised since the last call
    fn take_error(&mut self) -> Option<BackendError> {
        None
    }

    /// Start a GPU timer; `None` when queries are unsupported
    fn begin_timer_query(&mut self) -> Option<QueryId> {
        None
    }

    fn end_timer_query(&mut self, _query: QueryId) {}

    fn timer_query_status(&mut self, _query: QueryId) -> QueryStatus {
        QueryStatus::Disjoint
    }

    fn delete_timer_query(&mut self, _query: QueryId) {}
}
