//! WGSL program layout shared by every filter.
//!
//! A program is one WGSL module assembled from three parts:
//!
//! - [`PRELUDE`]: the per-draw uniform block, the content texture, sampler
//!   and mask texture bindings, and the varyings struct
//! - a vertex stage, [`DEFAULT_VERTEX`] unless the filter brings its own
//! - the filter's fragment stage, which also declares the filter's parameter
//!   block at `@group(1) @binding(0)` when it has one
//!
//! Entry points are always `vs_main` and `fs_main`.

use std::borrow::Cow;

use crate::geometry::{Mat4, Rect};

/// Bindings and varyings visible to every stage
pub const PRELUDE: &str = r#"
struct LayerUniforms {
    projection: mat4x4<f32>,
    model: mat4x4<f32>,
    resolution: vec2<f32>,
    target_size: vec2<f32>,
    opacity: f32,
    time: f32,
    texcoord_from_position: u32,
    _padding: u32,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) texcoord: vec2<f32>,
    @location(1) layercoord: vec2<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: LayerUniforms;
@group(0) @binding(1) var content_texture: texture_2d<f32>;
@group(0) @binding(2) var content_sampler: sampler;
@group(0) @binding(3) var mask_texture: texture_2d<f32>;
"#;

/// Standard quad vertex stage
pub const DEFAULT_VERTEX: &str = r#"
struct QuadInput {
    @location(0) position: vec2<f32>,
    @location(1) texcoord: vec2<f32>,
    @location(2) layercoord: vec2<f32>,
}

@vertex
fn vs_main(input: QuadInput) -> VertexOutput {
    var out: VertexOutput;
    let clip = uniforms.projection * uniforms.model * vec4<f32>(input.position, 0.0, 1.0);
    out.position = clip;
    if uniforms.texcoord_from_position != 0u {
        out.texcoord = vec2<f32>(clip.x + 1.0, 1.0 - clip.y) * 0.5;
    } else {
        out.texcoord = input.texcoord;
    }
    out.layercoord = input.layercoord;
    return out;
}
"#;

/// Samples the contents and applies the draw opacity
pub const PASS_THROUGH_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let pix = textureSample(content_texture, content_sampler, input.texcoord);
    return vec4<f32>(pix.rgb, pix.a * uniforms.opacity);
}
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Program Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Vertex buffer layout a program's vertex stage consumes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Six [`QuadVertex`] per draw
    #[default]
    Quad,
    /// One `vec3<f32>` (x, y, t) per instance at location 0, six vertices per
    /// instance generated from the vertex index
    PointSprites,
}

/// Source pair of a filter program
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramSource {
    pub label: Cow<'static, str>,
    /// `None` selects [`DEFAULT_VERTEX`]
    pub vertex: Option<Cow<'static, str>>,
    pub fragment: Cow<'static, str>,
    pub layout: VertexLayout,
}

impl ProgramSource {
    pub fn fragment(label: impl Into<Cow<'static, str>>, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            vertex: None,
            fragment: fragment.into(),
            layout: VertexLayout::Quad,
        }
    }

    pub fn with_vertex(mut self, vertex: impl Into<Cow<'static, str>>, layout: VertexLayout) -> Self {
        self.vertex = Some(vertex.into());
        self.layout = layout;
        self
    }

    pub fn pass_through() -> Self {
        Self::fragment("pass-through", PASS_THROUGH_FRAGMENT)
    }

    /// Full WGSL module text handed to the backend compiler
    pub fn compose(&self) -> String {
        let vertex = self.vertex.as_deref().unwrap_or(DEFAULT_VERTEX);
        let mut module = String::with_capacity(PRELUDE.len() + vertex.len() + self.fragment.len());
        module.push_str(PRELUDE);
        module.push_str(vertex);
        module.push_str(&self.fragment);
        module
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GPU Data
// ─────────────────────────────────────────────────────────────────────────────

/// Per-draw uniform block
///
/// Layout matches `LayerUniforms` in [`PRELUDE`]:
/// - projection: `mat4x4<f32>` (64 bytes)
/// - model: `mat4x4<f32>` (64 bytes)
/// - resolution: `vec2<f32>` (8 bytes) - layer size in logical units
/// - target_size: `vec2<f32>` (8 bytes) - bound target in pixels
/// - opacity, time: f32 (8 bytes)
/// - texcoord_from_position, _padding: u32 (8 bytes)
///   Total: 160 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LayerUniforms {
    pub projection: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub resolution: [f32; 2],
    pub target_size: [f32; 2],
    pub opacity: f32,
    /// Seconds
    pub time: f32,
    pub texcoord_from_position: u32,
    pub _padding: u32,
}

impl LayerUniforms {
    pub fn new(projection: &Mat4, model: &Mat4, opacity: f32, time: f32) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            resolution: [0.0; 2],
            target_size: [0.0; 2],
            opacity,
            time,
            texcoord_from_position: 0,
            _padding: 0,
        }
    }
}

/// Quad vertex: layer-space position, content texture coordinate and
/// normalized position within the layer
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
    pub layercoord: [f32; 2],
}

/// Build the six vertices covering `frame`, sampling `content_rect`
pub fn quad_vertices(frame: &Rect, content_rect: &Rect) -> [QuadVertex; 6] {
    let positions = frame.quad_vertices();
    let texcoords = content_rect.quad_vertices();
    let layercoords = Rect::UNIT.quad_vertices();
    let mut out = [QuadVertex::default(); 6];
    for (i, vertex) in out.iter_mut().enumerate() {
        vertex.position = positions[i];
        vertex.texcoord = texcoords[i];
        vertex.layercoord = layercoords[i];
    }
    out
}
