use crate::backend::Capabilities;
use crate::filter::{Filter, FilterContext};
use crate::shader::ProgramSource;

const ROUND_RECT_FRAGMENT: &str = r#"
struct RoundRectParams {
    // x: corner radius as a fraction of half the shorter side
    radius: vec4<f32>,
}

@group(1) @binding(0) var<uniform> params: RoundRectParams;

fn rounded_box_distance(p: vec2<f32>, half_size: vec2<f32>, r: f32) -> f32 {
    let q = abs(p) - half_size + vec2<f32>(r);
    return min(max(q.x, q.y), 0.0) + length(max(q, vec2<f32>(0.0))) - r;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let pix = textureSample(content_texture, content_sampler, input.texcoord);
    let size = uniforms.resolution;
    let p = (input.layercoord - vec2<f32>(0.5)) * size;
    let r = params.radius.x * min(size.x, size.y) * 0.5;
    let d = rounded_box_distance(p, size * 0.5, r);
    let coverage = 1.0 - smoothstep(-1.0, 0.0, d);
    return vec4<f32>(pix.rgb, pix.a * coverage * uniforms.opacity);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RoundRectParams {
    radius: [f32; 4],
}

/// Clips a layer to a rounded rectangle
///
/// Installed by [`Layer::set_corner_radius`](crate::layer::Layer::set_corner_radius).
#[derive(Debug)]
pub struct RoundRectFilter {
    corner_radius: f32,
}

impl RoundRectFilter {
    pub fn new(corner_radius: f32) -> Self {
        Self {
            corner_radius: corner_radius.clamp(0.0, 1.0),
        }
    }

    pub fn corner_radius(&self) -> f32 {
        self.corner_radius
    }

    pub fn set_corner_radius(&mut self, corner_radius: f32) {
        self.corner_radius = corner_radius.clamp(0.0, 1.0);
    }
}

impl Filter for RoundRectFilter {
    fn label(&self) -> &str {
        "round-rect"
    }

    fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
        ProgramSource::fragment("round-rect", ROUND_RECT_FRAGMENT)
    }

    fn modifies_contents(&self) -> bool {
        true
    }

    fn prepare(&mut self, cx: &mut FilterContext<'_>) {
        cx.set_params(&RoundRectParams {
            radius: [self.corner_radius, 0.0, 0.0, 0.0],
        });
    }
}
