use std::collections::VecDeque;

use crate::backend::Capabilities;
use crate::filter::{Filter, FilterContext};
use crate::geometry::{Color, Point};
use crate::shader::{ProgramSource, VertexLayout};

const TRAIL_VERTEX: &str = r#"
struct TrailInstance {
    @location(0) point: vec3<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32, instance: TrailInstance) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vertex_index % 6u];
    let decay = 1.0 - (params.timing.x - instance.point.z) / params.timing.y;
    let center = uniforms.projection * uniforms.model * vec4<f32>(instance.point.xy, 0.0, 1.0);
    let extent = params.timing.z * max(decay, 0.0) / max(uniforms.target_size, vec2<f32>(1.0));

    var out: VertexOutput;
    out.position = vec4<f32>(center.xy + corner * extent * center.w, center.zw);
    out.texcoord = corner * 0.5 + vec2<f32>(0.5);
    out.layercoord = vec2<f32>(decay, 0.0);
    return out;
}
"#;

const TRAIL_FRAGMENT: &str = r#"
struct TrailParams {
    color: vec4<f32>,
    // x: now, y: duration, z: sprite size in pixels (seconds for x and y)
    timing: vec4<f32>,
}

@group(1) @binding(0) var<uniform> params: TrailParams;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let uv = input.texcoord * 2.0 - vec2<f32>(1.0);
    if length(uv) > 1.0 {
        discard;
    }
    return vec4<f32>(params.color.rgb, input.layercoord.x * uniforms.opacity);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct TrailParams {
    color: [f32; 4],
    timing: [f32; 4],
}

/// Fading point trail drawn as instanced round sprites
///
/// Points are stamped with the filter's own clock, which advances by one
/// frame interval per [`tick`](Self::tick), and fade out over `duration`
/// seconds. The filter replaces the layer's quad with its own geometry.
#[derive(Debug)]
pub struct TrailFilter {
    points: VecDeque<[f32; 3]>,
    capacity: usize,
    duration: f32,
    color: Color,
    point_size: f32,
    timestamp: f32,
    frame_interval: f32,
}

impl TrailFilter {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self {
            points: VecDeque::new(),
            capacity: Self::DEFAULT_CAPACITY,
            duration: 1.0,
            color: Color::from_hex(0x174EE5),
            point_size: 20.0,
            timestamp: 0.0,
            frame_interval: 1.0 / 30.0,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn set_duration(&mut self, seconds: f32) {
        self.duration = seconds.max(f32::EPSILON);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Advance the clock by one frame
    pub fn tick(&mut self) {
        self.timestamp += self.frame_interval;
    }

    /// Append points at the current time, evicting the oldest past capacity
    pub fn add_points(&mut self, points: &[Point]) {
        for point in points {
            if self.points.len() == self.capacity {
                self.points.pop_front();
            }
            self.points.push_back([point.x, point.y, self.timestamp]);
        }
    }

    /// Drop points older than the fade duration
    pub fn remove_expired_points(&mut self) {
        while let Some(oldest) = self.points.front() {
            if self.timestamp - oldest[2] > self.duration {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for TrailFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for TrailFilter {
    fn label(&self) -> &str {
        "trail"
    }

    fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
        ProgramSource::fragment("trail", TRAIL_FRAGMENT)
            .with_vertex(TRAIL_VERTEX, VertexLayout::PointSprites)
    }

    fn modifies_contents(&self) -> bool {
        true
    }

    fn prepare(&mut self, cx: &mut FilterContext<'_>) {
        if self.points.is_empty() {
            cx.skip_draw();
            return;
        }
        cx.set_params(&TrailParams {
            color: self.color.to_array(),
            timing: [self.timestamp, self.duration, self.point_size, 0.0],
        });
        cx.draw_point_sprites(self.points.iter().copied().collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut trail = TrailFilter::new().with_capacity(3);
        trail.add_points(&[Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        trail.tick();
        trail.add_points(&[Point::new(2.0, 0.0), Point::new(3.0, 0.0)]);
        assert_eq!(trail.len(), 3);
        assert_eq!(trail.points.front().map(|p| p[0]), Some(1.0));
    }

    #[test]
    fn test_expired_points_removed_in_order() {
        let mut trail = TrailFilter::new();
        trail.add_points(&[Point::new(0.0, 0.0)]);
        for _ in 0..15 {
            trail.tick();
        }
        trail.add_points(&[Point::new(1.0, 1.0)]);
        for _ in 0..20 {
            trail.tick();
        }
        trail.remove_expired_points();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.points.front().map(|p| p[0]), Some(1.0));
    }
}
