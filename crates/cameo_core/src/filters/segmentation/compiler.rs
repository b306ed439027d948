//! Fragment source generation for the segmentation filter
//!
//! A configuration selects a set of [`Segment`]s. Each segment contributes an
//! independent helper block, and `fs_main` is assembled from the same
//! configuration so that only the selected helpers are referenced. Output is a
//! pure function of the configuration.

use std::f64::consts::PI;
use std::fmt::Write as _;

use super::config::{BackgroundStyle, PaintKind, SegmentationConfig, SegmentationMode, Shape};

/// Texel step between blur taps
const BLUR_STEP: u32 = 4;
const MAX_BLUR_SAMPLES: u32 = 64;

/// Independently toggled block of the generated source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Params,
    TextureBlur { samples: u32 },
    MaskEdgeBilateral,
    MaskEdgeSmoothstep,
    ChromaKey,
    PaintSolid,
    PaintLinearGradient,
    PaintRadialGradient,
    BackgroundFill,
    BackgroundTint,
    Enhancement,
    CircleMask,
    CornerRadiusMask,
    PolygonMask { sides: u32 },
}

/// Radius of a regular n-gon whose height is 2 when centered vertically on
/// its circumcircle, in the unit space the polygon mask works in. Even-sided
/// polygons are symmetric about the center and use 1.
pub fn ngon_radius(sides: u32) -> f64 {
    if sides % 2 == 0 {
        return 1.0;
    }
    let rads = PI / sides as f64;
    let s = rads.tan();
    let m = rads.sin();
    (2.0 / (1.0 / s + 1.0 / m)) / m
}

/// Segments the configuration selects, in emission order
pub fn segments(config: &SegmentationConfig) -> Vec<Segment> {
    let mut out = vec![Segment::Params];

    if config.shader_blur() {
        let samples = config.blur_radius.clamp(BLUR_STEP, MAX_BLUR_SAMPLES);
        out.push(Segment::TextureBlur { samples });
    }

    match config.mode {
        SegmentationMode::ExternalMask if config.tier.is_high() => out.push(Segment::MaskEdgeBilateral),
        SegmentationMode::ExternalMask => out.push(Segment::MaskEdgeSmoothstep),
        SegmentationMode::ChromaKey => out.push(Segment::ChromaKey),
        SegmentationMode::None | SegmentationMode::PassThrough => {}
    }

    if !config.alpha_only {
        if let Some(paint) = config.paint {
            out.push(match paint {
                PaintKind::Solid => Segment::PaintSolid,
                PaintKind::LinearGradient => Segment::PaintLinearGradient,
                PaintKind::RadialGradient => Segment::PaintRadialGradient,
            });
            out.push(if config.background == BackgroundStyle::Hide {
                Segment::BackgroundFill
            } else {
                Segment::BackgroundTint
            });
        }
    }

    if config.enhance {
        out.push(Segment::Enhancement);
    }

    match config.shape {
        Shape::Circle => out.push(Segment::CircleMask),
        Shape::Polygon => out.push(Segment::PolygonMask {
            sides: config.polygon_sides(),
        }),
        Shape::Rectangle if config.rounded_corners => out.push(Segment::CornerRadiusMask),
        Shape::Rectangle => {}
    }

    out
}

/// Generate the complete fragment source for `config`
pub fn generate(config: &SegmentationConfig) -> String {
    let segments = segments(config);
    let mut source = String::with_capacity(8 * 1024);
    for segment in &segments {
        emit_segment(&mut source, *segment);
    }
    emit_main(&mut source, config, &segments);
    source
}

fn emit_segment(source: &mut String, segment: Segment) {
    match segment {
        Segment::Params => source.push_str(PARAMS),
        Segment::TextureBlur { samples } => {
            let side = samples / BLUR_STEP;
            let _ = writeln!(source);
            let _ = writeln!(source, "const BLUR_SAMPLES: f32 = {:.1};", samples as f32);
            let _ = writeln!(source, "const BLUR_SIDE: i32 = {};", side);
            let _ = writeln!(source, "const BLUR_TAPS: i32 = {};", side * side);
            let _ = writeln!(source, "const BLUR_STEP: f32 = {:.1};", BLUR_STEP as f32);
            let _ = writeln!(source, "const BLUR_SIGMA: f32 = {:.2};", samples as f32 * 0.25);
            source.push_str(TEXTURE_BLUR);
        }
        Segment::MaskEdgeBilateral => {
            source.push_str(JOINT_BILATERAL);
            source.push_str(MASK_EDGE_BILATERAL);
        }
        Segment::MaskEdgeSmoothstep => source.push_str(MASK_EDGE_SMOOTHSTEP),
        Segment::ChromaKey => source.push_str(CHROMA_KEY),
        Segment::PaintSolid => source.push_str(PAINT_SOLID),
        Segment::PaintLinearGradient => source.push_str(PAINT_LINEAR),
        Segment::PaintRadialGradient => source.push_str(PAINT_RADIAL),
        Segment::BackgroundFill => source.push_str(BACKGROUND_FILL),
        Segment::BackgroundTint => source.push_str(BACKGROUND_TINT),
        Segment::Enhancement => source.push_str(ENHANCEMENT),
        Segment::CircleMask => source.push_str(CIRCLE_MASK),
        Segment::CornerRadiusMask => source.push_str(CORNER_RADIUS_MASK),
        Segment::PolygonMask { sides } => {
            let _ = writeln!(source);
            let _ = writeln!(source, "const NGON_SIDES: f32 = {:.1};", sides as f32);
            let _ = writeln!(source, "const NGON_RADIUS: f32 = {:.5};", ngon_radius(sides));
            source.push_str(POLYGON_MASK);
        }
    }
}

fn paint_call(segments: &[Segment]) -> Option<&'static str> {
    segments.iter().find_map(|segment| match segment {
        Segment::PaintSolid => Some("paint_solid(coord)"),
        Segment::PaintLinearGradient => Some("paint_linear_gradient(coord)"),
        Segment::PaintRadialGradient => Some("paint_radial_gradient(coord)"),
        _ => None,
    })
}

fn shape_call(segments: &[Segment]) -> Option<&'static str> {
    segments.iter().find_map(|segment| match segment {
        Segment::CircleMask => Some("color = circle_mask(color, coord);"),
        Segment::PolygonMask { .. } => Some("color = polygon_mask(color, coord);"),
        Segment::CornerRadiusMask => Some("color = corner_radius_mask(color, coord);"),
        _ => None,
    })
}

fn emit_main(source: &mut String, config: &SegmentationConfig, segments: &[Segment]) {
    let mut body = Body::default();
    body.line("let coord = input.texcoord;");
    body.line("let base = textureSampleLevel(content_texture, content_sampler, coord, 0.0);");
    body.line("var color = vec4<f32>(base.rgb, 1.0);");

    match config.mode {
        SegmentationMode::PassThrough => body.line("color.a = base.a;"),
        SegmentationMode::ExternalMask => body.line("color.a = mask_edge_alpha(color.rgb, coord);"),
        SegmentationMode::ChromaKey => body.line("color = chroma_key(color);"),
        SegmentationMode::None => {}
    }

    let shape = shape_call(segments);

    if config.alpha_only {
        body.line("let mask_alpha = color.a;");
        if config.enhance {
            body.line("color = enhancement(color, coord);");
        }
        match shape {
            Some(call) => body.line(call),
            None => body.line("color.a = mask_alpha;"),
        }
        // Never fully transparent so downstream filters keep every pixel
        body.line("color.a = max(color.a * uniforms.opacity, 0.01);");
        body.line("return color;");
        return body.finish(source);
    }

    if config.preserve_mask_in_alpha {
        body.line("let saved_mask = color.a;");
    }

    let segmented = config.mode != SegmentationMode::None;
    if segmented {
        body.line("let inverse_a = clamp(1.0 - color.a, 0.0, 1.0);");
        body.line("var bg = vec4<f32>(color.rgb, inverse_a);");
    } else {
        body.line("var bg = color;");
    }
    body.line("var fg = color;");

    match config.background {
        BackgroundStyle::Show => body.line("bg.a = 1.0;"),
        BackgroundStyle::Hide => body.line("bg.a = 0.0;"),
        BackgroundStyle::Blur => {
            body.line("bg.a = 1.0;");
            if config.shader_blur() {
                body.line("bg = texture_blur(coord);");
            }
        }
    }

    if config.enhance {
        if segmented {
            body.line("fg = enhancement(fg, coord);");
        } else {
            body.line("bg = enhancement(bg, coord);");
        }
    }

    if let Some(paint) = paint_call(segments) {
        body.line(&format!("let paint = {};", paint));
        if config.background == BackgroundStyle::Hide {
            body.line("bg = background_fill(bg, paint);");
        } else {
            body.line("bg = background_tint(bg, paint);");
        }
    }

    if segmented {
        body.line("color = mix(fg, bg, vec4<f32>(inverse_a));");
        match (config.background, config.preserve_mask_in_alpha) {
            (_, true) => body.line("color.a = saved_mask;"),
            (BackgroundStyle::Hide, false) => {}
            (_, false) => body.line("color.a = 1.0;"),
        }
    } else {
        body.line("color = bg;");
    }

    if let Some(call) = shape {
        body.line(call);
    }

    body.line("color.a *= uniforms.opacity;");
    if !config.preserve_mask_in_alpha {
        body.line("if color.a == 0.0 {");
        body.line("    discard;");
        body.line("}");
    }
    body.line("return color;");
    body.finish(source);
}

#[derive(Default)]
struct Body {
    lines: Vec<String>,
}

impl Body {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn finish(self, source: &mut String) {
        source.push_str("\n@fragment\nfn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {\n");
        for line in self.lines {
            source.push_str("    ");
            source.push_str(&line);
            source.push('\n');
        }
        source.push_str("}\n");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Blocks
// ─────────────────────────────────────────────────────────────────────────────

const PARAMS: &str = r#"
struct SegmentationParams {
    chroma_color: vec4<f32>,
    // xy: smoothstep range over chroma distance
    chroma_range: vec4<f32>,
    // xy: mask texel step for edge refinement
    pixel_size: vec4<f32>,
    color: vec4<f32>,
    start_color: vec4<f32>,
    stop_color: vec4<f32>,
    // xy: gradient start, zw: gradient stop
    points: vec4<f32>,
    // x: corner radius, y: enhancement intensity, z: enhancement brightness
    misc: vec4<f32>,
}

@group(1) @binding(0) var<uniform> params: SegmentationParams;
"#;

const TEXTURE_BLUR: &str = r#"
fn blur_gaussian(offset: vec2<f32>) -> f32 {
    let v = offset / BLUR_SIGMA;
    return exp(-0.5 * dot(v, v)) / (6.28 * BLUR_SIGMA * BLUR_SIGMA);
}

fn texture_blur(coord: vec2<f32>) -> vec4<f32> {
    var acc = vec4<f32>(0.0);
    let scale = 1.0 / max(uniforms.resolution, vec2<f32>(1.0));
    for (var i = 0; i < BLUR_TAPS; i++) {
        let cell = vec2<f32>(f32(i - (i / BLUR_SIDE) * BLUR_SIDE), f32(i / BLUR_SIDE));
        let d = cell * BLUR_STEP - vec2<f32>(BLUR_SAMPLES * 0.5);
        let tap = textureSampleLevel(content_texture, content_sampler, coord + scale * d, 2.0).rgb;
        acc += blur_gaussian(d) * vec4<f32>(tap, 1.0);
    }
    return acc / acc.a;
}
"#;

const JOINT_BILATERAL: &str = r#"
const JBF_STEP_RANGE: i32 = 3;
const JBF_SPREAD: f32 = 0.618;
const JBF_BALANCE: f32 = 0.057;
const JBF_COLOUR_WEIGHT: f32 = 0.539;
const JBF_PRED_SCALING: f32 = 2.84;

fn jbf_gaussian(x: f32, sigma: f32) -> f32 {
    let coeff = -0.5 / (sigma * sigma * 4.0 + 1.0e-6);
    return exp((x * x) * coeff);
}

fn jbf_prediction_weight(pred: f32) -> f32 {
    let centered = pred - 0.5;
    return min(1.0, JBF_PRED_SCALING * centered * centered + 0.1);
}

fn joint_bilateral_alpha(p: vec2<f32>, rgb: vec3<f32>) -> f32 {
    let pixel_size = params.pixel_size.xy;
    var alpha_sum = 0.0;
    var weight_sum = 0.0;
    for (var y = -JBF_STEP_RANGE; y <= JBF_STEP_RANGE; y++) {
        let fy = f32(y);
        for (var x = -JBF_STEP_RANGE; x <= JBF_STEP_RANGE; x++) {
            let fx = f32(x);
            let tap = p + pixel_size * vec2<f32>(fx, fy);
            let tap_mask = textureSampleLevel(mask_texture, content_sampler, tap, 0.0).a;
            let tap_rgb = textureSampleLevel(content_texture, content_sampler, tap, 0.0).rgb;
            let space_weight = jbf_gaussian(sqrt(fx * fx + fy * fy), JBF_SPREAD);
            let color_weight = jbf_gaussian(distance(rgb, tap_rgb), JBF_BALANCE);
            let weight = ((1.0 - JBF_COLOUR_WEIGHT) * space_weight + JBF_COLOUR_WEIGHT * color_weight)
                * jbf_prediction_weight(tap_mask);
            alpha_sum += tap_mask * weight;
            weight_sum += weight;
        }
    }
    return clamp(alpha_sum / max(weight_sum, 1.0e-6), 0.0, 1.0);
}
"#;

const MASK_EDGE_BILATERAL: &str = r#"
fn mask_edge_alpha(rgb: vec3<f32>, coord: vec2<f32>) -> f32 {
    var mask = textureSampleLevel(mask_texture, content_sampler, coord, 0.0).a;
    if mask >= 0.05 && mask <= 0.95 {
        mask = joint_bilateral_alpha(coord, rgb);
    }
    return smoothstep(0.1665, 1.0 - 0.1665, mask);
}
"#;

const MASK_EDGE_SMOOTHSTEP: &str = r#"
fn mask_edge_alpha(rgb: vec3<f32>, coord: vec2<f32>) -> f32 {
    let mask = textureSampleLevel(mask_texture, content_sampler, coord, 0.0).a;
    return smoothstep(0.2, 0.8, mask);
}
"#;

const CHROMA_KEY: &str = r#"
fn rgb_to_cc(rgb: vec3<f32>) -> vec2<f32> {
    let y = 0.2989 * rgb.r + 0.5866 * rgb.g + 0.1145 * rgb.b;
    return vec2<f32>((rgb.b - y) * 0.5647, (rgb.r - y) * 0.7132);
}

fn ycc_to_rgb(y: f32, cb: f32, cr: f32) -> vec3<f32> {
    return vec3<f32>(y + 1.40213 * cr, y - 0.34565 * cb - 0.71445 * cr, y + 1.77085 * cb);
}

fn chroma_key(color: vec4<f32>) -> vec4<f32> {
    var keyed = color;
    let cc = rgb_to_cc(color.rgb);
    let key_cc = rgb_to_cc(params.chroma_color.rgb);
    let range = params.chroma_range.xy;
    let dist_val = distance(key_cc, cc);
    let mask = smoothstep(range.x, range.y, dist_val);
    if mask > 0.0 && mask < 1.0 {
        let y = 0.2989 * color.r + 0.5866 * color.g + 0.1145 * color.b;
        let degreen = clamp(dist_val / range.y, 0.0, 1.0);
        let shifted = key_cc + (cc - key_cc) / (degreen + 0.0001);
        keyed = vec4<f32>(ycc_to_rgb(y, shifted.x, shifted.y) * mask, keyed.a);
    }
    keyed.a = clamp(mask, 0.0, 1.0);
    return keyed;
}
"#;

const PAINT_SOLID: &str = r#"
fn paint_solid(coord: vec2<f32>) -> vec4<f32> {
    return params.color;
}
"#;

const PAINT_LINEAR: &str = r#"
fn paint_linear_gradient(coord: vec2<f32>) -> vec4<f32> {
    let a = params.points.xy;
    let ba = params.points.zw - a;
    let t = clamp(dot(coord - a, ba) / max(dot(ba, ba), 1.0e-6), 0.0, 1.0);
    return mix(params.start_color, params.stop_color, vec4<f32>(smoothstep(0.0, 1.0, t)));
}
"#;

const PAINT_RADIAL: &str = r#"
fn paint_radial_gradient(coord: vec2<f32>) -> vec4<f32> {
    let d = distance(coord, vec2<f32>(0.5)) / sqrt(0.5);
    return mix(params.start_color, params.stop_color, vec4<f32>(clamp(d, 0.0, 1.0)));
}
"#;

const BACKGROUND_FILL: &str = r#"
fn background_fill(color: vec4<f32>, fill: vec4<f32>) -> vec4<f32> {
    return mix(color, fill, vec4<f32>(1.0 - color.a));
}
"#;

const BACKGROUND_TINT: &str = r#"
fn background_tint(color: vec4<f32>, tint: vec4<f32>) -> vec4<f32> {
    let grayscale = color.r * 0.21 + color.g * 0.72 + color.b * 0.07;
    let power = ((tint.r + tint.g + tint.b) * 0.3333 - tint.rgb) * 2.0;
    return vec4<f32>(pow(vec3<f32>(grayscale), vec3<f32>(1.0) + power), color.a);
}
"#;

const ENHANCEMENT: &str = r#"
fn enhancement(color: vec4<f32>, coord: vec2<f32>) -> vec4<f32> {
    var col = color.rgb;
    let med = textureSampleLevel(content_texture, content_sampler, coord, 2.0).rgb;
    let isskin = clamp(color.a * (col.r - max(col.g, col.b)) * 5.0, 0.0, 1.0);
    let intensity = params.misc.y;
    let brightness = params.misc.z;
    col = mix(col, med, vec3<f32>(isskin * intensity * 2.0));
    let gre = dot(col, vec3<f32>(0.333));
    col *= mix(0.8 + 0.4 * brightness, 2.2 / (1.0 + gre), brightness);
    col = mix(col, vec3<f32>(gre), vec3<f32>(intensity * 0.2));
    let vignette = max(16.0 * coord.x * (1.0 - coord.x) * coord.y * (1.0 - coord.y), 0.0);
    col *= 0.5 + 0.5 * pow(vignette, 0.15);
    return vec4<f32>(col, color.a);
}
"#;

const CIRCLE_MASK: &str = r#"
fn circle_mask(color: vec4<f32>, coord: vec2<f32>) -> vec4<f32> {
    let res = uniforms.resolution;
    let p = (2.0 * coord * res - res) / res.y;
    let alpha = (1.0 - length(p)) / 0.008;
    return vec4<f32>(color.rgb, color.a * clamp(alpha, 0.0, 1.0));
}
"#;

const CORNER_RADIUS_MASK: &str = r#"
fn sd_rounded_box(p: vec2<f32>, b: vec2<f32>, r: vec4<f32>) -> f32 {
    let side = select(r.zw, r.xy, p.x > 0.0);
    let radius = select(side.y, side.x, p.y > 0.0);
    let q = abs(p) - b + vec2<f32>(radius);
    return min(max(q.x, q.y), 0.0) + length(max(q, vec2<f32>(0.0))) - radius;
}

fn corner_radius_mask(color: vec4<f32>, coord: vec2<f32>) -> vec4<f32> {
    let res = uniforms.resolution;
    let p = (2.0 * coord * res - res) / res.y;
    let si = vec2<f32>(res.x / res.y, 1.0);
    let ra = min(vec4<f32>(params.misc.x), vec4<f32>(min(si.x, si.y)));
    let d = sd_rounded_box(p, si, ra);
    let alpha = 1.0 - smoothstep(0.0, 0.01, clamp(d, 0.0, 1.0));
    return vec4<f32>(color.rgb, color.a * alpha);
}
"#;

const POLYGON_MASK: &str = r#"
fn sd_regular_ngon(point: vec2<f32>, r: f32) -> f32 {
    let an = 3.141593 / NGON_SIDES;
    let acs = vec2<f32>(cos(an), sin(an));
    let period = 2.0 * an;
    let angle = atan2(point.x, point.y);
    let bn = angle - period * floor(angle / period) - an;
    var p = length(point) * vec2<f32>(cos(bn), abs(sin(bn)));
    p -= r * acs;
    p.y += clamp(-p.y, 0.0, r * acs.y);
    return length(p) * sign(p.x);
}

fn polygon_mask(color: vec4<f32>, coord: vec2<f32>) -> vec4<f32> {
    let res = uniforms.resolution;
    var p = (2.0 * coord * res - res) / res.y;
    let rounding = 0.1;
    let radius = NGON_RADIUS - (NGON_RADIUS - 1.0) * 0.1;
    p.y -= radius - 1.0;
    p.y = -p.y;
    let d = sd_regular_ngon(p, radius - rounding) - rounding;
    if d >= 0.0 {
        return vec4<f32>(color.rgb, 0.0);
    }
    return color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuTier;

    // ─────────────────────────────────────────────────────────────────────────
    // Polygon Radius Tests
    // ─────────────────────────────────────────────────────────────────────────

    fn reference_radius(n: u32) -> f64 {
        let a = PI / n as f64;
        let cot = 1.0 / a.tan();
        let csc = 1.0 / a.sin();
        (2.0 / (cot + csc)) / a.sin()
    }

    #[test]
    fn test_ngon_radius_even_sides_is_one() {
        for n in [4, 6, 8, 10] {
            assert_eq!(ngon_radius(n), 1.0);
        }
    }

    #[test]
    fn test_ngon_radius_odd_sides() {
        for n in [3, 5, 7, 9] {
            assert!((ngon_radius(n) - reference_radius(n)).abs() < 1e-6);
        }
        // Triangle standing on its base: apex to base is 1.5 r
        assert!((ngon_radius(3) * 1.5 - 2.0).abs() < 1e-6);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Segment Selection Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_blur_requires_shader_blur() {
        let mut config = SegmentationConfig {
            background: BackgroundStyle::Blur,
            blur_radius: 16,
            ..Default::default()
        };
        assert!(segments(&config).contains(&Segment::TextureBlur { samples: 16 }));

        config.native_blur = true;
        assert!(!segments(&config)
            .iter()
            .any(|s| matches!(s, Segment::TextureBlur { .. })));
    }

    #[test]
    fn test_mask_edge_depends_on_tier() {
        let mut config = SegmentationConfig {
            mode: SegmentationMode::ExternalMask,
            tier: GpuTier::High,
            ..Default::default()
        };
        assert!(segments(&config).contains(&Segment::MaskEdgeBilateral));
        config.tier = GpuTier::Low;
        let low = segments(&config);
        assert!(low.contains(&Segment::MaskEdgeSmoothstep));
        assert!(!low.contains(&Segment::MaskEdgeBilateral));
    }

    #[test]
    fn test_corner_radius_only_for_rectangles() {
        let mut config = SegmentationConfig {
            rounded_corners: true,
            ..Default::default()
        };
        assert!(segments(&config).contains(&Segment::CornerRadiusMask));
        config.shape = Shape::Circle;
        let circle = segments(&config);
        assert!(circle.contains(&Segment::CircleMask));
        assert!(!circle.contains(&Segment::CornerRadiusMask));
    }

    #[test]
    fn test_polygon_sides_clamped() {
        let config = SegmentationConfig {
            shape: Shape::Polygon,
            polygon_sides: 42,
            ..Default::default()
        };
        assert!(segments(&config).contains(&Segment::PolygonMask { sides: 10 }));
    }

    #[test]
    fn test_paint_fill_vs_tint() {
        let mut config = SegmentationConfig {
            mode: SegmentationMode::ChromaKey,
            background: BackgroundStyle::Hide,
            paint: Some(PaintKind::RadialGradient),
            ..Default::default()
        };
        let hide = segments(&config);
        assert!(hide.contains(&Segment::PaintRadialGradient));
        assert!(hide.contains(&Segment::BackgroundFill));

        config.background = BackgroundStyle::Show;
        assert!(segments(&config).contains(&Segment::BackgroundTint));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Generation Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_generation_is_deterministic() {
        let config = SegmentationConfig {
            mode: SegmentationMode::ExternalMask,
            background: BackgroundStyle::Blur,
            blur_radius: 16,
            shape: Shape::Polygon,
            polygon_sides: 5,
            paint: Some(PaintKind::LinearGradient),
            enhance: true,
            tier: GpuTier::High,
            ..Default::default()
        };
        assert_eq!(generate(&config), generate(&config));
    }

    #[test]
    fn test_polygon_sides_change_source() {
        let five = SegmentationConfig {
            shape: Shape::Polygon,
            polygon_sides: 5,
            ..Default::default()
        };
        let six = SegmentationConfig {
            polygon_sides: 6,
            ..five
        };
        let five_src = generate(&five);
        assert_ne!(five_src, generate(&six));
        assert!(five_src.contains("const NGON_SIDES: f32 = 5.0;"));
        assert!(five_src.contains(&format!("const NGON_RADIUS: f32 = {:.5};", ngon_radius(5))));
    }

    #[test]
    fn test_unselected_helpers_are_absent() {
        let source = generate(&SegmentationConfig::default());
        assert!(!source.contains("fn chroma_key"));
        assert!(!source.contains("fn mask_edge_alpha"));
        assert!(!source.contains("fn texture_blur"));
        assert!(source.contains("color = bg;"));
        assert!(source.contains("discard;"));
    }

    #[test]
    fn test_preserve_mask_never_discards() {
        let config = SegmentationConfig {
            mode: SegmentationMode::PassThrough,
            background: BackgroundStyle::Hide,
            preserve_mask_in_alpha: true,
            ..Default::default()
        };
        let source = generate(&config);
        assert!(source.contains("let saved_mask = color.a;"));
        assert!(source.contains("color.a = saved_mask;"));
        assert!(!source.contains("discard;"));
    }

    #[test]
    fn test_alpha_only_keeps_alpha_floor() {
        let config = SegmentationConfig {
            mode: SegmentationMode::ExternalMask,
            alpha_only: true,
            paint: Some(PaintKind::Solid),
            ..Default::default()
        };
        let source = generate(&config);
        assert!(source.contains("max(color.a * uniforms.opacity, 0.01)"));
        assert!(!source.contains("fn paint_solid"));
    }
}
