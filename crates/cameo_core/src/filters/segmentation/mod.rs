//! Background segmentation, replacement and shape masking in one pass
//!
//! The filter generates a fragment program specialized to its current
//! configuration (see [`compiler`]) and shares compiled programs with every
//! other instance that produces the same source.

pub mod compiler;
mod config;

pub use config::{
    BackgroundStyle, PaintKind, SegmentationConfig, SegmentationMode, Shape, MAX_POLYGON_SIDES,
    MIN_POLYGON_SIDES,
};

use crate::backend::Capabilities;
use crate::content::ContentRef;
use crate::filter::{Filter, FilterContext, ProgramIdentity};
use crate::geometry::{Color, Point};
use crate::shader::ProgramSource;

/// Mask texel step used by the edge refinement kernel
const MASK_PIXEL_SIZE: [f32; 2] = [1.0 / 640.0, 1.0 / 352.0];
const DEFAULT_CHROMA_COLOR: [f32; 3] = [1.0, 0.0, 1.0];
const DEFAULT_CHROMA_RANGE: [f32; 2] = [0.4, 0.5];
const ENHANCEMENT_BRIGHTNESS: f32 = 0.5;

/// Fill or tint applied to the background
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Paint {
    Solid(Color),
    LinearGradient {
        start: Color,
        stop: Color,
        start_point: Point,
        stop_point: Point,
    },
    RadialGradient {
        start: Color,
        stop: Color,
    },
}

impl Paint {
    pub fn kind(&self) -> PaintKind {
        match self {
            Paint::Solid(_) => PaintKind::Solid,
            Paint::LinearGradient { .. } => PaintKind::LinearGradient,
            Paint::RadialGradient { .. } => PaintKind::RadialGradient,
        }
    }
}

/// Out-of-range components zero the whole value
fn sanitize<const N: usize>(values: [f32; N]) -> [f32; N] {
    if values.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)) {
        values
    } else {
        [0.0; N]
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct SegmentationParams {
    chroma_color: [f32; 4],
    chroma_range: [f32; 4],
    pixel_size: [f32; 4],
    color: [f32; 4],
    start_color: [f32; 4],
    stop_color: [f32; 4],
    points: [f32; 4],
    misc: [f32; 4],
}

#[derive(Debug)]
pub struct SegmentationFilter {
    mode: SegmentationMode,
    background: BackgroundStyle,
    shape: Shape,
    polygon_sides: u32,
    corner_radius: f32,
    blur_radius: u32,
    native_blur: bool,
    paint: Option<Paint>,
    enhancement: f32,
    alpha_only: bool,
    preserve_mask_in_alpha: bool,
    chroma_color: [f32; 3],
    chroma_range: [f32; 2],
    mask: Option<ContentRef>,
    mask_needs_update: bool,
    enabled: bool,
    generated: Option<(SegmentationConfig, ProgramSource)>,
}

impl Default for SegmentationFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationFilter {
    pub fn new() -> Self {
        Self {
            mode: SegmentationMode::None,
            background: BackgroundStyle::Show,
            shape: Shape::Rectangle,
            polygon_sides: MIN_POLYGON_SIDES,
            corner_radius: 0.0,
            blur_radius: 0,
            native_blur: false,
            paint: None,
            enhancement: 0.0,
            alpha_only: false,
            preserve_mask_in_alpha: false,
            chroma_color: DEFAULT_CHROMA_COLOR,
            chroma_range: DEFAULT_CHROMA_RANGE,
            mask: None,
            mask_needs_update: false,
            enabled: true,
            generated: None,
        }
    }

    pub fn set_mode(&mut self, mode: SegmentationMode) {
        self.mode = mode;
    }

    pub fn set_background(&mut self, background: BackgroundStyle) {
        self.background = background;
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub fn set_polygon_sides(&mut self, sides: u32) {
        self.polygon_sides = sides.clamp(MIN_POLYGON_SIDES, MAX_POLYGON_SIDES);
    }

    pub fn polygon_sides(&self) -> u32 {
        self.polygon_sides
    }

    pub fn set_corner_radius(&mut self, radius: f32) {
        self.corner_radius = radius.clamp(0.0, 1.0);
    }

    pub fn corner_radius(&self) -> f32 {
        self.corner_radius
    }

    pub fn set_blur_radius(&mut self, radius: u32) {
        self.blur_radius = radius;
    }

    pub fn set_native_blur(&mut self, native: bool) {
        self.native_blur = native;
    }

    pub fn set_paint(&mut self, paint: Option<Paint>) {
        self.paint = paint;
    }

    pub fn set_enhancement(&mut self, enhancement: f32) {
        self.enhancement = enhancement.clamp(0.0, 1.0);
    }

    pub fn enhancement(&self) -> f32 {
        self.enhancement
    }

    pub fn set_alpha_only(&mut self, alpha_only: bool) {
        self.alpha_only = alpha_only;
    }

    pub fn set_preserve_mask_in_alpha(&mut self, preserve: bool) {
        self.preserve_mask_in_alpha = preserve;
    }

    pub fn set_chroma_key(&mut self, color: [f32; 3], range: [f32; 2]) {
        self.chroma_color = color;
        self.chroma_range = range;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Segmentation mask for [`SegmentationMode::ExternalMask`]
    pub fn set_mask(&mut self, mask: Option<ContentRef>) {
        self.mask = mask;
        self.mask_needs_update = true;
    }

    /// The mask source has new pixels
    pub fn mark_mask_dirty(&mut self) {
        self.mask_needs_update = true;
    }

    /// Source-affecting state for a device of the given tier
    pub fn config(&self, caps: &Capabilities) -> SegmentationConfig {
        SegmentationConfig {
            mode: self.mode,
            background: self.background,
            shape: self.shape,
            polygon_sides: self.polygon_sides,
            rounded_corners: self.corner_radius > 0.0,
            blur_radius: self.blur_radius,
            native_blur: self.native_blur,
            paint: self.paint.map(|p| p.kind()),
            enhance: self.enhancement > 0.0,
            alpha_only: self.alpha_only,
            preserve_mask_in_alpha: self.preserve_mask_in_alpha,
            tier: caps.tier,
        }
    }

    fn params(&self) -> SegmentationParams {
        let mut params = SegmentationParams {
            chroma_color: [self.chroma_color[0], self.chroma_color[1], self.chroma_color[2], 0.0],
            chroma_range: [self.chroma_range[0], self.chroma_range[1], 0.0, 0.0],
            pixel_size: [MASK_PIXEL_SIZE[0], MASK_PIXEL_SIZE[1], 0.0, 0.0],
            misc: [
                self.corner_radius,
                1.0 - self.enhancement,
                ENHANCEMENT_BRIGHTNESS,
                0.0,
            ],
            ..Default::default()
        };
        match self.paint {
            Some(Paint::Solid(color)) => params.color = sanitize(color.to_array()),
            Some(Paint::LinearGradient {
                start,
                stop,
                start_point,
                stop_point,
            }) => {
                params.start_color = sanitize(start.to_array());
                params.stop_color = sanitize(stop.to_array());
                let [sx, sy] = sanitize([start_point.x, start_point.y]);
                let [ex, ey] = sanitize([stop_point.x, stop_point.y]);
                params.points = [sx, sy, ex, ey];
            }
            Some(Paint::RadialGradient { start, stop }) => {
                params.start_color = sanitize(start.to_array());
                params.stop_color = sanitize(stop.to_array());
            }
            None => {}
        }
        params
    }
}

impl Filter for SegmentationFilter {
    fn label(&self) -> &str {
        "segmentation"
    }

    fn program_source(&mut self, caps: &Capabilities) -> ProgramSource {
        let config = self.config(caps);
        if let Some((cached, source)) = &self.generated {
            if *cached == config {
                return source.clone();
            }
        }
        tracing::debug!("Generating segmentation program for {:?}", config);
        let source = ProgramSource::fragment("segmentation", compiler::generate(&config));
        self.generated = Some((config, source.clone()));
        source
    }

    fn program_identity(&self) -> ProgramIdentity {
        ProgramIdentity::Source
    }

    fn modifies_contents(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn prepare(&mut self, cx: &mut FilterContext<'_>) {
        cx.set_params(&self.params());
        if self.mode == SegmentationMode::ExternalMask {
            if let Some(mask) = &self.mask {
                if cx.bind_mask(mask, self.mask_needs_update) {
                    self.mask_needs_update = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_configs_share_source() {
        let caps = Capabilities::from_renderer("NVIDIA GeForce");
        let mut a = SegmentationFilter::new();
        let mut b = SegmentationFilter::new();
        for filter in [&mut a, &mut b] {
            filter.set_mode(SegmentationMode::ChromaKey);
            filter.set_background(BackgroundStyle::Blur);
            filter.set_blur_radius(16);
        }
        assert_eq!(a.program_source(&caps), b.program_source(&caps));
    }

    #[test]
    fn test_uniform_only_changes_keep_source() {
        let caps = Capabilities::from_renderer("Apple M1");
        let mut filter = SegmentationFilter::new();
        filter.set_corner_radius(0.2);
        let before = filter.program_source(&caps);
        filter.set_corner_radius(0.6);
        filter.set_chroma_key([0.0, 1.0, 0.0], [0.3, 0.6]);
        assert_eq!(before, filter.program_source(&caps));

        filter.set_corner_radius(0.0);
        assert_ne!(before, filter.program_source(&caps));
    }

    #[test]
    fn test_enhancement_uniforms() {
        let mut filter = SegmentationFilter::new();
        filter.set_enhancement(0.25);
        let params = filter.params();
        assert_eq!(params.misc[1], 0.75);
        assert_eq!(params.misc[2], 0.5);
    }

    #[test]
    fn test_paint_values_sanitized() {
        let mut filter = SegmentationFilter::new();
        filter.set_paint(Some(Paint::Solid(Color::rgba(2.0, 0.0, 0.0, 1.0))));
        assert_eq!(filter.params().color, [0.0; 4]);

        filter.set_paint(Some(Paint::Solid(Color::rgba(0.5, 0.25, 0.0, 1.0))));
        assert_eq!(filter.params().color, [0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn test_setters_clamp() {
        let mut filter = SegmentationFilter::new();
        filter.set_polygon_sides(1);
        assert_eq!(filter.polygon_sides(), 3);
        filter.set_corner_radius(3.0);
        assert_eq!(filter.corner_radius(), 1.0);
        filter.set_enhancement(-1.0);
        assert_eq!(filter.enhancement(), 0.0);
    }

    #[test]
    fn test_chroma_defaults() {
        let params = SegmentationFilter::new().params();
        assert_eq!(params.chroma_color, [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(params.chroma_range, [0.4, 0.5, 0.0, 0.0]);
    }
}
