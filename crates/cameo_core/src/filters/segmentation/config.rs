use crate::backend::GpuTier;

/// Where the foreground alpha comes from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Fully opaque, no separation
    #[default]
    None,
    /// Alpha keyed from a chroma color
    ChromaKey,
    /// Alpha from a separately supplied segmentation mask
    ExternalMask,
    /// Alpha already present in the content texture
    PassThrough,
}

/// Treatment of the pixels behind the foreground
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundStyle {
    #[default]
    Show,
    Hide,
    Blur,
}

/// Outline the output is clipped to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Rectangle,
    Circle,
    Polygon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintKind {
    Solid,
    LinearGradient,
    RadialGradient,
}

pub const MIN_POLYGON_SIDES: u32 = 3;
pub const MAX_POLYGON_SIDES: u32 = 10;

/// Everything that changes the generated fragment source
///
/// Values that only change uniforms (colors, corner radius amount,
/// enhancement strength) are not part of the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentationConfig {
    pub mode: SegmentationMode,
    pub background: BackgroundStyle,
    pub shape: Shape,
    /// Only read for [`Shape::Polygon`], clamped to 3..=10
    pub polygon_sides: u32,
    /// Only applies to [`Shape::Rectangle`]
    pub rounded_corners: bool,
    /// Blur kernel size in texels, 0 disables the shader blur
    pub blur_radius: u32,
    /// The background is blurred by the caller; skip the shader blur
    pub native_blur: bool,
    pub paint: Option<PaintKind>,
    pub enhance: bool,
    /// Keep the original colors and only write the mask into alpha
    pub alpha_only: bool,
    /// Write the raw mask into alpha instead of compositing opacity
    pub preserve_mask_in_alpha: bool,
    pub tier: GpuTier,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::None,
            background: BackgroundStyle::Show,
            shape: Shape::Rectangle,
            polygon_sides: MIN_POLYGON_SIDES,
            rounded_corners: false,
            blur_radius: 0,
            native_blur: false,
            paint: None,
            enhance: false,
            alpha_only: false,
            preserve_mask_in_alpha: false,
            tier: GpuTier::Low,
        }
    }
}

impl SegmentationConfig {
    pub fn polygon_sides(&self) -> u32 {
        self.polygon_sides.clamp(MIN_POLYGON_SIDES, MAX_POLYGON_SIDES)
    }

    /// Whether the shader performs its own background blur
    pub fn shader_blur(&self) -> bool {
        self.background == BackgroundStyle::Blur && !self.native_blur && self.blur_radius > 0
    }
}
