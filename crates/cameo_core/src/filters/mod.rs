//! Stock filters

mod mask;
mod pass_through;
mod round_rect;
pub mod segmentation;
mod trail;

pub use mask::MaskFilter;
pub use pass_through::PassThroughFilter;
pub use round_rect::RoundRectFilter;
pub use segmentation::{
    BackgroundStyle, Paint, SegmentationConfig, SegmentationFilter, SegmentationMode, Shape,
};
pub use trail::TrailFilter;
