//! Render a small layer tree offscreen and write it to a PNG
//!
//! Run with: cargo run -p cameo_gpu --example headless_snapshot -- out.png

use std::rc::Rc;

use cameo_core::{Color, Compositor, CompositorConfig, ImageContent, Layer, LayerTree, PixelSize, Rect};
use cameo_gpu::{GpuConfig, WgpuBackend};
use tracing_subscriber::EnvFilter;

const SIZE: PixelSize = PixelSize::new(640, 360);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "snapshot.png".to_string());

    let mut backend = WgpuBackend::new(GpuConfig::default().with_output_size(SIZE).with_env_overrides())?;
    let mut compositor = Compositor::new(&backend, CompositorConfig::default().with_env_overrides());
    compositor.set_clear_color(Color::rgb(0.1, 0.1, 0.12));

    let mut tree = LayerTree::new();
    let root = tree.root();

    let mut background = Layer::with_frame(Rect::new(0.0, 0.0, 640.0, 360.0));
    background.set_contents(Some(Rc::new(ImageContent::solid(PixelSize::new(1, 1), [40, 90, 160, 255]))));
    background.opaque = true;
    let background = tree.insert(background);
    tree.add_sublayer(root, background);

    let mut card = Layer::with_frame(Rect::new(160.0, 90.0, 320.0, 180.0));
    card.set_contents(Some(Rc::new(ImageContent::solid(PixelSize::new(1, 1), [240, 200, 80, 255]))));
    card.opacity = 0.85;
    card.set_corner_radius(0.25);
    let card = tree.insert(card);
    tree.add_sublayer(root, card);

    let elapsed = compositor.render_frame(&mut backend, &mut tree, 0.0);
    tracing::info!("frame rendered in {:?}", elapsed);

    let pixels = compositor.snapshot(&mut backend, &mut tree, SIZE, 0.0)?;
    let image = image::RgbaImage::from_raw(SIZE.width, SIZE.height, pixels)
        .ok_or("snapshot buffer has the wrong length")?;
    image.save(&path)?;
    tracing::info!("wrote {}", path);
    Ok(())
}
