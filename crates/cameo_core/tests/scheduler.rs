//! Render scheduling through the headless backend

use std::cell::RefCell;
use std::rc::Rc;

use cameo_core::filters::{RoundRectFilter, TrailFilter};
use cameo_core::headless::{Command, HeadlessBackend};
use cameo_core::{
    BlendMode, Capabilities, Compositor, CompositorConfig, CompositorError, Filter, FilterContext,
    FilterRef, ImageContent, ImageData, Layer, LayerDelegate, LayerId, LayerTree, Mat4, PixelSize,
    Point, ProgramId, ProgramSource, Rect, RenderBackend, Size, UploadError,
};

#[derive(Debug)]
struct TintFilter {
    label: &'static str,
    modifies: bool,
    enabled: bool,
    results: Vec<f64>,
    benchmark: bool,
}

impl TintFilter {
    fn new(label: &'static str, modifies: bool) -> Self {
        Self {
            label,
            modifies,
            enabled: true,
            results: Vec::new(),
            benchmark: false,
        }
    }
}

impl Filter for TintFilter {
    fn label(&self) -> &str {
        self.label
    }

    fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
        ProgramSource::fragment(
            self.label,
            format!(
                "// {}\n@fragment\nfn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {{\n    return textureSample(content_texture, content_sampler, input.texcoord);\n}}\n",
                self.label
            ),
        )
    }

    fn modifies_contents(&self) -> bool {
        self.modifies
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn initialize(&mut self, _backend: &mut dyn RenderBackend, _program: ProgramId) {}

    fn prepare(&mut self, cx: &mut FilterContext<'_>) {
        let opacity = cx.opacity;
        cx.set_params(&[opacity, 0.0, 0.0, 0.0]);
    }

    fn benchmark(&self) -> bool {
        self.benchmark
    }

    fn benchmark_result(&mut self, milliseconds: f64) {
        self.results.push(milliseconds);
    }
}

fn tint(label: &'static str, modifies: bool) -> FilterRef {
    FilterRef::new(TintFilter::new(label, modifies))
}

fn solid() -> Rc<ImageContent> {
    Rc::new(ImageContent::solid(PixelSize::new(8, 8), [200, 100, 50, 255]))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn setup() -> (HeadlessBackend, Compositor, LayerTree) {
    init_tracing();
    let backend = HeadlessBackend::new().with_output_size(PixelSize::new(200, 100));
    let compositor = Compositor::new(&backend, CompositorConfig::default());
    (backend, compositor, LayerTree::new())
}

fn add_image_layer(tree: &mut LayerTree, parent: LayerId, frame: Rect) -> LayerId {
    let mut layer = Layer::with_frame(frame);
    layer.set_contents(Some(solid()));
    let id = tree.insert(layer);
    tree.add_sublayer(parent, id);
    id
}

fn draw_labels(backend: &HeadlessBackend) -> Vec<String> {
    backend.draws().iter().map(|d| d.label.clone()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Simple Layers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_filter_draws_once_without_offscreen_pass() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(10.0, 10.0, 50.0, 50.0));
    tree[layer].add_filter(tint("tint", false));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert_eq!(draw_labels(&backend), vec!["tint"]);
    assert_eq!(backend.draws()[0].target, None);
    assert_eq!(compositor.stats().pool.dequeues, 0);
}

#[test]
fn test_plain_contents_use_pass_through() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));
    add_image_layer(&mut tree, root, Rect::new(40.0, 0.0, 20.0, 20.0));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert_eq!(draw_labels(&backend), vec!["pass-through", "pass-through"]);
    assert_eq!(backend.stats().compiles, 1);
    assert_eq!(backend.stats().program_binds, 1);
    assert!(backend.draws().iter().all(|d| d.blend == BlendMode::SourceOver));
}

#[test]
fn test_sublayer_opacity_multiplies_in_simple_mode() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let parent = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    let child = add_image_layer(&mut tree, parent, Rect::new(0.0, 0.0, 10.0, 10.0));
    tree[parent].opacity = 0.5;
    tree[child].opacity = 0.5;

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let opacities: Vec<f32> = backend.draws().iter().map(|d| d.opacity).collect();
    assert_eq!(opacities, vec![0.5, 0.25]);
}

#[test]
fn test_hidden_and_transparent_layers_are_skipped() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let hidden = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 10.0, 10.0));
    let transparent = add_image_layer(&mut tree, root, Rect::new(20.0, 0.0, 10.0, 10.0));
    add_image_layer(&mut tree, hidden, Rect::new(0.0, 0.0, 5.0, 5.0));
    tree[hidden].hidden = true;
    tree[transparent].opacity = 0.0;

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(backend.stats().draws, 0);
}

#[test]
fn test_disabled_filters_are_ignored() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 10.0, 10.0));
    let typed = Rc::new(RefCell::new(TintFilter::new("tint", true)));
    typed.borrow_mut().enabled = false;
    tree[layer].add_filter(FilterRef::from_shared(typed.clone()));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(draw_labels(&backend), vec!["pass-through"]);

    typed.borrow_mut().enabled = true;
    backend.take_commands();
    compositor.render_frame(&mut backend, &mut tree, 16.0);
    assert_eq!(draw_labels(&backend), vec!["tint"]);
}

#[test]
fn test_corner_radius_draws_round_rect() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 40.0, 40.0));
    tree[layer].set_corner_radius(0.25);

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(draw_labels(&backend), vec!["round-rect"]);

    tree[layer].set_corner_radius(0.0);
    backend.take_commands();
    compositor.render_frame(&mut backend, &mut tree, 16.0);
    assert_eq!(draw_labels(&backend), vec!["pass-through"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter Chains
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_two_filters_use_one_offscreen_target() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    tree[layer].add_filter(tint("first", false));
    tree[layer].add_filter(tint("second", true));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["first", "second"]);
    assert!(draws[0].target.is_some());
    assert_eq!(draws[0].blend, BlendMode::Replace);
    assert_eq!(draws[0].opacity, 1.0);
    assert_eq!(draws[1].target, None);
    assert_eq!(draws[1].texture, draws[0].target.and_then(|t| backend.target_texture(t)));
    assert_eq!(backend.stats().program_binds, 2);

    let pool = compositor.stats().pool;
    assert_eq!(pool.dequeues, 1);
    assert_eq!(pool.enqueues, 1);
    assert_eq!(pool.in_use, 0);
}

#[test]
fn test_filter_chain_ping_pongs_through_intermediates() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    for label in ["a", "b", "c", "d"] {
        tree[layer].add_filter(tint(label, true));
    }

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["a", "b", "c", "d"]);
    // Each intermediate samples the previous pass
    for pair in draws.windows(2) {
        let written = pair[0].target.and_then(|t| backend.target_texture(t));
        assert_eq!(pair[1].texture, written);
    }
    assert_eq!(draws[3].target, None);

    let pool = compositor.stats().pool;
    assert_eq!(pool.dequeues, pool.enqueues);
    assert!(pool.allocations <= 3);
}

#[test]
fn test_targets_are_reused_across_frames() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    tree[layer].add_filter(tint("a", true));
    tree[layer].add_filter(tint("b", true));
    tree[layer].add_filter(tint("c", true));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    let allocated = compositor.stats().pool.allocations;
    for frame in 1..5 {
        compositor.render_frame(&mut backend, &mut tree, frame as f64 * 16.0);
    }

    let pool = compositor.stats().pool;
    assert_eq!(pool.allocations, allocated);
    assert_eq!(pool.dequeues, pool.enqueues);
    assert_eq!(backend.stats().targets_created, allocated);
}

#[test]
fn test_modifying_filter_with_sublayers_filters_the_composite() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let parent = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    let child = add_image_layer(&mut tree, parent, Rect::new(5.0, 5.0, 10.0, 10.0));
    tree[parent].add_filter(tint("tint", true));
    tree[parent].opacity = 0.5;
    tree[child].opacity = 0.5;

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["pass-through", "pass-through", "tint"]);
    // Contents and sublayers draw at full strength offscreen
    assert_eq!(draws[0].opacity, 1.0);
    assert_eq!(draws[1].opacity, 0.5);
    assert_eq!(draws[0].blend, BlendMode::Replace);
    assert_eq!(draws[1].blend, BlendMode::SourceOver);
    assert_eq!(draws[0].target, draws[1].target);
    assert_eq!(draws[2].target, None);
    assert_eq!(draws[2].opacity, 0.5);
}

#[test]
fn test_non_modifying_filter_with_sublayers_stays_simple() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let parent = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    add_image_layer(&mut tree, parent, Rect::new(5.0, 5.0, 10.0, 10.0));
    tree[parent].add_filter(tint("tint", false));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert_eq!(draw_labels(&backend), vec!["tint", "pass-through"]);
    assert!(backend.draws().iter().all(|d| d.target.is_none()));
    assert_eq!(compositor.stats().pool.dequeues, 0);
}

#[test]
fn test_allocation_failure_falls_back_to_first_filter() {
    let (mut backend, mut compositor, mut tree) = setup();
    backend.fail_render_targets(true);
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    tree[layer].add_filter(tint("first", false));
    tree[layer].add_filter(tint("second", true));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert_eq!(draw_labels(&backend), vec!["first"]);
    assert_eq!(compositor.target_depth(), 0);
}

#[test]
fn test_content_filter_runs_first() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let contents = ImageContent::solid(PixelSize::new(4, 4), [0, 255, 0, 255])
        .with_filter(tint("convert", false));
    let mut layer = Layer::with_frame(Rect::new(0.0, 0.0, 40.0, 40.0));
    layer.set_contents(Some(Rc::new(contents)));
    layer.add_filter(tint("effect", true));
    let id = tree.insert(layer);
    tree.add_sublayer(root, id);

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(draw_labels(&backend), vec!["convert", "effect"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Masks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_mask_applies_before_layer_filters() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 40.0, 40.0));
    tree[layer].set_mask(Some(Rc::new(ImageContent::new(ImageData::alpha(
        PixelSize::new(2, 2),
        vec![0, 255, 255, 0],
    )))));
    tree[layer].add_filter(tint("effect", true));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["mask", "effect"]);
    assert!(draws[0].mask.is_some());
    assert!(draws[0].target.is_some());
    assert!(!tree[layer].mask_needs_update);
}

#[test]
fn test_mask_after_content_filter() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let contents = ImageContent::solid(PixelSize::new(4, 4), [0, 255, 0, 255])
        .with_filter(tint("convert", true));
    let mut layer = Layer::with_frame(Rect::new(0.0, 0.0, 40.0, 40.0));
    layer.set_contents(Some(Rc::new(contents)));
    layer.set_mask(Some(solid()));
    let id = tree.insert(layer);
    tree.add_sublayer(root, id);

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["convert", "mask"]);
    assert_eq!(draws[0].mask, None);
    // The converted pass already covers the content rect
    assert_eq!(draws[0].first_texcoord, Some([0.0, 0.0]));
    assert!(draws[1].mask.is_some());
    assert_eq!(draws[1].target, None);
}

#[test]
fn test_mask_with_sublayers_masks_the_composite() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 40.0, 40.0));
    add_image_layer(&mut tree, layer, Rect::new(0.0, 0.0, 10.0, 10.0));
    tree[layer].set_mask(Some(solid()));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["pass-through", "pass-through", "mask"]);
    assert_eq!(draws[0].mask, None);
    assert!(draws[2].mask.is_some());
    assert_eq!(draws[2].target, None);
}

#[test]
fn test_mask_filter_is_created_once_per_layer() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 40.0, 40.0));
    tree[layer].set_mask(Some(solid()));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    let first = tree[layer].mask_filter().cloned();
    compositor.render_frame(&mut backend, &mut tree, 16.0);

    assert!(first.is_some());
    assert_eq!(tree[layer].mask_filter().cloned(), first);
    assert_eq!(compositor.stats().programs.compiles, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Contents
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingDelegate {
    failures: RefCell<Vec<(LayerId, UploadError)>>,
}

impl LayerDelegate for RecordingDelegate {
    fn contents_failed_to_update(&self, layer: LayerId, error: &UploadError) {
        self.failures.borrow_mut().push((layer, error.clone()));
    }
}

#[test]
fn test_upload_failure_reports_to_delegate_and_still_draws() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let broken = ImageContent::new(ImageData::rgba(PixelSize::new(2, 2), vec![0u8; 3]));
    let delegate = Rc::new(RecordingDelegate::default());
    let mut layer = Layer::with_frame(Rect::new(0.0, 0.0, 20.0, 20.0));
    layer.set_contents(Some(Rc::new(broken)));
    layer.set_delegate(Some(delegate.clone()));
    let id = tree.insert(layer);
    tree.add_sublayer(root, id);

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    let failures = delegate.failures.borrow();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, id);
    assert!(matches!(failures[0].1, UploadError::InvalidData(_)));
    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    let placeholder = draws[0].texture.and_then(|t| backend.texture_pixel(t));
    assert_eq!(placeholder, Some([0, 0, 0, 255]));
}

#[test]
fn test_contents_upload_only_when_dirty() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(backend.stats().uploads, 1);
    assert!(!tree[layer].contents_need_update);

    compositor.render_frame(&mut backend, &mut tree, 16.0);
    assert_eq!(backend.stats().uploads, 1);

    tree[layer].contents_need_update = true;
    compositor.render_frame(&mut backend, &mut tree, 32.0);
    assert_eq!(backend.stats().uploads, 2);
}

#[test]
fn test_copy_texture_between_layers_skips_upload() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let source = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));
    let dest = add_image_layer(&mut tree, root, Rect::new(40.0, 0.0, 20.0, 20.0));
    tree[dest].hidden = true;

    assert!(!compositor.copy_texture_from_layer_to_layer(&mut backend, &mut tree, source, dest));
    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert!(compositor.copy_texture_from_layer_to_layer(&mut backend, &mut tree, source, dest));
    assert!(!tree[dest].contents_need_update);

    tree[dest].hidden = false;
    let uploads = backend.stats().uploads;
    backend.take_commands();
    compositor.render_frame(&mut backend, &mut tree, 16.0);

    assert_eq!(backend.stats().uploads, uploads);
    let draws = backend.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].texture, draws[1].texture);
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom Geometry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_trail_draws_point_sprites() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let trail = Rc::new(RefCell::new(TrailFilter::new()));
    let mut layer = Layer::with_frame(Rect::new(0.0, 0.0, 200.0, 100.0));
    layer.add_filter(FilterRef::from_shared(trail.clone()));
    let id = tree.insert(layer);
    tree.add_sublayer(root, id);

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    assert_eq!(backend.stats().draws, 0);

    trail
        .borrow_mut()
        .add_points(&[Point::new(10.0, 10.0), Point::new(20.0, 15.0), Point::new(30.0, 20.0)]);
    compositor.render_frame(&mut backend, &mut tree, 16.0);

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].label, "trail");
    assert_eq!(draws[0].instances, 3);
    assert_eq!(draws[0].first_texcoord, None);
    assert!(draws[0].params_len > 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Programs
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_failed_compile_falls_back_to_pass_through() {
    let (mut backend, mut compositor, mut tree) = setup();
    backend.fail_compiles_containing("// broken");
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));
    tree[layer].add_filter(tint("broken", false));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    compositor.render_frame(&mut backend, &mut tree, 16.0);

    assert_eq!(draw_labels(&backend), vec!["pass-through", "pass-through"]);
    assert_eq!(compositor.stats().programs.failures, 1);
}

#[test]
fn test_round_rect_uses_shared_corner_filter_identity() {
    let mut layer = Layer::new();
    layer.add_filter(FilterRef::new(RoundRectFilter::new(0.1)));
    layer.set_corner_radius(0.3);
    layer.add_filter(tint("late", false));
    let labels: Vec<String> = layer
        .filters()
        .iter()
        .map(|f| f.borrow().label().to_string())
        .collect();
    assert_eq!(labels.last().map(String::as_str), Some("round-rect"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Offscreen Orientation
// ─────────────────────────────────────────────────────────────────────────────

fn render_filtered_group(backend: &mut HeadlessBackend) -> Compositor {
    init_tracing();
    let mut compositor = Compositor::new(&*backend, CompositorConfig::default());
    let mut tree = LayerTree::new();
    let root = tree.root();
    let parent = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    add_image_layer(&mut tree, parent, Rect::new(5.0, 5.0, 10.0, 10.0));
    tree[parent].add_filter(tint("tint", true));

    compositor.render_frame(backend, &mut tree, 0.0);
    compositor
}

#[test]
fn test_offscreen_projection_unflipped_by_default() {
    let mut backend = HeadlessBackend::new().with_output_size(PixelSize::new(200, 100));
    let compositor = render_filtered_group(&mut backend);

    let inner = Mat4::projection_for_size(Size::new(50.0, 50.0)).to_cols_array_2d();
    let draws = backend.draws();
    assert_eq!(draw_labels(&backend), vec!["pass-through", "pass-through", "tint"]);
    assert!(draws[1].target.is_some());
    assert_eq!(draws[1].projection, inner);
    assert_eq!(draws[2].projection, compositor.projection().to_cols_array_2d());
}

#[test]
fn test_offscreen_projection_flipped_when_targets_are_inverted() {
    let mut backend = HeadlessBackend::new()
        .with_output_size(PixelSize::new(200, 100))
        .with_offscreen_y_flipped();
    let compositor = render_filtered_group(&mut backend);

    let inner = Mat4::projection_for_size(Size::new(50.0, 50.0)).flipped_y(50.0);
    let draws = backend.draws();
    assert!(draws[1].target.is_some());
    assert_eq!(draws[0].projection, inner.to_cols_array_2d());
    assert_eq!(draws[1].projection, inner.to_cols_array_2d());
    assert_ne!(draws[1].projection, Mat4::projection_for_size(Size::new(50.0, 50.0)).to_cols_array_2d());
    // The composite onto the output keeps the root projection
    assert_eq!(draws[2].target, None);
    assert_eq!(draws[2].projection, compositor.projection().to_cols_array_2d());
}

#[test]
fn test_snapshot_projection_follows_target_orientation() {
    init_tracing();
    let mut backend = HeadlessBackend::new()
        .with_output_size(PixelSize::new(200, 100))
        .with_offscreen_y_flipped();
    let mut compositor = Compositor::new(&backend, CompositorConfig::default());
    let mut tree = LayerTree::new();
    let root = tree.root();
    add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));
    let root_projection = compositor.projection();

    compositor
        .snapshot(&mut backend, &mut tree, PixelSize::new(200, 100), 0.0)
        .unwrap();

    let flipped = Mat4::projection_for_size(Size::new(200.0, 100.0)).flipped_y(100.0);
    assert_eq!(backend.draws()[0].projection, flipped.to_cols_array_2d());
    assert_eq!(compositor.projection(), root_projection);
}

#[test]
fn test_sizeless_complex_layer_skips_its_subtree() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let group = tree.insert(Layer::with_frame(Rect::new(0.0, 0.0, 0.0, 0.0)));
    tree.add_sublayer(root, group);
    add_image_layer(&mut tree, group, Rect::new(0.0, 0.0, 10.0, 10.0));
    tree[group].add_filter(tint("a", true));
    tree[group].add_filter(tint("b", true));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert!(backend.draws().is_empty());
    assert_eq!(compositor.stats().pool.dequeues, 0);
    assert_eq!(compositor.target_depth(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots And Context Loss
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_snapshot_draws_into_opaque_target() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));

    let pixels = compositor
        .snapshot(&mut backend, &mut tree, PixelSize::new(20, 10), 0.0)
        .unwrap();
    assert_eq!(pixels.len(), 20 * 10 * 4);

    let created = backend.commands().iter().any(|c| {
        matches!(c, Command::CreateTarget { size, alpha: false, .. } if *size == PixelSize::new(20, 10))
    });
    assert!(created);
    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].target.is_some());
    assert_eq!(draws[0].blend, BlendMode::SourceOver);
    assert_eq!(compositor.target_depth(), 0);
}

#[test]
fn test_snapshot_fails_while_context_lost() {
    let (mut backend, mut compositor, mut tree) = setup();
    backend.lose_context();
    let result = compositor.snapshot(&mut backend, &mut tree, PixelSize::new(4, 4), 0.0);
    assert!(matches!(result, Err(CompositorError::ContextLost)));
}

#[test]
fn test_context_restore_rebuilds_lazily() {
    let (mut backend, mut compositor, mut tree) = setup();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 50.0, 50.0));
    tree[layer].add_filter(tint("a", true));
    tree[layer].add_filter(tint("b", true));
    tree[layer].set_mask(Some(solid()));
    compositor.render_frame(&mut backend, &mut tree, 0.0);
    let mask_filter = tree[layer].mask_filter().cloned();

    backend.lose_context();
    assert_eq!(compositor.render_frame(&mut backend, &mut tree, 16.0), std::time::Duration::ZERO);
    assert!(compositor.is_context_lost());

    backend.restore_context();
    compositor.context_restored(&backend);
    backend.take_commands();
    compositor.render_frame(&mut backend, &mut tree, 32.0);

    assert_eq!(draw_labels(&backend), vec!["mask", "a", "b"]);
    assert_eq!(tree[layer].mask_filter().cloned(), mask_filter);
    assert!(backend.live_programs() >= 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_frame_timings_reach_callback() {
    let mut backend = HeadlessBackend::new().with_timer_queries(4_000_000);
    let config = CompositorConfig {
        benchmark_frames: true,
        ..Default::default()
    };
    let mut compositor = Compositor::new(&backend, config);
    let mut tree = LayerTree::new();
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    compositor.set_frame_timing_callback(Some(Box::new(move |ms| sink.borrow_mut().push(ms))));

    compositor.render_frame(&mut backend, &mut tree, 0.0);
    compositor.render_frame(&mut backend, &mut tree, 16.0);

    assert_eq!(*received.borrow(), vec![4.0, 4.0]);
}

#[test]
fn test_filter_benchmarks_are_delivered() {
    let mut backend = HeadlessBackend::new().with_timer_queries(1_500_000);
    let mut compositor = Compositor::new(&backend, CompositorConfig::default());
    let mut tree = LayerTree::new();
    let root = tree.root();
    let layer = add_image_layer(&mut tree, root, Rect::new(0.0, 0.0, 20.0, 20.0));
    let typed = Rc::new(RefCell::new(TintFilter::new("timed", false)));
    typed.borrow_mut().benchmark = true;
    tree[layer].add_filter(FilterRef::from_shared(typed.clone()));

    compositor.render_frame(&mut backend, &mut tree, 0.0);

    assert_eq!(typed.borrow().results, vec![1.5]);
    assert_eq!(backend.live_queries(), 0);
}
