//! Render scheduler
//!
//! Walks the layer tree once per frame and turns each layer into draw calls.
//! A layer renders in one of two modes:
//!
//! - **simple**: at most one filter, and it either leaves the contents alone
//!   or the layer has no sublayers. The layer draws once straight into the
//!   current target with its own transform and opacity, then its sublayers
//!   draw on top.
//! - **complex**: anything else. The layer's contents and sublayers draw into
//!   a pooled offscreen target in local space, every filter but the last runs
//!   target to target, and the last filter draws the result into the caller's
//!   target with the layer's transform and opacity.
//!
//! Offscreen targets form a stack; the top of the stack (or the output when
//! empty) receives every draw. The first draw after a push replaces the
//! freshly cleared target; every other draw blends source-over.

use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::backend::{
    BlendMode, Capabilities, DrawCall, Geometry, ProgramId, RenderBackend, TextureId,
};
use crate::config::CompositorConfig;
use crate::content::ContentRef;
use crate::error::{BackendError, CompositorError, Result};
use crate::filter::{FilterContext, FilterRef};
use crate::filters::{MaskFilter, PassThroughFilter};
use crate::geometry::{Color, Mat4, PixelSize, Rect, Size};
use crate::layer::{LayerId, LayerTree};
use crate::pool::{PoolStats, RenderTarget, RenderTargetPool};
use crate::program_cache::{ProgramCache, ProgramCacheStats};
use crate::shader::{quad_vertices, LayerUniforms};
use crate::texture_cache::{Planes, TextureCache, TextureCacheStats};
use crate::timing::{GpuTimer, TimerStats, TimerTarget};
use crate::visibility::{compute_visible_set, VisibleSet};

/// Callback receiving whole-frame GPU time in milliseconds
pub type FrameTimingCallback = Box<dyn FnMut(f64)>;

#[derive(Debug)]
struct StackEntry {
    target: RenderTarget,
    /// Nothing drawn since the push
    fresh: bool,
}

/// Counters across every cache the compositor owns
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompositorStats {
    pub pool: PoolStats,
    pub textures: TextureCacheStats,
    pub programs: ProgramCacheStats,
    pub timer: TimerStats,
}

/// What one draw samples and where it lands
struct LayerDraw {
    /// Layer whose dirty flags and delegate the draw reports to
    layer: LayerId,
    /// Quad in model space
    frame: Rect,
    content_rect: Rect,
    use_position: bool,
    contents: Option<ContentRef>,
    /// Sample this texture instead of uploading `contents`
    texture_override: Option<TextureId>,
    mask: Option<ContentRef>,
    opacity: f32,
    projection: Mat4,
    model: Mat4,
    layer_size: Size,
}

pub struct Compositor {
    config: CompositorConfig,
    caps: Capabilities,
    pixel_size: PixelSize,
    scale: f32,
    projection: Mat4,

    pool: RenderTargetPool,
    textures: TextureCache,
    programs: ProgramCache,
    timer: GpuTimer,

    targets: Vec<StackEntry>,
    active_program: Option<ProgramId>,
    pass_through: FilterRef,
    culled: FxHashSet<LayerId>,
    context_lost: bool,

    frame_callback: Option<FrameTimingCallback>,
}

impl Compositor {
    pub fn new(backend: &dyn RenderBackend, config: CompositorConfig) -> Self {
        config.log();
        let caps = Self::effective_capabilities(backend, &config);
        tracing::info!(
            "compositor: renderer '{}', tier {:?}, timer queries {}",
            caps.renderer,
            caps.tier,
            caps.timer_queries
        );
        let pixel_size = backend.output_size();
        let timer = GpuTimer::new(config.max_pending_queries);
        let mut compositor = Self {
            config,
            caps,
            pixel_size,
            scale: 1.0,
            projection: Mat4::IDENTITY,
            pool: RenderTargetPool::new(),
            textures: TextureCache::new(),
            programs: ProgramCache::new(),
            timer,
            targets: Vec::new(),
            active_program: None,
            pass_through: FilterRef::new(PassThroughFilter::new()),
            culled: FxHashSet::default(),
            context_lost: backend.is_context_lost(),
            frame_callback: None,
        };
        compositor.rebuild_projection();
        compositor
    }

    fn effective_capabilities(backend: &dyn RenderBackend, config: &CompositorConfig) -> Capabilities {
        let mut caps = backend.capabilities().clone();
        if let Some(tier) = config.gpu_tier {
            caps.tier = tier;
        }
        caps
    }

    // Output geometry

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Output size in pixels
    pub fn size(&self) -> PixelSize {
        self.pixel_size
    }

    /// Output size in the tree's logical units
    pub fn logical_size(&self) -> Size {
        Size::new(
            self.pixel_size.width as f32 * self.scale,
            self.pixel_size.height as f32 * self.scale,
        )
    }

    pub fn set_size(&mut self, backend: &mut dyn RenderBackend, size: PixelSize) {
        backend.resize_output(size);
        self.pixel_size = size;
        self.rebuild_projection();
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Logical units per output pixel
    pub fn set_scale(&mut self, scale: f32) {
        if !(scale.is_finite() && scale > 0.0) {
            tracing::warn!("Ignoring invalid scale {}", scale);
            return;
        }
        self.scale = scale;
        self.rebuild_projection();
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Replace the root projection until the next size or scale change
    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    fn rebuild_projection(&mut self) {
        let inverse = 1.0 / self.scale;
        self.projection = Mat4::projection_for_size(self.pixel_size.to_size())
            .mul(&Mat4::scale(inverse, inverse, 1.0));
    }

    pub fn set_frame_timing_callback(&mut self, callback: Option<FrameTimingCallback>) {
        self.frame_callback = callback;
    }

    pub fn set_benchmark_frames(&mut self, enabled: bool) {
        self.config.benchmark_frames = enabled;
    }

    pub fn set_check_errors(&mut self, enabled: bool) {
        self.config.check_errors = enabled;
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.config.clear_color = color;
    }

    fn clear_color(&self) -> Color {
        if self.config.alpha {
            self.config.clear_color
        } else {
            self.config.clear_color.with_alpha(1.0)
        }
    }

    // Frames

    /// Draw the whole tree into the output. `timestamp_ms` drives animated
    /// filters; the CPU time spent is returned.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        timestamp_ms: f64,
    ) -> Duration {
        if backend.is_context_lost() {
            self.context_lost();
        }
        if self.context_lost {
            tracing::trace!("Skipping frame while the GPU context is lost");
            return Duration::ZERO;
        }

        let start = Instant::now();
        backend.begin_frame();
        if self.config.benchmark_frames {
            self.timer.start(backend, TimerTarget::Frame);
        }

        backend.clear(None, self.clear_color());
        let projection = self.projection;
        self.render_tree(backend, tree, timestamp_ms, &projection);
        self.textures.prune(backend);

        let frames = if self.config.benchmark_frames {
            self.timer.stop(backend)
        } else {
            self.timer.process(backend)
        };
        backend.end_frame();
        self.deliver_frame_timings(frames);

        start.elapsed()
    }

    fn render_tree(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        timestamp_ms: f64,
        projection: &Mat4,
    ) {
        let root = tree.root();
        let visible = compute_visible_set(tree, root, self.logical_size());
        self.culled = visible.culled().collect();
        if !self.culled.is_empty() {
            tracing::trace!("Culled {} obscured layer(s)", self.culled.len());
        }
        self.active_program = None;

        let depth = self.targets.len();
        let time = (timestamp_ms / 1000.0) as f32;
        let model = tree.get(root).map(|l| l.model()).unwrap_or_default();
        self.render_layer(backend, tree, root, time, 1.0, projection, &model);

        if self.targets.len() != depth {
            tracing::error!(
                "Render target stack unbalanced after frame: {} entries, expected {}",
                self.targets.len(),
                depth
            );
            self.targets.truncate(depth);
        }
        self.culled.clear();
    }

    fn deliver_frame_timings(&mut self, frames: Vec<f64>) {
        if let Some(callback) = self.frame_callback.as_mut() {
            for milliseconds in frames {
                callback(milliseconds);
            }
        }
    }

    /// Render the tree into a dedicated opaque target of `size` pixels and
    /// read it back as RGBA rows, top row first. The output, the active
    /// target and the projection are left as they were.
    pub fn snapshot(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        size: PixelSize,
        timestamp_ms: f64,
    ) -> Result<Vec<u8>> {
        if self.context_lost || backend.is_context_lost() {
            return Err(CompositorError::ContextLost);
        }
        let target = self.pool.dequeue(backend, size, false).ok_or_else(|| {
            BackendError::ResourceCreation(format!(
                "snapshot target {}x{}",
                size.width, size.height
            ))
        })?;

        backend.begin_frame();
        self.push_target(backend, target);
        backend.clear(Some(target.target), self.config.clear_color.with_alpha(1.0));
        if let Some(top) = self.targets.last_mut() {
            top.fresh = false;
        }

        let mut projection = Mat4::projection_for_size(self.logical_size());
        if self.caps.offscreen_y_flipped {
            projection = projection.flipped_y(self.logical_size().height);
        }
        let saved = std::mem::replace(&mut self.projection, projection);
        self.render_tree(backend, tree, timestamp_ms, &projection);
        let pixels = backend.read_pixels(Some(target.target));
        self.projection = saved;

        self.pop_target();
        self.pool.enqueue(target, &mut self.textures);
        backend.end_frame();
        Ok(pixels?)
    }

    // Target stack

    /// Make `target` the destination of subsequent draws, cleared to
    /// transparent
    pub fn push_target(&mut self, backend: &mut dyn RenderBackend, target: RenderTarget) {
        backend.clear(Some(target.target), Color::TRANSPARENT);
        self.targets.push(StackEntry {
            target,
            fresh: true,
        });
    }

    /// Restore the previous destination. An unbalanced pop is logged and
    /// leaves the output bound.
    pub fn pop_target(&mut self) -> Option<RenderTarget> {
        match self.targets.pop() {
            Some(entry) => Some(entry.target),
            None => {
                tracing::error!("Unbalanced render target push/pop");
                None
            }
        }
    }

    pub fn target_depth(&self) -> usize {
        self.targets.len()
    }

    fn current_target_size(&self) -> PixelSize {
        self.targets
            .last()
            .map(|e| e.target.size)
            .unwrap_or(self.pixel_size)
    }

    // Layers

    #[allow(clippy::too_many_arguments)]
    fn render_layer(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        id: LayerId,
        time: f32,
        base_opacity: f32,
        projection: &Mat4,
        model: &Mat4,
    ) {
        if self.culled.contains(&id) {
            return;
        }
        let Some(layer) = tree.get(id) else {
            return;
        };
        let opacity = base_opacity * layer.opacity;
        if layer.hidden || opacity <= 0.0 {
            return;
        }

        let sublayers: SmallVec<[LayerId; 4]> = SmallVec::from_slice(layer.sublayers());
        let contents = layer.contents().cloned();
        let content_filter = contents
            .as_ref()
            .and_then(|c| c.filter())
            .filter(|f| f.is_enabled());
        let mut filters: Vec<FilterRef> = content_filter
            .iter()
            .cloned()
            .chain(layer.filters().iter().filter(|f| f.is_enabled()).cloned())
            .collect();

        if contents.is_none() && sublayers.is_empty() && filters.is_empty() {
            return;
        }

        let layer_size = layer.size;
        let natural_size = layer.natural_size();
        let content_rect = layer.content_rect();
        let use_position = layer.use_position_for_coordinate;
        let mask = layer.mask().cloned();

        // Masks apply before the other filters (after any content conversion)
        // unless sublayers must be masked too
        let mask_filter = match mask {
            Some(_) => Some(self.mask_filter_for(tree, id)),
            None => None,
        };
        if let Some(mask_filter) = &mask_filter {
            if sublayers.is_empty() {
                let index = usize::from(content_filter.is_some());
                filters.insert(index, mask_filter.clone());
            } else {
                filters.push(mask_filter.clone());
            }
        }
        let is_mask = |filter: &FilterRef| mask_filter.as_ref() == Some(filter);

        let complex = match filters.len() {
            0 => false,
            1 => filters[0].modifies_contents() && !sublayers.is_empty(),
            _ => true,
        };

        let local_size = if layer_size.is_empty() { natural_size } else { layer_size };
        let mut fbo = None;
        let mut inner_projection = *projection;
        if complex {
            if local_size.is_empty() {
                tracing::debug!("Layer {:?} has no size for an offscreen pass, skipping its subtree", id);
                return;
            }
            match self.pool.dequeue(backend, natural_size.to_pixels(), true) {
                Some(target) => {
                    self.push_target(backend, target);
                    fbo = Some(target);
                    inner_projection = Mat4::projection_for_size(local_size);
                    if self.caps.offscreen_y_flipped {
                        inner_projection = inner_projection.flipped_y(local_size.height);
                    }
                }
                None => {
                    tracing::warn!("No offscreen target for layer {:?}, drawing its first filter only", id);
                    filters.truncate(1);
                }
            }
        }
        let local_frame = Rect::new(0.0, 0.0, local_size.width, local_size.height);

        // Own contents first
        let mut remaining: &[FilterRef] = &filters;
        let first = match filters.first() {
            Some(filter) if !filter.modifies_contents() || sublayers.is_empty() => {
                remaining = &filters[1..];
                Some(filter.clone())
            }
            _ if contents.is_some() => Some(self.pass_through.clone()),
            _ => None,
        };

        let mut swap_content_coordinates = false;
        if let Some(filter) = first {
            let draw = if fbo.is_none() {
                LayerDraw {
                    layer: id,
                    frame: Rect::new(0.0, 0.0, layer_size.width, layer_size.height),
                    content_rect,
                    use_position,
                    contents: contents.clone(),
                    texture_override: None,
                    mask: mask.clone(),
                    opacity,
                    projection: *projection,
                    model: *model,
                    layer_size,
                }
            } else {
                swap_content_coordinates = true;
                LayerDraw {
                    layer: id,
                    frame: local_frame,
                    content_rect: if is_mask(&filter) || mask_filter.is_none() {
                        content_rect
                    } else {
                        Rect::UNIT
                    },
                    use_position: false,
                    contents: contents.clone(),
                    texture_override: None,
                    mask: if is_mask(&filter) { mask.clone() } else { None },
                    opacity: 1.0,
                    projection: inner_projection,
                    model: Mat4::IDENTITY,
                    layer_size: local_size,
                }
            };
            self.draw_layer(backend, tree, &draw, &filter, time);
        }

        // Then sublayers
        for &sublayer in &sublayers {
            let Some(sublayer_model) = tree.get(sublayer).map(|l| l.model()) else {
                continue;
            };
            if fbo.is_some() {
                self.render_layer(backend, tree, sublayer, time, 1.0, &inner_projection, &sublayer_model);
            } else {
                let world = model.mul(&sublayer_model);
                self.render_layer(backend, tree, sublayer, time, opacity, projection, &world);
            }
        }

        // Then every remaining filter but the last, target to target
        let mut drawable = None;
        let mut final_filter = None;
        let mut intermediate: Option<RenderTarget> = None;
        if let (Some(base), Some((last, chain))) = (fbo, remaining.split_last()) {
            drawable = Some(base.texture);
            for filter in chain {
                let Some(next) = self.pool.dequeue(backend, base.size, true) else {
                    tracing::warn!("No intermediate target for filter {:?}, skipping it", filter);
                    continue;
                };
                self.push_target(backend, next);
                let draw = LayerDraw {
                    layer: id,
                    frame: local_frame,
                    content_rect: if is_mask(filter) { content_rect } else { Rect::UNIT },
                    use_position: false,
                    contents: None,
                    texture_override: drawable,
                    mask: if is_mask(filter) { mask.clone() } else { None },
                    opacity: 1.0,
                    projection: inner_projection,
                    model: Mat4::IDENTITY,
                    layer_size: local_size,
                };
                self.draw_layer(backend, tree, &draw, filter, time);
                self.pop_target();

                if let Some(previous) = intermediate.replace(next) {
                    self.pool.enqueue(previous, &mut self.textures);
                }
                drawable = Some(next.texture);
            }
            final_filter = Some(last.clone());
        }

        if let Some(base) = fbo {
            self.pop_target();
            drawable.get_or_insert(base.texture);
        }

        // Finally the result, transformed, into the caller's target
        if let Some(texture) = drawable {
            let filter = final_filter.unwrap_or_else(|| self.pass_through.clone());
            if is_mask(&filter) {
                swap_content_coordinates = false;
            }
            let draw = LayerDraw {
                layer: id,
                frame: Rect::new(0.0, 0.0, layer_size.width, layer_size.height),
                content_rect: if swap_content_coordinates { Rect::UNIT } else { content_rect },
                use_position,
                contents: None,
                texture_override: Some(texture),
                mask: mask.clone(),
                opacity,
                projection: *projection,
                model: *model,
                layer_size,
            };
            self.draw_layer(backend, tree, &draw, &filter, time);
        }

        if let Some(target) = intermediate {
            self.pool.enqueue(target, &mut self.textures);
        }
        if let Some(target) = fbo {
            self.pool.enqueue(target, &mut self.textures);
        }
    }

    /// The layer's mask filter, created on first use and kept on the layer
    fn mask_filter_for(&mut self, tree: &mut LayerTree, id: LayerId) -> FilterRef {
        if let Some(filter) = tree.get(id).and_then(|l| l.mask_filter.clone()) {
            return filter;
        }
        let filter = FilterRef::new(MaskFilter::new());
        tracing::debug!("Created mask filter for layer {:?}", id);
        if let Some(layer) = tree.get_mut(id) {
            layer.mask_filter = Some(filter.clone());
        }
        filter
    }

    fn draw_layer(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        draw: &LayerDraw,
        filter: &FilterRef,
        time: f32,
    ) {
        let Some(program) = self.programs.program_for(backend, &self.caps, filter) else {
            tracing::warn!("No program for {:?}, skipping draw", filter);
            return;
        };

        let (contents_need_update, mask_needs_update, delegate) = match tree.get(draw.layer) {
            Some(layer) => (
                layer.contents_need_update,
                layer.mask_needs_update,
                layer.delegate().cloned(),
            ),
            None => (false, false, None),
        };

        let mut planes = Planes::new();
        if let Some(texture) = draw.texture_override {
            planes.push(texture);
        } else if let Some(contents) = &draw.contents {
            let lookup = self.textures.textures_for(backend, contents, contents_need_update);
            if lookup.consumed {
                if let Some(layer) = tree.get_mut(draw.layer) {
                    layer.contents_need_update = false;
                }
            }
            if let Some(err) = &lookup.error {
                if let Some(delegate) = &delegate {
                    delegate.contents_failed_to_update(draw.layer, err);
                }
            }
            planes = lookup.planes;
        }

        let mut cx = FilterContext::new(
            time,
            draw.opacity,
            draw.layer_size,
            &self.caps,
            &planes,
            draw.mask.as_ref(),
            mask_needs_update,
            &mut self.textures,
            &mut *backend,
        );
        filter.borrow_mut().prepare(&mut cx);
        let bindings = cx.into_bindings();

        if bindings.mask_consumed {
            if let Some(layer) = tree.get_mut(draw.layer) {
                layer.mask_needs_update = false;
            }
        }
        if bindings.skip {
            return;
        }

        let benchmark = filter.borrow().benchmark();
        if benchmark {
            self.timer.start(backend, TimerTarget::Filter(filter.clone()));
        }

        if self.active_program != Some(program) {
            backend.bind_program(program);
            self.active_program = Some(program);
        }

        let mut uniforms = LayerUniforms::new(&draw.projection, &draw.model, draw.opacity, time);
        uniforms.resolution = [
            draw.layer_size.width / self.scale,
            draw.layer_size.height / self.scale,
        ];
        let target_size = self.current_target_size();
        uniforms.target_size = [target_size.width as f32, target_size.height as f32];
        uniforms.texcoord_from_position = u32::from(draw.use_position);

        let vertices;
        let geometry = match &bindings.points {
            Some(points) => Geometry::PointSprites(points),
            None => {
                vertices = quad_vertices(&draw.frame, &draw.content_rect);
                Geometry::Quad(&vertices)
            }
        };

        let (target, blend) = match self.targets.last_mut() {
            Some(top) => {
                let blend = if top.fresh {
                    BlendMode::Replace
                } else {
                    BlendMode::SourceOver
                };
                top.fresh = false;
                (Some(top.target.target), blend)
            }
            None => (None, BlendMode::SourceOver),
        };

        let call = DrawCall {
            target,
            blend,
            uniforms,
            geometry,
            texture: planes.first().copied(),
            mask: bindings.mask,
            params: &bindings.params,
        };
        tracing::trace!("draw {:?} layer {:?} into {:?}", filter, draw.layer, target);
        if let Err(err) = backend.draw(&call) {
            tracing::error!("Draw with {:?} failed: {}", filter, err);
        }
        if self.config.check_errors {
            if let Some(err) = backend.take_error() {
                tracing::error!("Draw with {:?} raised: {}", filter, err);
            }
        }

        if benchmark {
            let frames = self.timer.stop(backend);
            self.deliver_frame_timings(frames);
        }
    }

    // Queries

    /// Visibility of every drawable layer as the next frame would see it
    pub fn visible_set(&self, tree: &LayerTree) -> VisibleSet {
        compute_visible_set(tree, tree.root(), self.logical_size())
    }

    /// Opaque layers that hide `layer`, an ancestor of it or a descendant of it
    pub fn layers_obscuring_layer(&self, tree: &LayerTree, layer: LayerId) -> Vec<LayerId> {
        self.visible_set(tree).layers_obscuring(tree, layer)
    }

    pub fn will_layer_be_rendered(&self, tree: &LayerTree, layer: LayerId) -> bool {
        self.layers_obscuring_layer(tree, layer).is_empty()
    }

    // Resources

    /// Show `source`'s uploaded contents in `dest` without uploading them
    /// again. Returns false when the source has nothing uploaded yet.
    pub fn copy_texture_from_layer_to_layer(
        &mut self,
        backend: &mut dyn RenderBackend,
        tree: &mut LayerTree,
        source: LayerId,
        dest: LayerId,
    ) -> bool {
        let Some(source_contents) = tree.get(source).and_then(|l| l.contents().cloned()) else {
            return false;
        };
        let Some(planes) = self.textures.planes(source_contents.id()).map(Planes::from_slice) else {
            return false;
        };
        let Some(layer) = tree.get_mut(dest) else {
            return false;
        };
        let Some(dest_contents) = layer.contents().cloned() else {
            return false;
        };
        layer.contents_need_update = false;
        self.textures.alias(backend, &dest_contents, &planes);
        true
    }

    /// The device was lost; drawing stops until
    /// [`context_restored`](Self::context_restored)
    pub fn context_lost(&mut self) {
        if !self.context_lost {
            tracing::warn!("GPU context lost, suspending rendering");
        }
        self.context_lost = true;
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    /// Forget every GPU object of the lost device; caches refill lazily on
    /// the next frame. Layers keep their mask filters.
    pub fn context_restored(&mut self, backend: &dyn RenderBackend) {
        tracing::info!("GPU context restored, rebuilding resources lazily");
        self.pool.forget();
        self.textures.forget();
        self.programs.forget();
        self.timer.forget();
        self.targets.clear();
        self.active_program = None;
        self.caps = Self::effective_capabilities(backend, &self.config);
        self.pixel_size = backend.output_size();
        self.rebuild_projection();
        self.context_lost = false;
    }

    /// Destroy every pooled target, texture and program
    pub fn release_resources(&mut self, backend: &mut dyn RenderBackend) {
        self.pool.clear(backend);
        self.textures.clear(backend);
        self.programs.clear(backend);
        self.timer.clear(backend);
        self.active_program = None;
    }

    pub fn stats(&self) -> CompositorStats {
        CompositorStats {
            pool: self.pool.stats(),
            textures: self.textures.stats(),
            programs: self.programs.stats(),
            timer: self.timer.stats(),
        }
    }
}
