//! Filter trait and shared filter handles
//!
//! A filter is a GPU program plus the hooks that feed it: one-time setup when
//! its program is first compiled, and per-draw preparation of its parameter
//! block, mask binding or custom geometry.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{Capabilities, ProgramId, RenderBackend, TextureId};
use crate::content::ContentRef;
use crate::geometry::Size;
use crate::shader::ProgramSource;
use crate::texture_cache::TextureCache;

/// Stable identity of a filter instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

impl FilterId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// How the program cache identifies a filter's program
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgramIdentity {
    /// One program per filter instance
    #[default]
    Instance,
    /// One program per distinct generated source; instances with identical
    /// configurations share it
    Source,
}

pub trait Filter: fmt::Debug {
    fn label(&self) -> &str;

    /// Vertex/fragment source pair. Called on every draw for
    /// [`ProgramIdentity::Source`] filters, so generated sources should be
    /// memoized until the configuration changes.
    fn program_source(&mut self, caps: &Capabilities) -> ProgramSource;

    fn program_identity(&self) -> ProgramIdentity {
        ProgramIdentity::Instance
    }

    /// Whether the filter changes what the layer's contents look like (as
    /// opposed to only compositing them). Such a filter with sublayers forces
    /// an offscreen pass.
    fn modifies_contents(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        true
    }

    /// One-time GPU setup after the filter's program is compiled
    fn initialize(&mut self, _backend: &mut dyn RenderBackend, _program: ProgramId) {}

    /// Per-draw uniform and resource binding
    fn prepare(&mut self, _cx: &mut FilterContext<'_>) {}

    /// Request GPU timing of this filter's draws
    fn benchmark(&self) -> bool {
        false
    }

    /// Elapsed GPU time of one draw, delivered frames later
    fn benchmark_result(&mut self, _milliseconds: f64) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handle to a filter
///
/// Layers, content sources and the compositor hold clones; identity is the
/// [`FilterId`] assigned at creation.
#[derive(Clone)]
pub struct FilterRef {
    id: FilterId,
    inner: Rc<RefCell<dyn Filter>>,
}

impl FilterRef {
    pub fn new<F: Filter + 'static>(filter: F) -> Self {
        Self::from_shared(Rc::new(RefCell::new(filter)))
    }

    /// Wrap a filter the caller keeps a typed handle to, e.g. to change its
    /// configuration between frames
    pub fn from_shared<F: Filter + 'static>(filter: Rc<RefCell<F>>) -> Self {
        Self {
            id: FilterId::next(),
            inner: filter,
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, dyn Filter> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Filter> {
        self.inner.borrow_mut()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.borrow().is_enabled()
    }

    pub fn modifies_contents(&self) -> bool {
        self.inner.borrow().modifies_contents()
    }
}

impl PartialEq for FilterRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FilterRef {}

impl fmt::Debug for FilterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(filter) => write!(f, "FilterRef({}, {})", self.id.0, filter.label()),
            Err(_) => write!(f, "FilterRef({}, <borrowed>)", self.id.0),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-Draw Context
// ─────────────────────────────────────────────────────────────────────────────

/// Resources a filter bound for one draw
#[derive(Debug, Default)]
pub(crate) struct FilterBindings {
    pub params: Vec<u8>,
    pub mask: Option<TextureId>,
    pub points: Option<Vec<[f32; 3]>>,
    pub skip: bool,
    pub mask_consumed: bool,
}

/// Handed to [`Filter::prepare`] for each draw
pub struct FilterContext<'a> {
    /// Seconds since the timeline origin
    pub time: f32,
    pub opacity: f32,
    /// Size of the drawn layer in logical units
    pub layer_size: Size,
    pub caps: &'a Capabilities,
    planes: &'a [TextureId],
    mask: Option<&'a ContentRef>,
    mask_needs_update: bool,
    textures: &'a mut TextureCache,
    backend: &'a mut dyn RenderBackend,
    pub(crate) bindings: FilterBindings,
}

impl<'a> FilterContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        time: f32,
        opacity: f32,
        layer_size: Size,
        caps: &'a Capabilities,
        planes: &'a [TextureId],
        mask: Option<&'a ContentRef>,
        mask_needs_update: bool,
        textures: &'a mut TextureCache,
        backend: &'a mut dyn RenderBackend,
    ) -> Self {
        Self {
            time,
            opacity,
            layer_size,
            caps,
            planes,
            mask,
            mask_needs_update,
            textures,
            backend,
            bindings: FilterBindings::default(),
        }
    }

    /// Upload the parameter block bound at `@group(1) @binding(0)`
    pub fn set_params<T: bytemuck::Pod>(&mut self, params: &T) {
        self.bindings.params = bytemuck::bytes_of(params).to_vec();
    }

    /// Bind the drawn layer's mask source, uploading it if it changed.
    /// Returns false when the layer has no mask.
    pub fn bind_layer_mask(&mut self) -> bool {
        let Some(mask) = self.mask else {
            return false;
        };
        let lookup = self
            .textures
            .textures_for(&mut *self.backend, mask, self.mask_needs_update);
        self.bindings.mask_consumed |= lookup.consumed;
        self.bindings.mask = lookup.primary();
        self.bindings.mask.is_some()
    }

    /// Bind any content source as the mask texture. Returns true once the
    /// source's pixels were consumed, after which the caller may clear its
    /// own dirty flag.
    pub fn bind_mask(&mut self, source: &ContentRef, needs_update: bool) -> bool {
        let lookup = self
            .textures
            .textures_for(&mut *self.backend, source, needs_update);
        self.bindings.mask = lookup.primary();
        lookup.consumed
    }

    /// Textures of the drawn contents; planar sources have more than one
    pub fn content_planes(&self) -> &[TextureId] {
        self.planes
    }

    /// Bind an already uploaded texture, e.g. a second content plane, in the
    /// mask slot
    pub fn bind_mask_texture(&mut self, texture: TextureId) {
        self.bindings.mask = Some(texture);
    }

    /// Replace the quad with instanced point sprites (x, y, t)
    pub fn draw_point_sprites(&mut self, points: Vec<[f32; 3]>) {
        self.bindings.points = Some(points);
    }

    /// Draw nothing for this layer
    pub fn skip_draw(&mut self) {
        self.bindings.skip = true;
    }

    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        &mut *self.backend
    }

    pub(crate) fn into_bindings(self) -> FilterBindings {
        self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::PassThroughFilter;

    #[test]
    fn test_filter_ref_identity() {
        let a = FilterRef::new(PassThroughFilter::new());
        let b = FilterRef::new(PassThroughFilter::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_shared_filter_is_mutable_through_typed_handle() {
        let typed = Rc::new(RefCell::new(PassThroughFilter::new()));
        let handle = FilterRef::from_shared(typed.clone());
        typed.borrow_mut().set_enabled(false);
        assert!(!handle.is_enabled());
    }
}
