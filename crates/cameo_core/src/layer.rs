//! Retained layer tree
//!
//! Layers live in a [`SlotMap`] owned by [`LayerTree`] and reference each
//! other by [`LayerId`]. Sublayer order is draw order (back to front) and is
//! kept sorted by `z_index` whenever a sublayer is inserted or its z-index
//! changes, so the compositor never sorts.
//!
//! The owner changes layer state between frames and raises the dirty flags
//! (`contents_need_update`, `mask_needs_update`) itself.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::content::{ContentRef, LayerDelegate};
use crate::filter::FilterRef;
use crate::filters::RoundRectFilter;
use crate::geometry::{Mat4, Point, Rect, Size};

new_key_type! {
    /// Handle to a layer in a [`LayerTree`]
    pub struct LayerId;
}

pub type Sublayers = SmallVec<[LayerId; 4]>;

// ─────────────────────────────────────────────────────────────────────────────
// Layer
// ─────────────────────────────────────────────────────────────────────────────

pub struct Layer {
    /// Center of the frame in the superlayer's space
    pub position: Point,
    pub size: Size,
    anchor_point: Point,
    pub transform: Mat4,
    pub opacity: f32,
    pub hidden: bool,
    /// Carried for hit testing by the owner; the compositor ignores it
    pub user_interaction_enabled_when_hidden: bool,
    /// Contents fully cover the frame with no transparency
    pub opaque: bool,
    pub z_index: i32,
    /// Derive texture coordinates from the clip-space position instead of
    /// the content rect
    pub use_position_for_coordinate: bool,

    contents: Option<ContentRef>,
    pub contents_need_update: bool,
    content_rect: Rect,

    filters: Vec<FilterRef>,
    corner_radius: f32,
    corner_filter: Option<Rc<RefCell<RoundRectFilter>>>,
    corner_filter_ref: Option<FilterRef>,

    mask: Option<ContentRef>,
    pub mask_needs_update: bool,
    pub(crate) mask_filter: Option<FilterRef>,

    delegate: Option<Rc<dyn LayerDelegate>>,

    superlayer: Option<LayerId>,
    sublayers: Sublayers,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            size: Size::ZERO,
            anchor_point: Point::new(0.5, 0.5),
            transform: Mat4::IDENTITY,
            opacity: 1.0,
            hidden: false,
            user_interaction_enabled_when_hidden: false,
            opaque: false,
            z_index: 0,
            use_position_for_coordinate: false,
            contents: None,
            contents_need_update: false,
            content_rect: Rect::UNIT,
            filters: Vec::new(),
            corner_radius: 0.0,
            corner_filter: None,
            corner_filter_ref: None,
            mask: None,
            mask_needs_update: false,
            mask_filter: None,
            delegate: None,
            superlayer: None,
            sublayers: Sublayers::new(),
        }
    }
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer covering `frame` in its superlayer's space
    pub fn with_frame(frame: Rect) -> Self {
        let mut layer = Self::default();
        layer.set_frame(frame);
        layer
    }

    // Geometry

    pub fn frame(&self) -> Rect {
        Rect::new(
            self.position.x - self.size.width / 2.0,
            self.position.y - self.size.height / 2.0,
            self.size.width,
            self.size.height,
        )
    }

    pub fn set_frame(&mut self, frame: Rect) {
        self.size = frame.size;
        self.position = frame.center();
    }

    pub fn anchor_point(&self) -> Point {
        self.anchor_point
    }

    /// Point the transform pivots around, in unit coordinates of the frame
    pub fn set_anchor_point(&mut self, anchor: Point) {
        self.anchor_point = Point::new(anchor.x.clamp(0.0, 1.0), anchor.y.clamp(0.0, 1.0));
    }

    /// Maps layer-local coordinates `(0,0)..size` into the superlayer's space
    pub fn model(&self) -> Mat4 {
        let frame = self.frame();
        let origin = Mat4::translation(frame.x(), frame.y(), 0.0);
        if self.transform.is_identity() {
            return origin;
        }
        let ax = frame.width() * self.anchor_point.x;
        let ay = frame.height() * self.anchor_point.y;
        origin
            .mul(&Mat4::translation(ax, ay, 0.0))
            .mul(&self.transform)
            .mul(&Mat4::translation(-ax, -ay, 0.0))
    }

    /// Axis-aligned bounds of the transformed frame in the superlayer's space
    pub fn bounding_box(&self) -> Rect {
        let model = self.model();
        let size = self.size;
        let corners = [
            Point::ZERO,
            Point::new(size.width, 0.0),
            Point::new(0.0, size.height),
            Point::new(size.width, size.height),
        ]
        .map(|p| model.transform_point(p));
        let (mut min, mut max) = (corners[0], corners[0]);
        for p in &corners[1..] {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        Rect::from_points(min, max)
    }

    /// Intrinsic size of the contents, falling back to the layer size
    pub fn natural_size(&self) -> Size {
        self.contents
            .as_ref()
            .and_then(|c| c.natural_size())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.size)
    }

    // Contents

    pub fn contents(&self) -> Option<&ContentRef> {
        self.contents.as_ref()
    }

    /// Replace the contents and mark them for upload
    pub fn set_contents(&mut self, contents: Option<ContentRef>) {
        self.contents = contents;
        self.contents_need_update = true;
    }

    /// Region of the contents sampled, in unit coordinates
    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn set_content_rect(&mut self, rect: Rect) {
        self.content_rect = rect;
    }

    pub fn content_center(&self) -> Point {
        self.content_rect.center()
    }

    pub fn set_content_center(&mut self, center: Point) {
        let size = self.content_rect.size;
        self.content_rect = Rect::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        );
    }

    pub fn set_content_size(&mut self, size: Size) {
        let center = self.content_rect.center();
        self.content_rect = Rect::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        );
    }

    pub fn delegate(&self) -> Option<&Rc<dyn LayerDelegate>> {
        self.delegate.as_ref()
    }

    pub fn set_delegate(&mut self, delegate: Option<Rc<dyn LayerDelegate>>) {
        self.delegate = delegate;
    }

    // Mask

    pub fn mask(&self) -> Option<&ContentRef> {
        self.mask.as_ref()
    }

    /// Replace the alpha mask and mark it for upload
    pub fn set_mask(&mut self, mask: Option<ContentRef>) {
        self.mask = mask;
        self.mask_needs_update = true;
    }

    /// Mask filter instance the compositor created for this layer, if any
    pub fn mask_filter(&self) -> Option<&FilterRef> {
        self.mask_filter.as_ref()
    }

    // Filters

    pub fn filters(&self) -> &[FilterRef] {
        &self.filters
    }

    /// Replace the filter list; the corner radius filter, when present, stays
    /// last
    pub fn set_filters(&mut self, filters: Vec<FilterRef>) {
        self.filters = filters;
        if let Some(corner) = &self.corner_filter_ref {
            self.filters.retain(|f| f != corner);
            self.filters.push(corner.clone());
        }
    }

    pub fn add_filter(&mut self, filter: FilterRef) {
        if !self.filters.contains(&filter) {
            let mut filters = std::mem::take(&mut self.filters);
            filters.push(filter);
            self.set_filters(filters);
        }
    }

    pub fn remove_filter(&mut self, filter: &FilterRef) {
        self.filters.retain(|f| f != filter);
    }

    pub fn corner_radius(&self) -> f32 {
        self.corner_radius
    }

    /// Round the layer's corners; radius is a fraction of half the shorter
    /// side, clamped to 0..=1. Zero removes the rounding filter.
    pub fn set_corner_radius(&mut self, radius: f32) {
        let radius = radius.clamp(0.0, 1.0);
        if radius == self.corner_radius {
            return;
        }
        self.corner_radius = radius;

        if radius == 0.0 {
            if let Some(corner) = self.corner_filter_ref.take() {
                self.remove_filter(&corner);
            }
            self.corner_filter = None;
            return;
        }

        match &self.corner_filter {
            Some(filter) => filter.borrow_mut().set_corner_radius(radius),
            None => {
                let filter = Rc::new(RefCell::new(RoundRectFilter::new(radius)));
                let handle = FilterRef::from_shared(filter.clone());
                self.corner_filter = Some(filter);
                self.corner_filter_ref = Some(handle.clone());
                self.add_filter(handle);
            }
        }
    }

    // Hierarchy

    pub fn superlayer(&self) -> Option<LayerId> {
        self.superlayer
    }

    pub fn sublayers(&self) -> &[LayerId] {
        &self.sublayers
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("frame", &self.frame())
            .field("opacity", &self.opacity)
            .field("hidden", &self.hidden)
            .field("contents", &self.contents.as_ref().map(|c| c.id()))
            .field("filters", &self.filters)
            .field("sublayers", &self.sublayers.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layer Tree
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every layer; created with an empty root layer
pub struct LayerTree {
    layers: SlotMap<LayerId, Layer>,
    root: LayerId,
}

impl Default for LayerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerTree {
    pub fn new() -> Self {
        let mut layers = SlotMap::with_key();
        let root = layers.insert(Layer::new());
        Self { layers, root }
    }

    pub fn root(&self) -> LayerId {
        self.root
    }

    /// Add a detached layer; attach it with [`add_sublayer`](Self::add_sublayer)
    pub fn insert(&mut self, layer: Layer) -> LayerId {
        self.layers.insert(layer)
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn sublayers(&self, id: LayerId) -> &[LayerId] {
        self.layers.get(id).map(|l| l.sublayers()).unwrap_or(&[])
    }

    pub fn superlayer(&self, id: LayerId) -> Option<LayerId> {
        self.layers.get(id).and_then(|l| l.superlayer)
    }

    /// Append `child` on top of `parent`'s sublayers (subject to z-index)
    pub fn add_sublayer(&mut self, parent: LayerId, child: LayerId) {
        let index = self.sublayers(parent).len();
        self.insert_sublayer_at(parent, child, index);
    }

    /// Insert `child` directly below `sibling`, or on top when `sibling` is
    /// not a sublayer of `parent`
    pub fn insert_sublayer_before(&mut self, parent: LayerId, child: LayerId, sibling: LayerId) {
        let sublayers = self.sublayers(parent);
        let index = sublayers
            .iter()
            .position(|&s| s == sibling)
            .unwrap_or(sublayers.len());
        self.insert_sublayer_at(parent, child, index);
    }

    fn insert_sublayer_at(&mut self, parent: LayerId, child: LayerId, index: usize) {
        if parent == child
            || !self.layers.contains_key(parent)
            || !self.layers.contains_key(child)
            || self.is_ancestor_of(child, parent)
        {
            tracing::warn!("Refusing to insert layer {:?} under {:?}", child, parent);
            return;
        }

        let previous = self.superlayer(child);
        if let Some(previous) = previous.filter(|&p| p != parent) {
            self.detach(previous, child);
        }

        let mut index = index;
        if let Some(layer) = self.layers.get_mut(parent) {
            if let Some(current) = layer.sublayers.iter().position(|&s| s == child) {
                layer.sublayers.remove(current);
                if current < index {
                    index -= 1;
                }
            }
            let index = index.min(layer.sublayers.len());
            layer.sublayers.insert(index, child);
        }
        if let Some(layer) = self.layers.get_mut(child) {
            layer.superlayer = Some(parent);
        }
        self.sort_sublayers(parent);
    }

    fn detach(&mut self, parent: LayerId, child: LayerId) {
        if let Some(layer) = self.layers.get_mut(parent) {
            layer.sublayers.retain(|s| *s != child);
        }
        if let Some(layer) = self.layers.get_mut(child) {
            if layer.superlayer == Some(parent) {
                layer.superlayer = None;
            }
        }
    }

    /// Detach a layer from its superlayer; it stays in the tree
    pub fn remove_from_superlayer(&mut self, id: LayerId) {
        if let Some(parent) = self.superlayer(id) {
            self.detach(parent, id);
        }
    }

    /// Remove a layer and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        if id == self.root {
            return None;
        }
        self.remove_from_superlayer(id);
        let mut stack: Vec<LayerId> = self.sublayers(id).to_vec();
        while let Some(next) = stack.pop() {
            if let Some(layer) = self.layers.remove(next) {
                stack.extend(layer.sublayers.iter().copied());
            }
        }
        self.layers.remove(id)
    }

    pub fn set_z_index(&mut self, id: LayerId, z_index: i32) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.z_index = z_index;
        }
        if let Some(parent) = self.superlayer(id) {
            self.sort_sublayers(parent);
        }
    }

    /// Stable sort by z-index; equal indices keep insertion order
    fn sort_sublayers(&mut self, parent: LayerId) {
        let Some(mut sublayers) = self.layers.get_mut(parent).map(|l| std::mem::take(&mut l.sublayers)) else {
            return;
        };
        let layers = &self.layers;
        sublayers.sort_by_key(|id| layers.get(*id).map(|l| l.z_index).unwrap_or(0));
        if let Some(layer) = self.layers.get_mut(parent) {
            layer.sublayers = sublayers;
        }
    }

    /// Whether `ancestor` is `id` or one of its superlayers
    pub fn is_ancestor_of(&self, ancestor: LayerId, id: LayerId) -> bool {
        let mut current = Some(id);
        while let Some(layer) = current {
            if layer == ancestor {
                return true;
            }
            current = self.superlayer(layer);
        }
        false
    }

    /// Transform from `id`'s local space to the root's space
    pub fn world_model(&self, id: LayerId) -> Mat4 {
        let mut model = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(layer_id) = current {
            let Some(layer) = self.layers.get(layer_id) else {
                break;
            };
            model = layer.model().mul(&model);
            current = layer.superlayer;
        }
        model
    }

    /// Depth-first, back to front, starting at `id`
    pub fn descendants(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        let mut stack: Vec<LayerId> = self.sublayers(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.sublayers(next).iter().rev().copied());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter()
    }
}

impl std::ops::Index<LayerId> for LayerTree {
    type Output = Layer;

    fn index(&self, id: LayerId) -> &Layer {
        &self.layers[id]
    }
}

impl std::ops::IndexMut<LayerId> for LayerTree {
    fn index_mut(&mut self, id: LayerId) -> &mut Layer {
        &mut self.layers[id]
    }
}
