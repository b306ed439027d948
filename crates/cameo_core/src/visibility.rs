//! Per-frame visibility and occlusion pass
//!
//! Collects every drawable layer (contents or at least one filter) in draw
//! order with its clipped, integral screen box, then marks layers whose box
//! is covered by an opaque, fully opaque-drawn layer above them. The check is
//! quadratic in the number of drawable layers.

use crate::geometry::{Mat4, Point, Rect, Size};
use crate::layer::{LayerId, LayerTree};

/// One drawable layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleEntry {
    pub layer: LayerId,
    /// Clipped to the output and made integral, in root coordinates
    pub screen_box: Rect,
    /// Product of the opacities from the root down to this layer
    pub opacity: f32,
    pub visible: bool,
    /// Topmost layer found to cover this one
    pub obscured_by: Option<LayerId>,
}

/// Drawable layers in draw order (bottom first)
#[derive(Clone, Debug, Default)]
pub struct VisibleSet {
    entries: Vec<VisibleEntry>,
}

impl VisibleSet {
    pub fn entries(&self) -> &[VisibleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, layer: LayerId) -> Option<&VisibleEntry> {
        self.entries.iter().find(|e| e.layer == layer)
    }

    /// Layers skipped this frame because something covers them
    pub fn culled(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.entries.iter().filter(|e| !e.visible).map(|e| e.layer)
    }

    /// Layers covering `layer`, one of its ancestors or one of its descendants
    pub fn layers_obscuring(&self, tree: &LayerTree, layer: LayerId) -> Vec<LayerId> {
        self.entries
            .iter()
            .filter(|e| !e.visible)
            .filter(|e| tree.is_ancestor_of(layer, e.layer) || tree.is_ancestor_of(e.layer, layer))
            .filter_map(|e| e.obscured_by)
            .collect()
    }
}

/// Walk the tree below `root` and classify every drawable layer against an
/// output of `output_size` logical units
pub fn compute_visible_set(tree: &LayerTree, root: LayerId, output_size: Size) -> VisibleSet {
    let bounds = Rect::new(0.0, 0.0, output_size.width, output_size.height);
    let mut entries = Vec::new();
    collect(tree, root, &Mat4::IDENTITY, 1.0, &bounds, &mut entries);
    mark_obscured(tree, &mut entries);
    VisibleSet { entries }
}

fn collect(
    tree: &LayerTree,
    id: LayerId,
    parent_model: &Mat4,
    parent_opacity: f32,
    bounds: &Rect,
    out: &mut Vec<VisibleEntry>,
) {
    let Some(layer) = tree.get(id) else {
        return;
    };
    let opacity = parent_opacity * layer.opacity;
    if layer.hidden || opacity <= 0.0 {
        return;
    }

    let model = parent_model.mul(&layer.model());
    if layer.contents().is_some() || !layer.filters().is_empty() {
        let size = layer.size;
        let top_left = model.transform_point(Point::ZERO);
        let bottom_right = model.transform_point(Point::new(size.width, size.height));
        let screen_box = Rect::from_points(top_left, bottom_right)
            .intersection(bounds)
            .integral();
        out.push(VisibleEntry {
            layer: id,
            screen_box,
            opacity,
            visible: true,
            obscured_by: None,
        });
    }

    for &sublayer in layer.sublayers() {
        collect(tree, sublayer, &model, opacity, bounds, out);
    }
}

fn mark_obscured(tree: &LayerTree, entries: &mut [VisibleEntry]) {
    for top in (0..entries.len()).rev() {
        let candidate = entries[top];
        if !candidate.visible || candidate.opacity < 1.0 {
            continue;
        }
        if !tree.get(candidate.layer).is_some_and(|l| l.opaque) {
            continue;
        }
        for bottom in entries[..top].iter_mut() {
            if bottom.screen_box == candidate.screen_box
                || candidate.screen_box.contains_rect(&bottom.screen_box)
            {
                bottom.visible = false;
                bottom.obscured_by = Some(candidate.layer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::content::ImageContent;
    use crate::geometry::PixelSize;
    use crate::layer::Layer;

    fn opaque_layer(frame: Rect, opacity: f32) -> Layer {
        let mut layer = Layer::with_frame(frame);
        layer.set_contents(Some(Rc::new(ImageContent::solid(PixelSize::new(4, 4), [0, 0, 0, 255]))));
        layer.opaque = true;
        layer.opacity = opacity;
        layer
    }

    fn stack(opacity: f32) -> (LayerTree, [LayerId; 3]) {
        let mut tree = LayerTree::new();
        let root = tree.root();
        tree[root].set_frame(Rect::new(0.0, 0.0, 100.0, 100.0));
        let frame = Rect::new(10.0, 10.0, 50.0, 50.0);
        let ids = [(); 3].map(|_| tree.insert(opaque_layer(frame, opacity)));
        for id in ids {
            tree.add_sublayer(root, id);
        }
        (tree, ids)
    }

    #[test]
    fn test_stacked_opaque_layers_hide_lower_ones() {
        let (tree, [a, b, c]) = stack(1.0);
        let set = compute_visible_set(&tree, tree.root(), Size::new(100.0, 100.0));
        assert_eq!(set.len(), 3);
        assert!(!set.entry(a).unwrap().visible);
        assert!(!set.entry(b).unwrap().visible);
        assert!(set.entry(c).unwrap().visible);
        assert_eq!(set.entry(a).unwrap().obscured_by, Some(c));
    }

    #[test]
    fn test_translucent_layers_hide_nothing() {
        let (tree, _) = stack(0.5);
        let set = compute_visible_set(&tree, tree.root(), Size::new(100.0, 100.0));
        assert_eq!(set.culled().count(), 0);
    }

    #[test]
    fn test_boxes_are_clipped_and_integral() {
        let mut tree = LayerTree::new();
        let root = tree.root();
        let layer = tree.insert(opaque_layer(Rect::new(-10.5, 20.25, 50.0, 200.0), 1.0));
        tree.add_sublayer(root, layer);
        let set = compute_visible_set(&tree, root, Size::new(100.0, 100.0));
        assert_eq!(set.entry(layer).unwrap().screen_box, Rect::new(0.0, 20.0, 40.0, 80.0));
    }

    #[test]
    fn test_hidden_and_transparent_subtrees_skipped() {
        let mut tree = LayerTree::new();
        let root = tree.root();
        let group = tree.insert(Layer::new());
        let child = tree.insert(opaque_layer(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0));
        tree.add_sublayer(root, group);
        tree.add_sublayer(group, child);

        tree[group].opacity = 0.0;
        assert!(compute_visible_set(&tree, root, Size::new(10.0, 10.0)).is_empty());

        tree[group].opacity = 1.0;
        tree[group].hidden = true;
        assert!(compute_visible_set(&tree, root, Size::new(10.0, 10.0)).is_empty());
    }

    #[test]
    fn test_obscuring_queries_cover_ancestors_and_descendants() {
        let mut tree = LayerTree::new();
        let root = tree.root();
        let group = tree.insert(Layer::new());
        let covered = tree.insert(opaque_layer(Rect::new(10.0, 10.0, 10.0, 10.0), 1.0));
        let cover = tree.insert(opaque_layer(Rect::new(0.0, 0.0, 50.0, 50.0), 1.0));
        tree.add_sublayer(root, group);
        tree.add_sublayer(group, covered);
        tree.add_sublayer(root, cover);

        let set = compute_visible_set(&tree, root, Size::new(50.0, 50.0));
        assert_eq!(set.layers_obscuring(&tree, covered), vec![cover]);
        assert_eq!(set.layers_obscuring(&tree, group), vec![cover]);
        assert!(set.layers_obscuring(&tree, cover).is_empty());
    }
}
