//! The owning document: canvas size, frame range, and the layer arena.

use crate::error::{LayerError, LayerResult};
use crate::layer::{Layer, LayerFlags, LayerId, LayerKind};
use raster::Cel;
use slotmap::SlotMap;
use smallvec::SmallVec;

/// A sprite document.
///
/// The sprite owns every layer for the layer's whole lifetime: layers are
/// created through the sprite's factory methods and addressed by `LayerId`
/// handles scoped to this sprite's arena. The tree hangs off a root folder
/// created at construction.
#[derive(Clone, Debug)]
pub struct Sprite {
    width: u32,
    height: u32,
    frames: u32,
    active_frame: u32,
    layers: SlotMap<LayerId, Layer>,
    root: LayerId,
}

/// Owned snapshot of a subtree, used to decouple the read and write halves
/// of a deep copy.
struct CopyNode {
    name: String,
    flags: LayerFlags,
    kind: CopyKind,
}

enum CopyKind {
    Image {
        blend_mode: raster::BlendMode,
        cels: Vec<Cel>,
    },
    Folder {
        children: Vec<CopyNode>,
    },
}

impl Sprite {
    pub fn new(width: u32, height: u32, frames: u32) -> Self {
        let mut layers = SlotMap::with_key();
        let root = layers.insert(Layer::new_folder("Root"));
        Self {
            width,
            height,
            frames: frames.max(1),
            active_frame: 0,
            layers,
            root,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of frames in the document's timeline.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn set_frames(&mut self, frames: u32) {
        self.frames = frames.max(1);
        self.active_frame = self.active_frame.min(self.frames - 1);
    }

    pub fn active_frame(&self) -> u32 {
        self.active_frame
    }

    pub fn set_active_frame(&mut self, frame: u32) {
        self.active_frame = frame.min(self.frames - 1);
    }

    /// The root folder. It is permanently attached and cannot be removed.
    pub fn root(&self) -> LayerId {
        self.root
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id)
    }

    /// Iterate over every registered layer, attached or not.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Create a detached image layer registered to this sprite.
    pub fn create_image_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.layers.insert(Layer::new_image(name))
    }

    /// Create a detached folder registered to this sprite.
    pub fn create_folder(&mut self, name: impl Into<String>) -> LayerId {
        self.layers.insert(Layer::new_folder(name))
    }

    /// Append a detached layer as the topmost child of a folder.
    pub fn add_layer(&mut self, folder: LayerId, layer: LayerId) -> LayerResult<()> {
        let node = self.layers.get(layer).ok_or(LayerError::NotFound)?;
        if node.parent().is_some() || layer == self.root {
            return Err(LayerError::AlreadyParented);
        }
        // Attaching a folder above one of its own descendants would close a
        // cycle; the ancestor chain of the target must not reach the layer.
        let mut cursor = Some(folder);
        while let Some(id) = cursor {
            if id == layer {
                return Err(LayerError::AlreadyParented);
            }
            cursor = self.layers.get(id).ok_or(LayerError::NotFound)?.parent();
        }

        let target = self.layers.get_mut(folder).ok_or(LayerError::NotFound)?;
        let children = target
            .children_mut()
            .ok_or(LayerError::InvalidLayerKind)?;
        children.push(layer);
        self.layers[layer].set_parent(Some(folder));
        Ok(())
    }

    /// Detach a direct child from a folder without destroying it.
    pub fn remove_layer(&mut self, folder: LayerId, layer: LayerId) -> LayerResult<()> {
        let target = self.layers.get_mut(folder).ok_or(LayerError::NotFound)?;
        let children = target
            .children_mut()
            .ok_or(LayerError::InvalidLayerKind)?;
        let pos = children
            .iter()
            .position(|&id| id == layer)
            .ok_or(LayerError::NotFound)?;
        children.remove(pos);
        self.layers[layer].set_parent(None);
        Ok(())
    }

    /// Detach a layer and drop its whole subtree from the arena.
    ///
    /// Cels are destroyed with their layers; the root cannot be destroyed.
    pub fn destroy_layer(&mut self, layer: LayerId) -> LayerResult<()> {
        if layer == self.root {
            return Err(LayerError::NotFound);
        }
        let parent = self.layers.get(layer).ok_or(LayerError::NotFound)?.parent();
        if let Some(parent) = parent {
            self.remove_layer(parent, layer)?;
        }

        let mut doomed = vec![layer];
        let mut i = 0;
        while i < doomed.len() {
            if let Some(node) = self.layers.get(doomed[i]) {
                doomed.extend_from_slice(node.children());
            }
            i += 1;
        }
        tracing::debug!("destroying {} layer(s)", doomed.len());
        for id in doomed {
            self.layers.remove(id);
        }
        Ok(())
    }

    /// Reposition a direct child immediately after `after` in paint order.
    ///
    /// `after = None` moves the child to the bottom of the stack. The
    /// relative order of all other children is preserved.
    pub fn move_layer(
        &mut self,
        folder: LayerId,
        layer: LayerId,
        after: Option<LayerId>,
    ) -> LayerResult<()> {
        let target = self.layers.get_mut(folder).ok_or(LayerError::NotFound)?;
        let children = target
            .children_mut()
            .ok_or(LayerError::InvalidLayerKind)?;

        let pos = children
            .iter()
            .position(|&id| id == layer)
            .ok_or(LayerError::NotFound)?;
        if let Some(after) = after {
            if !children.contains(&after) {
                return Err(LayerError::NotFound);
            }
            if after == layer {
                return Ok(());
            }
        }

        children.remove(pos);
        let insert_at = match after {
            None => 0,
            Some(after) => {
                // recomputed after the removal shifted positions
                children
                    .iter()
                    .position(|&id| id == after)
                    .map(|p| p + 1)
                    .unwrap_or(children.len())
            }
        };
        children.insert(insert_at, layer);
        Ok(())
    }

    /// Sibling below `layer` in paint order, if any.
    pub fn prev_sibling(&self, layer: LayerId) -> Option<LayerId> {
        let parent = self.layers.get(layer)?.parent()?;
        let children = self.layers.get(parent)?.children();
        let pos = children.iter().position(|&id| id == layer)?;
        pos.checked_sub(1).map(|p| children[p])
    }

    /// Sibling above `layer` in paint order, if any.
    pub fn next_sibling(&self, layer: LayerId) -> Option<LayerId> {
        let parent = self.layers.get(layer)?.parent()?;
        let children = self.layers.get(parent)?.children();
        let pos = children.iter().position(|&id| id == layer)?;
        children.get(pos + 1).copied()
    }

    /// Gather every cel reachable from `layer`, depth first in child order.
    pub fn collect_cels(&self, layer: LayerId) -> Vec<&Cel> {
        let mut out = Vec::new();
        self.collect_cels_into(layer, &mut out);
        out
    }

    fn collect_cels_into<'a>(&'a self, layer: LayerId, out: &mut Vec<&'a Cel>) {
        let Some(node) = self.layers.get(layer) else {
            return;
        };
        match node.kind() {
            LayerKind::Image { cels, .. } => out.extend(cels.values()),
            LayerKind::Folder { children } => {
                for &child in children {
                    self.collect_cels_into(child, out);
                }
            }
        }
    }

    /// The document's background layer, if one exists.
    pub fn background(&self) -> Option<LayerId> {
        self.layers
            .iter()
            .find(|(_, layer)| layer.is_background())
            .map(|(id, _)| id)
    }

    /// Convert an image layer into the document's base layer.
    ///
    /// Idempotent. Clears the background flag from any previous holder,
    /// pins the layer in place, and forces every cel to full opacity at
    /// the canvas origin.
    pub fn configure_as_background(&mut self, layer: LayerId) -> LayerResult<()> {
        {
            let node = self.layers.get(layer).ok_or(LayerError::NotFound)?;
            if !node.is_image() {
                return Err(LayerError::InvalidLayerKind);
            }
        }

        let previous: SmallVec<[LayerId; 1]> = self
            .layers
            .iter()
            .filter(|(id, node)| *id != layer && node.is_background())
            .map(|(id, _)| id)
            .collect();
        for id in previous {
            tracing::debug!("clearing background flag from layer {:?}", id);
            self.layers[id].set_background(false);
        }

        let node = &mut self.layers[layer];
        node.set_background(true);
        node.set_moveable(false);
        if let Some(cels) = node.cels_mut() {
            for cel in cels.values_mut() {
                cel.set_opacity(255);
                cel.set_position(0, 0);
            }
        }
        Ok(())
    }

    /// Deep-copy a subtree into this sprite; the copy comes back detached.
    pub fn duplicate_layer(&mut self, layer: LayerId) -> LayerResult<LayerId> {
        let snapshot = self.snapshot(layer)?;
        Ok(self.graft(snapshot))
    }

    /// Deep-copy a subtree into another sprite's arena.
    ///
    /// The copy is isomorphic to the source (structure, names, flags, blend
    /// modes, cel frame sets) with freshly owned pixel buffers, and belongs
    /// to `dst` from then on. It comes back detached.
    pub fn duplicate_layer_for(&self, layer: LayerId, dst: &mut Sprite) -> LayerResult<LayerId> {
        let snapshot = self.snapshot(layer)?;
        Ok(dst.graft(snapshot))
    }

    fn snapshot(&self, layer: LayerId) -> LayerResult<CopyNode> {
        let node = self.layers.get(layer).ok_or(LayerError::NotFound)?;
        let kind = match node.kind() {
            LayerKind::Image { blend_mode, cels } => CopyKind::Image {
                blend_mode: *blend_mode,
                cels: cels.values().map(Cel::duplicate).collect(),
            },
            LayerKind::Folder { children } => CopyKind::Folder {
                children: children
                    .iter()
                    .map(|&child| self.snapshot(child))
                    .collect::<LayerResult<Vec<_>>>()?,
            },
        };
        Ok(CopyNode {
            name: node.name().to_string(),
            flags: node.flags(),
            kind,
        })
    }

    fn graft(&mut self, node: CopyNode) -> LayerId {
        match node.kind {
            CopyKind::Image { blend_mode, cels } => {
                let cels = cels.into_iter().map(|cel| (cel.frame(), cel)).collect();
                self.layers.insert(Layer::from_parts(
                    node.name,
                    node.flags,
                    LayerKind::Image { blend_mode, cels },
                ))
            }
            CopyKind::Folder { children } => {
                let child_ids: SmallVec<[LayerId; 4]> =
                    children.into_iter().map(|child| self.graft(child)).collect();
                let id = self.layers.insert(Layer::from_parts(
                    node.name,
                    node.flags,
                    LayerKind::Folder {
                        children: child_ids.clone(),
                    },
                ));
                for child in child_ids {
                    self.layers[child].set_parent(Some(id));
                }
                id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster::{BlendMode, Image};
    use std::sync::Arc;

    fn cel(frame: u32) -> Cel {
        Cel::new(frame, Arc::new(Image::new(2, 2)))
    }

    fn sprite_with_children(n: usize) -> (Sprite, Vec<LayerId>) {
        let mut sprite = Sprite::new(8, 8, 1);
        let layers: Vec<LayerId> = (0..n)
            .map(|i| {
                let id = sprite.create_image_layer(format!("layer{i}"));
                sprite.add_layer(sprite.root(), id).unwrap();
                id
            })
            .collect();
        (sprite, layers)
    }

    #[test]
    fn test_add_layer_sets_parent() {
        let (sprite, layers) = sprite_with_children(2);
        for &id in &layers {
            assert_eq!(sprite.layer(id).unwrap().parent(), Some(sprite.root()));
        }
        assert_eq!(sprite.layer(sprite.root()).unwrap().children(), &layers[..]);
    }

    #[test]
    fn test_add_layer_rejects_attached() {
        let (mut sprite, layers) = sprite_with_children(1);
        let folder = sprite.create_folder("f");
        sprite.add_layer(sprite.root(), folder).unwrap();
        assert_eq!(
            sprite.add_layer(folder, layers[0]),
            Err(LayerError::AlreadyParented)
        );
    }

    #[test]
    fn test_add_layer_rejects_cycle() {
        let mut sprite = Sprite::new(8, 8, 1);
        let outer = sprite.create_folder("outer");
        let inner = sprite.create_folder("inner");
        sprite.add_layer(outer, inner).unwrap();
        assert_eq!(
            sprite.add_layer(inner, outer),
            Err(LayerError::AlreadyParented)
        );
        let root = sprite.root();
        assert_eq!(sprite.add_layer(outer, root), Err(LayerError::AlreadyParented));
    }

    #[test]
    fn test_add_layer_rejects_image_target() {
        let (mut sprite, layers) = sprite_with_children(1);
        let other = sprite.create_image_layer("other");
        assert_eq!(
            sprite.add_layer(layers[0], other),
            Err(LayerError::InvalidLayerKind)
        );
    }

    #[test]
    fn test_remove_layer_detaches_only() {
        let (mut sprite, layers) = sprite_with_children(2);
        sprite.remove_layer(sprite.root(), layers[0]).unwrap();

        assert_eq!(sprite.layer(layers[0]).unwrap().parent(), None);
        assert_eq!(sprite.layer(sprite.root()).unwrap().children(), &[layers[1]]);
        // still registered, can be re-attached
        sprite.add_layer(sprite.root(), layers[0]).unwrap();
        assert_eq!(
            sprite.layer(sprite.root()).unwrap().children(),
            &[layers[1], layers[0]]
        );
    }

    #[test]
    fn test_remove_layer_not_a_child() {
        let (mut sprite, _) = sprite_with_children(1);
        let stray = sprite.create_image_layer("stray");
        assert_eq!(
            sprite.remove_layer(sprite.root(), stray),
            Err(LayerError::NotFound)
        );
    }

    #[test]
    fn test_destroy_layer_drops_subtree() {
        let mut sprite = Sprite::new(8, 8, 1);
        let folder = sprite.create_folder("f");
        let leaf = sprite.create_image_layer("leaf");
        sprite.add_layer(sprite.root(), folder).unwrap();
        sprite.add_layer(folder, leaf).unwrap();

        sprite.destroy_layer(folder).unwrap();
        assert!(sprite.layer(folder).is_none());
        assert!(sprite.layer(leaf).is_none());
        assert!(sprite.layer(sprite.root()).unwrap().children().is_empty());

        let root = sprite.root();
        assert_eq!(sprite.destroy_layer(root), Err(LayerError::NotFound));
    }

    #[test]
    fn test_move_layer_after() {
        let (mut sprite, layers) = sprite_with_children(4);
        let root = sprite.root();

        sprite.move_layer(root, layers[0], Some(layers[2])).unwrap();
        assert_eq!(
            sprite.layer(root).unwrap().children(),
            &[layers[1], layers[2], layers[0], layers[3]]
        );
    }

    #[test]
    fn test_move_layer_to_bottom() {
        let (mut sprite, layers) = sprite_with_children(3);
        let root = sprite.root();

        sprite.move_layer(root, layers[2], None).unwrap();
        assert_eq!(
            sprite.layer(root).unwrap().children(),
            &[layers[2], layers[0], layers[1]]
        );
    }

    #[test]
    fn test_move_layer_not_found() {
        let (mut sprite, layers) = sprite_with_children(2);
        let root = sprite.root();
        let stray = sprite.create_image_layer("stray");

        assert_eq!(
            sprite.move_layer(root, stray, None),
            Err(LayerError::NotFound)
        );
        assert_eq!(
            sprite.move_layer(root, layers[0], Some(stray)),
            Err(LayerError::NotFound)
        );
        // failed moves leave the order untouched
        assert_eq!(sprite.layer(root).unwrap().children(), &layers[..]);
    }

    #[test]
    fn test_sibling_navigation() {
        let (sprite, layers) = sprite_with_children(3);

        assert_eq!(sprite.prev_sibling(layers[0]), None);
        assert_eq!(sprite.prev_sibling(layers[1]), Some(layers[0]));
        assert_eq!(sprite.next_sibling(layers[1]), Some(layers[2]));
        assert_eq!(sprite.next_sibling(layers[2]), None);
        assert_eq!(sprite.prev_sibling(sprite.root()), None);
    }

    #[test]
    fn test_collect_cels_depth_first() {
        let mut sprite = Sprite::new(8, 8, 4);
        let folder = sprite.create_folder("f");
        let a = sprite.create_image_layer("a");
        let b = sprite.create_image_layer("b");
        sprite.add_layer(sprite.root(), a).unwrap();
        sprite.add_layer(sprite.root(), folder).unwrap();
        sprite.add_layer(folder, b).unwrap();

        sprite.layer_mut(a).unwrap().add_cel(cel(1)).unwrap();
        sprite.layer_mut(b).unwrap().add_cel(cel(0)).unwrap();
        sprite.layer_mut(b).unwrap().add_cel(cel(2)).unwrap();

        let root = sprite.root();
        let frames: Vec<u32> = sprite.collect_cels(root).iter().map(|c| c.frame()).collect();
        assert_eq!(frames, vec![1, 0, 2]);
    }

    #[test]
    fn test_background_is_unique() {
        let (mut sprite, layers) = sprite_with_children(2);

        sprite.configure_as_background(layers[0]).unwrap();
        assert_eq!(sprite.background(), Some(layers[0]));

        sprite.configure_as_background(layers[1]).unwrap();
        assert_eq!(sprite.background(), Some(layers[1]));
        assert!(!sprite.layer(layers[0]).unwrap().is_background());

        // idempotent
        sprite.configure_as_background(layers[1]).unwrap();
        assert_eq!(sprite.background(), Some(layers[1]));
    }

    #[test]
    fn test_background_pins_cels() {
        let (mut sprite, layers) = sprite_with_children(1);
        let mut placed = Cel::with_position(0, Arc::new(Image::new(2, 2)), 3, 4);
        placed.set_opacity(90);
        sprite.layer_mut(layers[0]).unwrap().add_cel(placed).unwrap();

        sprite.configure_as_background(layers[0]).unwrap();

        let layer = sprite.layer(layers[0]).unwrap();
        assert!(layer.is_background());
        assert!(!layer.is_moveable());
        let cel = layer.cel(0).unwrap();
        assert_eq!((cel.x(), cel.y()), (0, 0));
        assert_eq!(cel.opacity(), 255);
    }

    #[test]
    fn test_background_rejects_folder() {
        let mut sprite = Sprite::new(8, 8, 1);
        let folder = sprite.create_folder("f");
        assert_eq!(
            sprite.configure_as_background(folder),
            Err(LayerError::InvalidLayerKind)
        );
    }

    #[test]
    fn test_duplicate_layer_for_is_isomorphic() {
        let mut src = Sprite::new(8, 8, 3);
        let folder = src.create_folder("group");
        let leaf = src.create_image_layer("leaf");
        src.add_layer(src.root(), folder).unwrap();
        src.add_layer(folder, leaf).unwrap();
        src.layer_mut(leaf).unwrap().add_cel(cel(0)).unwrap();
        src.layer_mut(leaf).unwrap().add_cel(cel(2)).unwrap();
        src.layer_mut(leaf)
            .unwrap()
            .set_blend_mode(BlendMode::Multiply)
            .unwrap();
        src.layer_mut(leaf).unwrap().set_readable(false);

        let mut dst = Sprite::new(8, 8, 3);
        let copy = src.duplicate_layer_for(folder, &mut dst).unwrap();

        let copy_node = dst.layer(copy).unwrap();
        assert_eq!(copy_node.name(), "group");
        assert_eq!(copy_node.parent(), None);
        assert_eq!(copy_node.children().len(), 1);

        let copy_leaf = copy_node.children()[0];
        let leaf_node = dst.layer(copy_leaf).unwrap();
        assert_eq!(leaf_node.name(), "leaf");
        assert_eq!(leaf_node.parent(), Some(copy));
        assert_eq!(leaf_node.blend_mode(), Some(BlendMode::Multiply));
        assert!(!leaf_node.is_readable());
        let frames: Vec<u32> = leaf_node.cels().map(Cel::frame).collect();
        assert_eq!(frames, vec![0, 2]);

        // no shared pixel buffers with the source
        let src_cel = src.layer(leaf).unwrap().cel(0).unwrap();
        let dst_cel = leaf_node.cel(0).unwrap();
        assert!(!Arc::ptr_eq(src_cel.image(), dst_cel.image()));
    }

    #[test]
    fn test_duplicate_layer_same_document() {
        let (mut sprite, layers) = sprite_with_children(1);
        sprite.layer_mut(layers[0]).unwrap().add_cel(cel(1)).unwrap();

        let copy = sprite.duplicate_layer(layers[0]).unwrap();
        assert_ne!(copy, layers[0]);
        assert_eq!(sprite.layer(copy).unwrap().parent(), None);
        assert_eq!(sprite.layer(copy).unwrap().cel_count(), 1);
    }

    #[test]
    fn test_frame_clamping() {
        let mut sprite = Sprite::new(8, 8, 5);
        sprite.set_active_frame(10);
        assert_eq!(sprite.active_frame(), 4);
        sprite.set_frames(2);
        assert_eq!(sprite.active_frame(), 1);
    }
}
