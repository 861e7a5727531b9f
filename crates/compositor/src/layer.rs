//! Drawable layers: image leaves and folders.

use crate::error::{LayerError, LayerResult};
use bitflags::bitflags;
use raster::{BlendMode, Cel};
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::collections::BTreeMap;

new_key_type! {
    /// Unique identifier for a layer within its sprite's arena.
    pub struct LayerId;
}

bitflags! {
    /// Per-layer state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LayerFlags: u16 {
        /// The layer contributes to composited output.
        const READABLE = 0x0001;
        /// The layer accepts edits.
        const WRITABLE = 0x0002;
        /// The layer's position is pinned.
        const LOCK_MOVE = 0x0004;
        /// The layer is the document's opaque bottom layer.
        const BACKGROUND = 0x0008;
    }
}

/// Variant data of a layer.
///
/// The set is closed: a layer is either an image leaf holding per-frame
/// cels, or a folder holding an ordered child stack.
#[derive(Clone, Debug)]
pub enum LayerKind {
    Image {
        blend_mode: BlendMode,
        /// Cels keyed by frame; the key always equals `Cel::frame`.
        cels: BTreeMap<u32, Cel>,
    },
    Folder {
        /// Insertion order is paint order, back to front.
        children: SmallVec<[LayerId; 4]>,
    },
}

/// A named, flagged node of the compositing tree.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    flags: LayerFlags,
    parent: Option<LayerId>,
    kind: LayerKind,
}

impl Layer {
    pub(crate) fn new_image(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: LayerFlags::READABLE | LayerFlags::WRITABLE,
            parent: None,
            kind: LayerKind::Image {
                blend_mode: BlendMode::Normal,
                cels: BTreeMap::new(),
            },
        }
    }

    pub(crate) fn new_folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: LayerFlags::READABLE | LayerFlags::WRITABLE,
            parent: None,
            kind: LayerKind::Folder {
                children: SmallVec::new(),
            },
        }
    }

    /// Assemble a detached layer from already-built parts (duplication).
    pub(crate) fn from_parts(name: String, flags: LayerFlags, kind: LayerKind) -> Self {
        Self {
            name,
            flags,
            parent: None,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    /// The owning folder, if attached.
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<LayerId>) {
        self.parent = parent;
    }

    pub(crate) fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, LayerKind::Image { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, LayerKind::Folder { .. })
    }

    pub fn is_readable(&self) -> bool {
        self.flags.contains(LayerFlags::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(LayerFlags::WRITABLE)
    }

    pub fn is_moveable(&self) -> bool {
        !self.flags.contains(LayerFlags::LOCK_MOVE)
    }

    pub fn is_background(&self) -> bool {
        self.flags.contains(LayerFlags::BACKGROUND)
    }

    pub fn set_readable(&mut self, readable: bool) {
        self.flags.set(LayerFlags::READABLE, readable);
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.flags.set(LayerFlags::WRITABLE, writable);
    }

    pub fn set_moveable(&mut self, moveable: bool) {
        self.flags.set(LayerFlags::LOCK_MOVE, !moveable);
    }

    /// Toggle only this layer's background bit. Uniqueness across the
    /// document is enforced by `Sprite::configure_as_background`.
    pub fn set_background(&mut self, background: bool) {
        self.flags.set(LayerFlags::BACKGROUND, background);
    }

    /// The blend mode, for image layers.
    pub fn blend_mode(&self) -> Option<BlendMode> {
        match &self.kind {
            LayerKind::Image { blend_mode, .. } => Some(*blend_mode),
            LayerKind::Folder { .. } => None,
        }
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> LayerResult<()> {
        match &mut self.kind {
            LayerKind::Image { blend_mode, .. } => {
                *blend_mode = mode;
                Ok(())
            }
            LayerKind::Folder { .. } => Err(LayerError::InvalidLayerKind),
        }
    }

    /// Exact-match cel lookup by frame.
    pub fn cel(&self, frame: u32) -> Option<&Cel> {
        match &self.kind {
            LayerKind::Image { cels, .. } => cels.get(&frame),
            LayerKind::Folder { .. } => None,
        }
    }

    /// Cels owned by this layer, in ascending frame order.
    pub fn cels(&self) -> impl Iterator<Item = &Cel> {
        let cels = match &self.kind {
            LayerKind::Image { cels, .. } => Some(cels),
            LayerKind::Folder { .. } => None,
        };
        cels.into_iter().flat_map(|cels| cels.values())
    }

    pub fn cel_count(&self) -> usize {
        match &self.kind {
            LayerKind::Image { cels, .. } => cels.len(),
            LayerKind::Folder { .. } => 0,
        }
    }

    /// Insert a cel, keyed by its frame.
    pub fn add_cel(&mut self, cel: Cel) -> LayerResult<()> {
        match &mut self.kind {
            LayerKind::Image { cels, .. } => {
                let frame = cel.frame();
                if cels.contains_key(&frame) {
                    return Err(LayerError::DuplicateFrame { frame });
                }
                cels.insert(frame, cel);
                Ok(())
            }
            LayerKind::Folder { .. } => Err(LayerError::InvalidLayerKind),
        }
    }

    /// Remove the cel at a frame and hand it back to the caller.
    ///
    /// The underlying pixel buffer is never deallocated here.
    pub fn remove_cel(&mut self, frame: u32) -> LayerResult<Cel> {
        match &mut self.kind {
            LayerKind::Image { cels, .. } => cels.remove(&frame).ok_or(LayerError::NotFound),
            LayerKind::Folder { .. } => Err(LayerError::InvalidLayerKind),
        }
    }

    pub(crate) fn cels_mut(&mut self) -> Option<&mut BTreeMap<u32, Cel>> {
        match &mut self.kind {
            LayerKind::Image { cels, .. } => Some(cels),
            LayerKind::Folder { .. } => None,
        }
    }

    /// Direct children in paint order; empty for image layers.
    pub fn children(&self) -> &[LayerId] {
        match &self.kind {
            LayerKind::Folder { children } => children,
            LayerKind::Image { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut SmallVec<[LayerId; 4]>> {
        match &mut self.kind {
            LayerKind::Folder { children } => Some(children),
            LayerKind::Image { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster::Image;
    use std::sync::Arc;

    fn cel(frame: u32) -> Cel {
        Cel::new(frame, Arc::new(Image::new(2, 2)))
    }

    #[test]
    fn test_new_layer_flags() {
        let layer = Layer::new_image("a");
        assert!(layer.is_readable());
        assert!(layer.is_writable());
        assert!(layer.is_moveable());
        assert!(!layer.is_background());
    }

    #[test]
    fn test_moveable_is_inverse_of_lock() {
        let mut layer = Layer::new_image("a");
        layer.set_moveable(false);
        assert!(layer.flags().contains(LayerFlags::LOCK_MOVE));
        layer.set_moveable(true);
        assert!(!layer.flags().contains(LayerFlags::LOCK_MOVE));
    }

    #[test]
    fn test_add_and_get_cel() {
        let mut layer = Layer::new_image("a");
        layer.add_cel(cel(4)).unwrap();
        assert_eq!(layer.cel(4).map(Cel::frame), Some(4));
        assert!(layer.cel(3).is_none());
    }

    #[test]
    fn test_duplicate_frame_rejected() {
        let mut layer = Layer::new_image("a");
        let first = Cel::with_position(1, Arc::new(Image::new(2, 2)), 7, 7);
        layer.add_cel(first).unwrap();

        let err = layer.add_cel(cel(1)).unwrap_err();
        assert_eq!(err, LayerError::DuplicateFrame { frame: 1 });
        // the original cel is unchanged
        assert_eq!(layer.cel(1).map(Cel::x), Some(7));
    }

    #[test]
    fn test_remove_cel() {
        let mut layer = Layer::new_image("a");
        layer.add_cel(cel(2)).unwrap();

        let removed = layer.remove_cel(2).unwrap();
        assert_eq!(removed.frame(), 2);
        assert_eq!(layer.remove_cel(2), Err(LayerError::NotFound));
    }

    #[test]
    fn test_cels_iterate_in_frame_order() {
        let mut layer = Layer::new_image("a");
        for frame in [5, 1, 3] {
            layer.add_cel(cel(frame)).unwrap();
        }
        let frames: Vec<u32> = layer.cels().map(Cel::frame).collect();
        assert_eq!(frames, vec![1, 3, 5]);
    }

    #[test]
    fn test_folder_rejects_cel_ops() {
        let mut folder = Layer::new_folder("f");
        assert_eq!(folder.add_cel(cel(0)), Err(LayerError::InvalidLayerKind));
        assert_eq!(
            folder.set_blend_mode(BlendMode::Multiply),
            Err(LayerError::InvalidLayerKind)
        );
        assert!(folder.blend_mode().is_none());
        assert_eq!(folder.cel_count(), 0);
    }
}
