//! Layer tree and frame compositing for the sprite editor.
//!
//! This crate handles:
//! - the drawable layer tree (image leaves and folders)
//! - per-layer flags and blend modes
//! - the owning document (`Sprite`) and its structural edits
//! - rendering a composited frame and flattening a subtree

pub mod error;
pub mod layer;
pub mod render;
pub mod sprite;

pub use error::{LayerError, LayerResult};
pub use layer::{Layer, LayerFlags, LayerId, LayerKind};
pub use render::{layer_new_flatten_copy, render};
pub use sprite::Sprite;
