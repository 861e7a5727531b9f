//! Structural error taxonomy for layer tree edits.

use thiserror::Error;

/// Errors reported by structural operations on the layer tree.
///
/// Every failure leaves the tree unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerError {
    #[error("a cel already occupies frame {frame}")]
    DuplicateFrame { frame: u32 },

    #[error("layer or cel is not a member of the target")]
    NotFound,

    #[error("layer is still attached to a folder")]
    AlreadyParented,

    #[error("operation addressed to the wrong layer kind")]
    InvalidLayerKind,
}

pub type LayerResult<T> = Result<T, LayerError>;
