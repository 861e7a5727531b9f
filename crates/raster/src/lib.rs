//! Pixel-level entities for the sprite editor core.
//!
//! This crate handles:
//! - RGBA pixel buffers and their blit/blend primitives
//! - Per-pixel blend mode math
//! - Cels (frame to placed-image associations)

pub mod blend;
pub mod cel;
pub mod image;

pub use blend::{blend_pixel, BlendMode};
pub use cel::Cel;
pub use image::Image;
