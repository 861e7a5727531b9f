//! Cels: associations between a frame number and a placed image.

use crate::image::Image;
use common::Point;
use std::sync::Arc;

/// A placed image at a given frame of a layer.
///
/// The pixel buffer is reference counted: removing a cel from a layer hands
/// the cel back without deallocating a buffer another holder still uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cel {
    frame: u32,
    position: Point,
    opacity: u8,
    image: Arc<Image>,
}

impl Cel {
    pub fn new(frame: u32, image: Arc<Image>) -> Self {
        Self {
            frame,
            position: Point::ZERO,
            opacity: 255,
            image,
        }
    }

    pub fn with_position(frame: u32, image: Arc<Image>, x: i32, y: i32) -> Self {
        Self {
            frame,
            position: Point::new(x, y),
            opacity: 255,
            image,
        }
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn x(&self) -> i32 {
        self.position.x
    }

    pub fn y(&self) -> i32 {
        self.position.y
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn set_frame(&mut self, frame: u32) {
        self.frame = frame;
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.position = Point::new(x, y);
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }

    /// Deep copy: the new cel gets its own pixel buffer.
    pub fn duplicate(&self) -> Cel {
        Cel {
            frame: self.frame,
            position: self.position,
            opacity: self.opacity,
            image: Arc::new((*self.image).clone()),
        }
    }
}
