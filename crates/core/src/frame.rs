//! Still frames that make up a frame-based clip.

use image::{Rgb, RgbImage};
use serde::Serialize;

/// Where a frame's pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Downloaded and decoded from the image backend.
    Fetched,
    /// Substituted after every fetch attempt failed.
    Fallback,
}

/// One still image at one ordinal position in the clip.
///
/// Pixels are always normalised to the configured frame dimensions, so
/// every frame in a clip has the same size regardless of provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub ordinal: u32,
    pub image: RgbImage,
    pub provenance: Provenance,
}

impl Frame {
    pub fn fetched(ordinal: u32, image: RgbImage) -> Self {
        Self {
            ordinal,
            image,
            provenance: Provenance::Fetched,
        }
    }

    /// Reuse another frame's pixels at a new ordinal.
    pub fn substitute(ordinal: u32, source: &Frame) -> Self {
        Self {
            ordinal,
            image: source.image.clone(),
            provenance: Provenance::Fallback,
        }
    }

    /// Solid-colour frame used when nothing has been fetched yet.
    pub fn placeholder(ordinal: u32, width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            ordinal,
            image: placeholder_image(width, height, color),
            provenance: Provenance::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provenance == Provenance::Fallback
    }
}

/// Build a `width x height` image filled with `color`.
pub fn placeholder_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_solid() {
        let frame = Frame::placeholder(0, 4, 3, [10, 20, 30]);
        assert_eq!(frame.image.dimensions(), (4, 3));
        assert!(frame.image.pixels().all(|p| p.0 == [10, 20, 30]));
        assert!(frame.is_fallback());
    }

    #[test]
    fn substitute_copies_pixels_and_marks_fallback() {
        let source = Frame::fetched(1, placeholder_image(2, 2, [1, 2, 3]));
        let copy = Frame::substitute(2, &source);
        assert_eq!(copy.ordinal, 2);
        assert_eq!(copy.image, source.image);
        assert_eq!(copy.provenance, Provenance::Fallback);
    }
}
