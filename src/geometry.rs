//! Image-space geometry shared by the tracking and calibration stages.

use crate::utils::safe_cast::f32_to_i32_clamp;
use serde::{Deserialize, Serialize};

/// 2D image point (pixels, or normalized camera coordinates)
pub type Point2f = nalgebra::Point2<f32>;

/// 3D world point (meters)
pub type Point3f = nalgebra::Point3<f32>;

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl ImageSize {
    /// Create a new image size
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero or negative
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Axis-aligned integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Box covering a whole image
    #[must_use]
    pub const fn from_size(size: ImageSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Exclusive right edge
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// True if the box covers no pixels
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Area in pixels (0 for empty boxes)
    #[must_use]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width) * i64::from(self.height)
        }
    }

    /// Overlapping region of two boxes, or an empty default box if they are disjoint
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            Self::default()
        } else {
            Self::new(left, top, right - left, bottom - top)
        }
    }

    /// True if the two boxes share at least one pixel
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Restrict the box to the valid region of an image of the given size
    #[must_use]
    pub fn clip_to(&self, size: ImageSize) -> Self {
        self.intersection(&Self::from_size(size))
    }

    /// Scale every coordinate by `factor`, truncating toward zero
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale(&self, factor: f32) -> Self {
        let s = |v: i32| f32_to_i32_clamp(v as f32 * factor, i32::MIN, i32::MAX);
        Self::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_intersection_overlapping() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), BoundingBox::new(5, 5, 5, 5));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_touching_edges_do_not_intersect() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(10, 0, 10, 10);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn test_clip_to_frame() {
        let size = ImageSize::new(640, 480);
        let partially_outside = BoundingBox::new(600, 400, 100, 100);
        assert_eq!(partially_outside.clip_to(size), BoundingBox::new(600, 400, 40, 80));

        let fully_outside = BoundingBox::new(700, 10, 20, 20);
        assert!(fully_outside.clip_to(size).is_empty());

        let negative = BoundingBox::new(-30, -30, 20, 20);
        assert!(negative.clip_to(size).is_empty());
    }

    #[test]
    fn test_scale_truncates() {
        let b = BoundingBox::new(10, 15, 21, 33);
        assert_eq!(b.scale(0.5), BoundingBox::new(5, 7, 10, 16));
        assert_eq!(b.scale(2.0), BoundingBox::new(20, 30, 42, 66));
    }

    #[test]
    fn test_area() {
        assert_eq!(BoundingBox::new(0, 0, 4, 5).area(), 20);
        assert_eq!(BoundingBox::new(0, 0, -4, 5).area(), 0);
    }

    proptest! {
        #[test]
        fn prop_clip_stays_inside_frame(
            x in -500i32..1500, y in -500i32..1500,
            w in 0i32..800, h in 0i32..800,
        ) {
            let size = ImageSize::new(640, 480);
            let clipped = BoundingBox::new(x, y, w, h).clip_to(size);
            if !clipped.is_empty() {
                prop_assert!(clipped.x >= 0 && clipped.y >= 0);
                prop_assert!(clipped.right() <= 640 && clipped.bottom() <= 480);
            }
        }

        #[test]
        fn prop_intersection_is_symmetric(
            ax in -50i32..50, ay in -50i32..50, aw in 0i32..60, ah in 0i32..60,
            bx in -50i32..50, by in -50i32..50, bw in 0i32..60, bh in 0i32..60,
        ) {
            let a = BoundingBox::new(ax, ay, aw, ah);
            let b = BoundingBox::new(bx, by, bw, bh);
            prop_assert_eq!(a.intersection(&b), b.intersection(&a));
            prop_assert_eq!(a.intersects(&b), b.intersects(&a));
        }
    }
}
