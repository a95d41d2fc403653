// Region tracking helpers
//
// Window coordinates used by squall have their origin in the
// bottom-left corner with y growing upwards.

use serde::{Deserialize, Serialize};

use std::cmp::PartialOrd;
use std::ops::Add;

/// A rectangular region
///
/// This is used to track redraw regions, scissors, clip
/// rectangles, etc. It is determined by the corners of a rectangle:
///   r_pos:  the bottom left corner's position in the window
///   r_size: the distance from the bottom left to the top right
#[derive(Debug, PartialEq, Copy, Clone, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct Rect<T: PartialOrd + Copy + Add + Add<Output = T>> {
    pub r_pos: (T, T),
    pub r_size: (T, T),
}

impl<T: PartialOrd + Copy + Add + Add<Output = T>> Rect<T> {
    pub fn new(x: T, y: T, width: T, height: T) -> Rect<T> {
        Rect {
            r_pos: (x, y),
            r_size: (width, height),
        }
    }

    /// Checks if the point (x,y) is contained within this
    /// Rectangle.
    pub fn intersects(&self, x: T, y: T) -> bool {
        x > self.r_pos.0
            && y > self.r_pos.1
            && x < self.r_pos.0 + self.r_size.0
            && y < self.r_pos.1 + self.r_size.1
    }
}

impl Rect<f32> {
    /// Build a rectangle from its bottom-left and top-right corners
    pub fn from_corners(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self::new(left, bottom, right - left, top - bottom)
    }

    pub fn left(&self) -> f32 {
        self.r_pos.0
    }

    pub fn bottom(&self) -> f32 {
        self.r_pos.1
    }

    pub fn right(&self) -> f32 {
        self.r_pos.0 + self.r_size.0
    }

    pub fn top(&self) -> f32 {
        self.r_pos.1 + self.r_size.1
    }

    pub fn width(&self) -> f32 {
        self.r_size.0
    }

    pub fn height(&self) -> f32 {
        self.r_size.1
    }

    /// A rectangle with no area. These are ignored by union.
    pub fn is_empty(&self) -> bool {
        !(self.r_size.0 > 0.0 && self.r_size.1 > 0.0)
    }

    /// The smallest rectangle containing both `self` and `other`
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        Self::from_corners(
            self.left().min(other.left()),
            self.bottom().min(other.bottom()),
            self.right().max(other.right()),
            self.top().max(other.top()),
        )
    }

    /// The overlapping area of two rectangles. This will be an
    /// empty rectangle if they do not overlap.
    pub fn intersection(&self, other: &Self) -> Self {
        let left = self.left().max(other.left());
        let bottom = self.bottom().max(other.bottom());
        let right = self.right().min(other.right());
        let top = self.top().min(other.top());

        if right <= left || top <= bottom {
            return Self::default();
        }
        Self::from_corners(left, bottom, right, top)
    }

    /// Returns true if `other` lies completely within this rectangle.
    /// Empty rectangles are contained by everything.
    pub fn contains_rect(&self, other: &Self) -> bool {
        other.is_empty()
            || (other.left() >= self.left()
                && other.bottom() >= self.bottom()
                && other.right() <= self.right()
                && other.top() <= self.top())
    }

    /// Expand this rectangle so that all four sides land on multiples
    /// of the given granularity. The bottom-left corner is rounded down
    /// and the top-right corner is rounded up.
    pub fn round_to_granularity(&self, granularity: (u32, u32)) -> Self {
        if self.is_empty() {
            return *self;
        }

        let gx = granularity.0.max(1) as f32;
        let gy = granularity.1.max(1) as f32;

        Self::from_corners(
            (self.left() / gx).floor() * gx,
            (self.bottom() / gy).floor() * gy,
            (self.right() / gx).ceil() * gx,
            (self.top() / gy).ceil() * gy,
        )
    }

    /// Grow (or shrink with a negative amount) every side of this
    /// rectangle by `amount`.
    pub fn expand(&self, amount: f32) -> Self {
        Self::from_corners(
            self.left() - amount,
            self.bottom() - amount,
            self.right() + amount,
            self.top() + amount,
        )
    }
}
