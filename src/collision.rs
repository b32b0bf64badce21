use crate::physics::{intersects, Rect};

// Side of the moving body that struck the other body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionSide {
    Left,
    Right,
    Top,
    Bottom,
}

// Per-tick collision flags, cleared before each collision pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionFlags {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl CollisionFlags {
    pub fn record(&mut self, side: CollisionSide) {
        match side {
            CollisionSide::Top => self.top = true,
            CollisionSide::Bottom => self.bottom = true,
            CollisionSide::Left => self.left = true,
            CollisionSide::Right => self.right = true,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn any(&self) -> bool {
        self.top || self.bottom || self.left || self.right
    }
}

/// Infers which side of `moving` hit `other` from where `moving` was on the
/// previous tick. Checks run in a fixed order (right, left, top, bottom) and
/// the first match wins, so a corner hit resolves horizontally.
///
/// Returns `None` when the boxes do not overlap or no edge crossed this tick.
pub fn classify(moving: &Rect, previous: &Rect, other: &Rect) -> Option<CollisionSide> {
    if !intersects(moving, other) {
        return None;
    }

    if other.left() <= moving.right() && other.left() >= previous.right() {
        Some(CollisionSide::Right)
    } else if other.right() >= moving.left() && other.right() <= previous.left() {
        Some(CollisionSide::Left)
    } else if other.bottom() >= moving.top() && other.bottom() <= previous.top() {
        Some(CollisionSide::Top)
    } else if moving.bottom() >= other.top() && previous.bottom() <= other.top() {
        Some(CollisionSide::Bottom)
    } else {
        None
    }
}
