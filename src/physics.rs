use crate::collision::CollisionFlags;

// --- World Constants ---
pub const WORLD_WIDTH: i32 = 1300;
pub const WORLD_HEIGHT: i32 = 700;

pub const CHARACTER_WIDTH: i32 = 20;
pub const CHARACTER_HEIGHT: i32 = 30;

pub const START_X: i32 = 5;
pub const START_Y: i32 = 400;

// Starting platform sits below the spawn point so new characters drop onto it
pub const START_PLATFORM_WIDTH: i32 = 100;
pub const START_PLATFORM_HEIGHT: i32 = 20;
pub const START_PLATFORM_DROP: i32 = 100;

// --- Physics Parameters ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsParameters {
    pub gravity: i32,      // vertical acceleration while airborne (negative pulls down)
    pub run_speed: i32,
    pub jump_impulse: i32,
    pub world_height: i32, // characters below this line are dead
}

impl Default for PhysicsParameters {
    fn default() -> Self {
        Self {
            gravity: -1,
            run_speed: 10,
            jump_impulse: 20,
            world_height: WORLD_HEIGHT,
        }
    }
}

// --- Cosmetic Colors ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

// === Rigid Body ===

/// Axis-aligned box with an integer velocity. Velocity is upward/leftward
/// positive: integration subtracts it from the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub velocity_x: i32,
    pub velocity_y: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height, velocity_x: 0, velocity_y: 0 }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn set_location(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    // Applies the current velocity using the inverted sign convention
    pub fn integrate(&mut self) {
        self.x -= self.velocity_x;
        self.y -= self.velocity_y;
    }
}

// Half-open overlap test: boxes that only share an edge do not intersect.
// Degenerate boxes (zero or negative extent) never intersect anything.
pub fn intersects(a: &Rect, b: &Rect) -> bool {
    if a.width <= 0 || a.height <= 0 || b.width <= 0 || b.height <= 0 {
        return false;
    }
    a.left() < b.right() && b.left() < a.right() && a.top() < b.bottom() && b.top() < a.bottom()
}

// === Physics Entity ===

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub rect: Rect,
    pub collisions: CollisionFlags,
    pub previous_frame: Rect,
    pub color: Rgb,
}

impl Body {
    pub fn new(rect: Rect, color: Rgb) -> Self {
        Self {
            rect,
            collisions: CollisionFlags::default(),
            previous_frame: rect,
            color,
        }
    }

    // Called once per tick, after velocity is derived and before the position moves
    pub fn snapshot_previous_frame(&mut self) {
        self.previous_frame = self.rect;
    }
}

// === Static Geometry ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Floor,
    Obstacle,
    Finish,
}

impl GeometryKind {
    pub fn color(self) -> Rgb {
        match self {
            GeometryKind::Floor => Rgb::BLACK,
            GeometryKind::Obstacle => Rgb::RED,
            GeometryKind::Finish => Rgb::GREEN,
        }
    }

    // Tag used by the map file format
    pub fn tag(self) -> &'static str {
        match self {
            GeometryKind::Floor => "floor",
            GeometryKind::Obstacle => "obstacle",
            GeometryKind::Finish => "finishzone",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "floor" => Some(GeometryKind::Floor),
            "obstacle" => Some(GeometryKind::Obstacle),
            "finishzone" => Some(GeometryKind::Finish),
            _ => None,
        }
    }
}

/// Geometry descriptor as stored in a map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryDescriptor {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub kind: GeometryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticGeometry {
    body: Body,
    kind: GeometryKind,
}

impl StaticGeometry {
    pub fn new(kind: GeometryKind, x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            body: Body::new(Rect::new(x, y, width, height), kind.color()),
            kind,
        }
    }

    pub fn from_descriptor(descriptor: &GeometryDescriptor) -> Self {
        Self::new(descriptor.kind, descriptor.x, descriptor.y, descriptor.width, descriptor.height)
    }

    // Platform every map gets underneath the spawn point
    pub fn start_platform() -> Self {
        Self::new(
            GeometryKind::Floor,
            START_X - 20,
            START_Y + CHARACTER_HEIGHT + START_PLATFORM_DROP,
            START_PLATFORM_WIDTH,
            START_PLATFORM_HEIGHT,
        )
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn rect(&self) -> &Rect {
        &self.body.rect
    }

    pub fn color(&self) -> Rgb {
        self.body.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_boxes_intersect() {
        let a = Rect::new(0, 0, 20, 30);
        let b = Rect::new(10, 20, 50, 50);
        assert!(intersects(&a, &b));
        assert!(intersects(&b, &a));
    }

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0, 0, 20, 30);
        let right_neighbour = Rect::new(20, 0, 10, 30);
        let below = Rect::new(0, 30, 20, 5);
        assert!(!intersects(&a, &right_neighbour));
        assert!(!intersects(&a, &below));
    }

    #[test]
    fn contained_box_intersects() {
        let outer = Rect::new(0, 0, 100, 100);
        let inner = Rect::new(40, 40, 5, 5);
        assert!(intersects(&outer, &inner));
    }

    #[test]
    fn degenerate_box_never_intersects() {
        let a = Rect::new(0, 0, 0, 30);
        let b = Rect::new(-10, -10, 100, 100);
        assert!(!intersects(&a, &b));
    }

    #[test]
    fn integrate_subtracts_velocity() {
        let mut rect = Rect::new(100, 100, 20, 30);
        rect.velocity_x = 10;
        rect.velocity_y = -3;
        rect.integrate();
        assert_eq!((rect.x, rect.y), (90, 103));
    }

    #[test]
    fn geometry_tags_round_trip() {
        for kind in [GeometryKind::Floor, GeometryKind::Obstacle, GeometryKind::Finish] {
            assert_eq!(GeometryKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(GeometryKind::from_tag("lava"), None);
    }

    #[test]
    fn start_platform_is_below_spawn() {
        let platform = StaticGeometry::start_platform();
        assert_eq!(platform.kind(), GeometryKind::Floor);
        assert_eq!(platform.rect().top(), START_Y + CHARACTER_HEIGHT + START_PLATFORM_DROP);
        assert!(platform.rect().left() <= START_X);
        assert!(platform.rect().right() >= START_X + CHARACTER_WIDTH);
    }
}
