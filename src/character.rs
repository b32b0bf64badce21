use crate::collision::CollisionSide;
use crate::physics::{Body, GeometryKind, PhysicsParameters, Rect, Rgb, StaticGeometry, CHARACTER_HEIGHT, CHARACTER_WIDTH};

// Movement flags currently driving a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFlags {
    pub jump: bool,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub body: Body,
    pub acceleration_x: i32,
    pub acceleration_y: i32,
    pub controls: ControlFlags,
    alive: bool,
}

impl Character {
    pub fn new(x: i32, y: i32, params: &PhysicsParameters) -> Self {
        Self {
            body: Body::new(Rect::new(x, y, CHARACTER_WIDTH, CHARACTER_HEIGHT), Rgb::BLUE),
            acceleration_x: 0,
            acceleration_y: params.gravity, // start airborne
            controls: ControlFlags::default(),
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn rect(&self) -> &Rect {
        &self.body.rect
    }

    /// Derives velocity from the control flags, integrates one tick and
    /// kills the character once it drops below the world.
    pub fn movement(&mut self, params: &PhysicsParameters) {
        if !self.alive {
            // Corpses stay put
            self.body.rect.velocity_x = 0;
            self.body.rect.velocity_y = 0;
            self.body.snapshot_previous_frame();
            return;
        }

        let rect = &mut self.body.rect;
        rect.velocity_x = match (self.controls.right, self.controls.left) {
            (true, false) => params.run_speed,
            (false, true) => -params.run_speed,
            _ => 0,
        };

        // Jumping is an impulse, only available while grounded
        if self.controls.jump && self.body.collisions.bottom {
            rect.velocity_y = params.jump_impulse;
        }

        rect.velocity_x += self.acceleration_x;
        rect.velocity_y += self.acceleration_y;

        self.body.snapshot_previous_frame();
        self.body.rect.integrate();

        if self.body.rect.y > params.world_height {
            self.kill();
        }
    }

    /// Reacts to overlapping static geometry. Obstacles are lethal from any
    /// side; floors record the side and push the character flush.
    pub fn respond_to_geometry(&mut self, side: Option<CollisionSide>, other: &StaticGeometry) {
        match other.kind() {
            GeometryKind::Obstacle => self.kill(),
            GeometryKind::Floor => {
                let Some(side) = side else { return };
                self.body.collisions.record(side);

                let floor = other.rect();
                let rect = &mut self.body.rect;
                match side {
                    CollisionSide::Top => rect.set_location(rect.x, floor.bottom()),
                    CollisionSide::Bottom => rect.set_location(rect.x, floor.top() - rect.height),
                    CollisionSide::Left => rect.set_location(floor.right(), rect.y),
                    CollisionSide::Right => rect.set_location(floor.left() - rect.width, rect.y),
                }
            }
            // The finish zone handles the contact from its own side
            GeometryKind::Finish => {}
        }
    }

    /// Velocity pass run after all of this tick's collisions are recorded.
    pub fn adjust_velocity(&mut self, params: &PhysicsParameters) {
        let flags = self.body.collisions;
        let rect = &mut self.body.rect;

        // Bounce off ceilings
        if flags.top {
            rect.velocity_y = -self.body.previous_frame.velocity_y;
        }

        if flags.left || flags.right {
            rect.velocity_x = 0;
            if flags.left && flags.right {
                self.alive = false;
            }
        }

        if flags.bottom {
            rect.velocity_y = 0;
            self.acceleration_y = 0;
            if flags.top {
                self.alive = false;
            }
        } else {
            self.acceleration_y = params.gravity;
        }
    }
}
