use bevy::prelude::Resource;
use thiserror::Error;

use crate::collision::classify;
use crate::organism::{Instance, MutationRate, DEFAULT_GENOME_LENGTH};
use crate::physics::{intersects, GeometryDescriptor, GeometryKind, PhysicsParameters, StaticGeometry, START_X, START_Y};

pub const TICK_MS: u32 = 13;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mutation rate {0}% exceeds 100%")]
    MutationRateTooHigh(u32),
    #[error("population size must be at least 1")]
    EmptyPopulation,
    #[error("genome length must be at least 1")]
    EmptyGenome,
    #[error("tick interval must be at least 1 ms")]
    ZeroTick,
}

#[derive(Debug, Clone, Resource)]
pub struct SimulationConfig {
    pub population_size: usize,
    pub genome_length: usize,
    pub mutation_percent: u32,
    pub time_budget_ms: u32,
    pub tick_ms: u32,
    pub start_x: i32,
    pub start_y: i32,
    pub physics: PhysicsParameters,
    pub seed: Option<u64>, // None seeds from entropy
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            genome_length: DEFAULT_GENOME_LENGTH,
            mutation_percent: 10,
            time_budget_ms: 7000,
            tick_ms: TICK_MS,
            start_x: START_X,
            start_y: START_Y,
            physics: PhysicsParameters::default(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if self.genome_length == 0 {
            return Err(ConfigError::EmptyGenome);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        self.mutation_rate().map(|_| ())
    }

    pub fn mutation_rate(&self) -> Result<MutationRate, ConfigError> {
        MutationRate::new(self.mutation_percent)
    }

    pub fn start(&self) -> (i32, i32) {
        (self.start_x, self.start_y)
    }
}

// === Course ===

/// Static geometry of one loaded map, shared read-only by every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    map_id: u32,
    geometry: Vec<StaticGeometry>,
}

impl Course {
    // Map geometry in file order, followed by the starting platform
    pub fn from_descriptors(map_id: u32, descriptors: &[GeometryDescriptor]) -> Self {
        let mut geometry: Vec<StaticGeometry> = descriptors.iter().map(StaticGeometry::from_descriptor).collect();
        geometry.push(StaticGeometry::start_platform());
        Self { map_id, geometry }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn geometry(&self) -> &[StaticGeometry] {
        &self.geometry
    }
}

// Cumulative generation time fed to the engine, one fixed step per tick
#[derive(Debug, Clone, Resource)]
pub struct Clock {
    tick_ms: u32,
    elapsed_ms: u32,
}

impl Clock {
    pub fn new(tick_ms: u32) -> Self {
        Self { tick_ms, elapsed_ms: 0 }
    }

    pub fn tick(&mut self) -> u32 {
        self.elapsed_ms = self.elapsed_ms.saturating_add(self.tick_ms);
        self.elapsed_ms
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
    }
}

/// Runs one physics tick over the course. Entities are processed in order:
/// static geometry first (only finish zones react), then each instance moves,
/// recomputes its collision flags and settles its velocity.
///
/// Returns the indices of instances touching a finish zone, in dispatch order.
pub fn run_physics_tick(course: &Course, instances: &mut [Instance], params: &PhysicsParameters) -> Vec<usize> {
    let mut finishers = Vec::new();
    for zone in course.geometry() {
        if zone.kind() != GeometryKind::Finish {
            continue;
        }
        for (index, instance) in instances.iter().enumerate() {
            if intersects(zone.rect(), instance.character.rect()) && !finishers.contains(&index) {
                finishers.push(index);
            }
        }
    }

    for instance in instances.iter_mut() {
        let character = &mut instance.character;
        character.movement(params);
        character.body.collisions.clear();

        // Character-to-character contact has no effect, so only geometry is checked
        for other in course.geometry() {
            if intersects(character.rect(), other.rect()) {
                let side = classify(character.rect(), &character.body.previous_frame, other.rect());
                character.respond_to_geometry(side, other);
            }
        }

        character.adjust_velocity(params);
    }

    finishers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organism::{Command, Genome};
    use crate::physics::CHARACTER_HEIGHT;

    fn descriptor(kind: GeometryKind, x: i32, y: i32, width: i32, height: i32) -> GeometryDescriptor {
        GeometryDescriptor { x, y, width, height, kind }
    }

    fn idle_genome() -> Genome {
        Genome::from_commands(vec![Command::new(false, false, false, 0)])
    }

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.population_size, 10);
        assert_eq!(config.genome_length, 5);
        assert_eq!(config.time_budget_ms, 7000);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = SimulationConfig { population_size: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::EmptyPopulation));
        let config = SimulationConfig { mutation_percent: 250, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::MutationRateTooHigh(250)));
        let config = SimulationConfig { tick_ms: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTick));
    }

    #[test]
    fn course_appends_start_platform() {
        let course = Course::from_descriptors(3, &[descriptor(GeometryKind::Obstacle, 300, 300, 10, 10)]);
        assert_eq!(course.map_id(), 3);
        assert_eq!(course.geometry().len(), 2);
        assert_eq!(course.geometry()[0].kind(), GeometryKind::Obstacle);
        assert_eq!(course.geometry()[1], StaticGeometry::start_platform());
    }

    #[test]
    fn clock_accumulates_and_resets() {
        let mut clock = Clock::new(TICK_MS);
        assert_eq!(clock.tick(), 13);
        assert_eq!(clock.tick(), 26);
        clock.reset();
        assert_eq!(clock.elapsed_ms(), 0);
    }

    #[test]
    fn spawned_instance_settles_on_start_platform() {
        let config = SimulationConfig::default();
        let course = Course::from_descriptors(1, &[]);
        let mut instances = vec![Instance::new(idle_genome(), config.start(), &config.physics)];
        for _ in 0..100 {
            run_physics_tick(&course, &mut instances, &config.physics);
        }
        let platform = StaticGeometry::start_platform();
        assert!(instances[0].is_alive());
        assert_eq!(instances[0].character.rect().bottom(), platform.rect().top());
        assert_eq!(instances[0].character.rect().y, config.start_y + 100);
        assert_eq!(platform.rect().top() - CHARACTER_HEIGHT, config.start_y + 100);
    }

    #[test]
    fn obstacle_contact_is_lethal() {
        let config = SimulationConfig::default();
        // Obstacle straddling the fall path onto the start platform
        let course = Course::from_descriptors(1, &[descriptor(GeometryKind::Obstacle, 0, 450, 50, 10)]);
        let mut instances = vec![Instance::new(idle_genome(), config.start(), &config.physics)];
        for _ in 0..60 {
            run_physics_tick(&course, &mut instances, &config.physics);
        }
        assert!(!instances[0].is_alive());
    }

    #[test]
    fn finish_zone_reports_every_touching_instance_once() {
        let config = SimulationConfig::default();
        let course = Course::from_descriptors(
            1,
            &[
                descriptor(GeometryKind::Finish, 0, 390, 60, 60),
                descriptor(GeometryKind::Finish, 0, 380, 60, 60),
            ],
        );
        let mut instances = vec![
            Instance::new(idle_genome(), config.start(), &config.physics),
            Instance::new(idle_genome(), (600, 100), &config.physics),
            Instance::new(idle_genome(), config.start(), &config.physics),
        ];
        let finishers = run_physics_tick(&course, &mut instances, &config.physics);
        assert_eq!(finishers, vec![0, 2]);
    }
}
