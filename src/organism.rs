use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::character::{Character, ControlFlags};
use crate::physics::PhysicsParameters;
use crate::simulation::ConfigError;

// --- Gene Constants ---
pub const DEFAULT_GENOME_LENGTH: usize = 5;
pub const SEED_THRESHOLD_STEP_MS: u32 = 1000;
pub const MAX_MUTATION_PERCENT: u32 = 100;

// Each flag flips with probability percent / FLIP_DENOMINATOR
const FLIP_DENOMINATOR: u32 = 400;
// Threshold offsets span +/- this many milliseconds per percent of mutation rate
const THRESHOLD_SPREAD_PER_PERCENT: i64 = 10;
const MIN_THRESHOLD_MS: i64 = 1;

// --- Gene Structs ---

/// One timed movement command. Once `threshold_ms` has elapsed the command's
/// flags become eligible to drive the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub jump: bool,
    pub left: bool,
    pub right: bool,
    pub threshold_ms: u32,
}

impl Command {
    pub const fn new(jump: bool, left: bool, right: bool, threshold_ms: u32) -> Self {
        Self { jump, left, right, threshold_ms }
    }

    pub fn controls(&self) -> ControlFlags {
        ControlFlags { jump: self.jump, left: self.left, right: self.right }
    }
}

// Mutation strength in percent, validated to at most 100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRate {
    percent: u32,
}

impl MutationRate {
    pub fn new(percent: u32) -> Result<Self, ConfigError> {
        if percent > MAX_MUTATION_PERCENT {
            return Err(ConfigError::MutationRateTooHigh(percent));
        }
        Ok(Self { percent })
    }

    // Rate used to reset an instance without changing its genome
    pub const fn zero() -> Self {
        Self { percent: 0 }
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }
}

// --- Genome Struct ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genome {
    commands: Vec<Command>,
}

impl Genome {
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Bootstrap genome: every command jumps and presses both directions,
    /// with thresholds one second apart starting at zero.
    pub fn seed(length: usize) -> Self {
        let commands = (0..length)
            .map(|i| Command::new(true, true, true, SEED_THRESHOLD_STEP_MS * i as u32))
            .collect();
        Self { commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns a mutated copy. Every field of every command mutates
    /// independently; a zero rate walks the same path and yields an equal genome.
    pub fn mutate<R: Rng + ?Sized>(&self, rate: &MutationRate, rng: &mut R) -> Genome {
        let spread = THRESHOLD_SPREAD_PER_PERCENT * rate.percent as i64;
        let offsets = Uniform::new_inclusive(-spread, spread);
        let commands = self
            .commands
            .iter()
            .map(|command| {
                let jump = command.jump ^ rng.gen_ratio(rate.percent, FLIP_DENOMINATOR);
                let right = command.right ^ rng.gen_ratio(rate.percent, FLIP_DENOMINATOR);
                let left = command.left ^ rng.gen_ratio(rate.percent, FLIP_DENOMINATOR);

                let offset = offsets.sample(rng);
                let threshold_ms = perturb_threshold(command.threshold_ms, offset);

                Command { jump, left, right, threshold_ms }
            })
            .collect();
        Genome { commands }
    }
}

fn perturb_threshold(threshold_ms: u32, offset: i64) -> u32 {
    if offset == 0 {
        return threshold_ms;
    }
    let shifted = (threshold_ms as i64 + offset).max(MIN_THRESHOLD_MS);
    u32::try_from(shifted).unwrap_or(u32::MAX)
}

// === Instance ===

/// A character driven by a genome, with its accumulated fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub character: Character,
    genome: Genome,
    fitness: i64,
}

impl Instance {
    pub fn new(genome: Genome, start: (i32, i32), params: &PhysicsParameters) -> Self {
        Self {
            character: Character::new(start.0, start.1, params),
            genome,
            fitness: 0,
        }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn fitness(&self) -> i64 {
        self.fitness
    }

    pub fn is_alive(&self) -> bool {
        self.character.is_alive()
    }

    /// Applies the genome for the time elapsed since the generation started.
    /// Every command whose threshold has passed overwrites the flags in turn,
    /// so the last elapsed command in genome order stays in effect.
    pub fn apply_schedule(&mut self, elapsed_ms: u32, budget_ms: u32) {
        if elapsed_ms > budget_ms {
            self.character.kill();
            return;
        }
        for command in &self.genome.commands {
            if command.threshold_ms < elapsed_ms {
                self.character.controls = command.controls();
            }
        }
    }

    // Distance reward, halved once the character is dead
    pub fn accumulate_fitness(&mut self) {
        let x = self.character.rect().x as i64;
        self.fitness += if self.character.is_alive() { x } else { x / 2 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_genome<R: Rng>(rng: &mut R, length: usize) -> Genome {
        let commands = (0..length)
            .map(|_| Command::new(rng.gen(), rng.gen(), rng.gen(), rng.gen_range(1..10_000)))
            .collect();
        Genome::from_commands(commands)
    }

    #[test]
    fn seed_genome_layout() {
        let seed = Genome::seed(DEFAULT_GENOME_LENGTH);
        assert_eq!(seed.len(), 5);
        for (i, command) in seed.commands().iter().enumerate() {
            assert!(command.jump && command.left && command.right);
            assert_eq!(command.threshold_ms, 1000 * i as u32);
        }
    }

    #[test]
    fn zero_rate_mutation_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let zero = MutationRate::zero();
        for length in [1, 5, 12] {
            for _ in 0..50 {
                let genome = random_genome(&mut rng, length);
                assert_eq!(genome.mutate(&zero, &mut rng), genome);
            }
        }
        // The seed genome keeps its zero threshold too
        let seed = Genome::seed(5);
        assert_eq!(seed.mutate(&MutationRate::new(0).unwrap(), &mut rng), seed);
    }

    #[test]
    fn mutation_preserves_length_and_minimum_threshold() {
        let mut rng = StdRng::seed_from_u64(42);
        let rate = MutationRate::new(100).unwrap();
        for _ in 0..200 {
            let genome = random_genome(&mut rng, 5);
            let mutated = genome.mutate(&rate, &mut rng);
            assert_eq!(mutated.len(), genome.len());
            assert!(mutated.commands().iter().all(|c| c.threshold_ms >= 1));
        }
    }

    #[test]
    fn threshold_offset_stays_within_spread() {
        let mut rng = StdRng::seed_from_u64(3);
        let rate = MutationRate::new(10).unwrap();
        let genome = Genome::from_commands(vec![Command::new(false, false, false, 5_000); 5]);
        for _ in 0..200 {
            let mutated = genome.mutate(&rate, &mut rng);
            for command in mutated.commands() {
                let delta = command.threshold_ms as i64 - 5_000;
                assert!(delta.abs() <= 100, "offset {delta} out of range");
            }
        }
    }

    #[test]
    fn nonzero_rate_eventually_changes_genome() {
        let mut rng = StdRng::seed_from_u64(11);
        let rate = MutationRate::new(10).unwrap();
        let genome = Genome::seed(5);
        let changed = (0..20).any(|_| genome.mutate(&rate, &mut rng) != genome);
        assert!(changed);
    }

    #[test]
    fn rejects_rate_above_hundred() {
        assert!(matches!(MutationRate::new(101), Err(ConfigError::MutationRateTooHigh(101))));
        assert_eq!(MutationRate::new(100).unwrap().percent(), 100);
    }

    #[test]
    fn latest_elapsed_command_wins() {
        let params = PhysicsParameters::default();
        let genome = Genome::from_commands(vec![
            Command::new(true, false, false, 0),
            Command::new(false, true, false, 100),
            Command::new(false, false, true, 50),
        ]);
        let mut instance = Instance::new(genome, (5, 400), &params);

        instance.apply_schedule(13, 7000);
        assert_eq!(instance.character.controls, ControlFlags { jump: true, left: false, right: false });

        // Command at 50 ms is later in order than the one at 0 ms
        instance.apply_schedule(60, 7000);
        assert_eq!(instance.character.controls, ControlFlags { jump: false, left: false, right: true });

        // Both 100 ms and 50 ms have passed; the later-indexed one sticks
        instance.apply_schedule(200, 7000);
        assert_eq!(instance.character.controls, ControlFlags { jump: false, left: false, right: true });
    }

    #[test]
    fn threshold_must_be_strictly_passed() {
        let params = PhysicsParameters::default();
        let genome = Genome::from_commands(vec![Command::new(false, false, true, 26)]);
        let mut instance = Instance::new(genome, (5, 400), &params);
        instance.apply_schedule(26, 7000);
        assert_eq!(instance.character.controls, ControlFlags::default());
        instance.apply_schedule(39, 7000);
        assert!(instance.character.controls.right);
    }

    #[test]
    fn schedule_past_budget_kills() {
        let params = PhysicsParameters::default();
        let mut instance = Instance::new(Genome::seed(5), (5, 400), &params);
        instance.apply_schedule(7000, 7000);
        assert!(instance.is_alive());
        instance.apply_schedule(7013, 7000);
        assert!(!instance.is_alive());
    }

    #[test]
    fn dead_instances_earn_half_credit() {
        let params = PhysicsParameters::default();
        let mut alive = Instance::new(Genome::seed(5), (240, 400), &params);
        let mut dead = alive.clone();
        dead.character.kill();
        for _ in 0..10 {
            alive.accumulate_fitness();
            dead.accumulate_fitness();
        }
        assert_eq!(alive.fitness(), 2400);
        assert_eq!(dead.fitness(), alive.fitness() / 2);
    }
}
