use std::collections::BTreeMap;

use bevy::log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::organism::{Genome, Instance, MutationRate};
use crate::persistence::{MapStatus, PersistenceError, PersistenceGateway};
use crate::physics::{GeometryDescriptor, Rect, Rgb};
use crate::simulation::{run_physics_tick, ConfigError, Course, SimulationConfig};

/// Which population is on screen: an ordinary numbered generation or the
/// single-instance replay of the champion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationView {
    Numbered(u32),
    Champion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    ChampionFound,
    // The caller restarts its clock from zero
    GenerationAdvanced(GenerationView),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("generation {requested} is out of range (latest is {latest})")]
    GenerationOutOfRange { requested: u32, latest: u32 },
    #[error("no instance has reached the finish yet")]
    NoChampion,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

// Box and color of one live entity, for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub rect: Rect,
    pub color: Rgb,
}

// Everything tied to the loaded map. Replaced as a whole on map load.
struct MapSession {
    course: Course,
    instances: Vec<Instance>,
    current_generation: u32,
    latest_generation: u32,
    view: GenerationView,
    champion: Option<Genome>,
    // Every generation seen this run; stays authoritative when writes fail
    archive: BTreeMap<u32, Vec<Genome>>,
}

impl MapSession {
    fn unloaded(map_id: u32) -> Self {
        Self {
            course: Course::from_descriptors(map_id, &[]),
            instances: Vec::new(),
            current_generation: 0,
            latest_generation: 0,
            view: GenerationView::Numbered(0),
            champion: None,
            archive: BTreeMap::new(),
        }
    }
}

fn spawn_instances(genomes: &[Genome], config: &SimulationConfig) -> Vec<Instance> {
    genomes
        .iter()
        .map(|genome| Instance::new(genome.clone(), config.start(), &config.physics))
        .collect()
}

pub struct EvolutionEngine {
    config: SimulationConfig,
    mutation_rate: MutationRate,
    rng: StdRng,
    store: Box<dyn PersistenceGateway>,
    session: MapSession,
    elapsed_ms: u32,
}

impl EvolutionEngine {
    pub fn new(config: SimulationConfig, store: Box<dyn PersistenceGateway>, map_id: u32) -> Result<Self, ConfigError> {
        config.validate()?;
        let mutation_rate = config.mutation_rate()?;
        let rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let mut engine = Self {
            config,
            mutation_rate,
            rng,
            store,
            session: MapSession::unloaded(map_id),
            elapsed_ms: 0,
        };
        engine.load_map(map_id);
        Ok(engine)
    }

    // --- Map Loading ---

    /// Replaces geometry, population, counters and champion in one step.
    /// Load problems are logged and recovered from, never returned.
    pub fn load_map(&mut self, map_id: u32) {
        let geometry = self.load_geometry(map_id);
        let course = Course::from_descriptors(map_id, &geometry);
        let session = self.open_session(course);

        info!(
            "map {map_id}: loaded {} geometry blocks, showing {:?} (latest generation {})",
            geometry.len(),
            session.view,
            session.latest_generation
        );
        self.session = session;
        self.elapsed_ms = 0;
    }

    fn load_geometry(&mut self, map_id: u32) -> Vec<GeometryDescriptor> {
        match self.store.load_map_geometry(map_id) {
            Ok(geometry) => geometry,
            Err(PersistenceError::NotFound(path)) => {
                warn!("map {map_id}: no geometry at {}, creating an empty map", path.display());
                if let Err(err) = self.store.save_map_geometry(map_id, &[]) {
                    error!("map {map_id}: could not create empty map: {err}");
                }
                self.persist_status(map_id, &MapStatus::default());
                Vec::new()
            }
            Err(err) => {
                error!("map {map_id}: {err}; continuing without geometry");
                Vec::new()
            }
        }
    }

    fn open_session(&mut self, course: Course) -> MapSession {
        let map_id = course.map_id();
        match self.store.load_map_status(map_id) {
            Ok(MapStatus { generation, champion: Some(champion) }) => {
                info!("map {map_id}: completed at generation {generation}, opening champion replay");
                let replay = champion.mutate(&MutationRate::zero(), &mut self.rng);
                MapSession {
                    course,
                    instances: spawn_instances(&[replay], &self.config),
                    current_generation: generation,
                    latest_generation: generation,
                    view: GenerationView::Champion,
                    champion: Some(champion),
                    archive: BTreeMap::new(),
                }
            }
            Ok(MapStatus { generation, champion: None }) if generation >= 1 => {
                match self.load_stored_generation(map_id, generation) {
                    Ok(genomes) => {
                        info!("map {map_id}: resuming generation {generation}");
                        MapSession {
                            course,
                            instances: spawn_instances(&genomes, &self.config),
                            current_generation: generation,
                            latest_generation: generation,
                            view: GenerationView::Numbered(generation),
                            champion: None,
                            archive: BTreeMap::from([(generation, genomes)]),
                        }
                    }
                    Err(err) => {
                        warn!("map {map_id}: cannot resume generation {generation}: {err}");
                        self.bootstrap(course)
                    }
                }
            }
            Ok(_) | Err(PersistenceError::NotFound(_)) => self.bootstrap(course),
            Err(err) => {
                warn!("map {map_id}: unreadable status: {err}");
                self.bootstrap(course)
            }
        }
    }

    /// Fresh first generation: the seed genome followed by a chain where each
    /// instance mutates the one before it.
    fn bootstrap(&mut self, course: Course) -> MapSession {
        let map_id = course.map_id();
        let mut genomes = Vec::with_capacity(self.config.population_size);
        genomes.push(Genome::seed(self.config.genome_length));
        for i in 1..self.config.population_size {
            let next = genomes[i - 1].mutate(&self.mutation_rate, &mut self.rng);
            genomes.push(next);
        }

        self.persist_generation(map_id, 1, &genomes);
        self.persist_status(map_id, &MapStatus::new(1, None));
        info!("map {map_id}: bootstrapped generation 1 with {} instances", genomes.len());

        MapSession {
            course,
            instances: spawn_instances(&genomes, &self.config),
            current_generation: 1,
            latest_generation: 1,
            view: GenerationView::Numbered(1),
            champion: None,
            archive: BTreeMap::from([(1, genomes)]),
        }
    }

    // --- Tick ---

    /// Advances the simulation to `elapsed_ms`, the time since the current
    /// generation started. Past the time budget the generation is retired
    /// instead of running physics.
    pub fn step(&mut self, elapsed_ms: u32) -> TickOutcome {
        self.elapsed_ms = elapsed_ms;
        let budget = self.config.time_budget_ms;

        for instance in &mut self.session.instances {
            instance.apply_schedule(elapsed_ms, budget);
        }
        for instance in &mut self.session.instances {
            instance.accumulate_fitness();
        }

        if elapsed_ms > budget {
            return TickOutcome::GenerationAdvanced(self.next_generation());
        }

        let finishers = run_physics_tick(&self.session.course, &mut self.session.instances, &self.config.physics);
        match finishers.first() {
            Some(&index) if self.session.champion.is_none() => {
                self.record_champion(index);
                TickOutcome::ChampionFound
            }
            _ => TickOutcome::Running,
        }
    }

    fn record_champion(&mut self, index: usize) {
        let map_id = self.map_id();
        let genome = self.session.instances[index].genome().clone();
        info!(
            "map {map_id}: instance {index} of {:?} reached the finish after {} ms",
            self.session.view, self.elapsed_ms
        );
        let status = MapStatus::new(self.session.latest_generation, Some(genome.clone()));
        self.session.champion = Some(genome);
        self.persist_status(map_id, &status);
    }

    // --- Generation Transitions ---

    fn next_generation(&mut self) -> GenerationView {
        let map_id = self.map_id();
        let current = self.session.current_generation;
        let latest = self.session.latest_generation;

        let champion = self.session.champion.clone();
        let replay = champion.is_some() && (self.session.view == GenerationView::Champion || latest <= current + 1);
        if !replay && current < latest {
            match self.fetch_generation(map_id, current + 1) {
                Ok(genomes) => {
                    self.install(current + 1, genomes);
                    info!("map {map_id}: moved on to stored generation {}", current + 1);
                    return self.session.view;
                }
                // Counters and champion stay; only the browsing step is skipped
                Err(err) => warn!("map {map_id}: generation {} unavailable: {err}", current + 1),
            }
        }

        match champion {
            Some(champion) => {
                self.show_champion(champion);
                debug!("map {map_id}: replaying champion");
            }
            None => self.breed_next_generation(),
        }
        self.session.view
    }

    // Elitism at slot 0, rate mutations of the same top performer elsewhere
    fn breed_next_generation(&mut self) {
        let map_id = self.map_id();
        let Some((top, best_fitness)) = self.find_top_performer().map(|i| (i.genome().clone(), i.fitness())) else {
            warn!("map {map_id}: empty population, bootstrapping");
            let course = self.session.course.clone();
            self.session = self.bootstrap(course);
            return;
        };

        let retired_index = self.session.current_generation;
        let retired: Vec<Genome> = self.session.instances.iter().map(|i| i.genome().clone()).collect();

        let mut genomes = Vec::with_capacity(self.config.population_size);
        genomes.push(top.mutate(&MutationRate::zero(), &mut self.rng));
        for _ in 1..self.config.population_size {
            genomes.push(top.mutate(&self.mutation_rate, &mut self.rng));
        }

        let next = self.session.latest_generation + 1;
        self.persist_generation(map_id, retired_index, &retired);
        self.persist_generation(map_id, next, &genomes);
        self.persist_status(map_id, &MapStatus::new(next, None));
        info!("map {map_id}: generation {retired_index} best fitness {best_fitness}, bred generation {next}");

        self.session.latest_generation = next;
        self.session.archive.insert(next, genomes.clone());
        self.install(next, genomes);
    }

    /// Highest fitness in the live population; the earliest instance wins ties.
    pub fn find_top_performer(&self) -> Option<&Instance> {
        self.session.instances.iter().fold(None, |best, candidate| match best {
            Some(best) if best.fitness() >= candidate.fitness() => Some(best),
            _ => Some(candidate),
        })
    }

    /// User-driven switch to a stored generation or to the champion replay.
    /// A rejected request leaves the engine untouched.
    pub fn change_generation(&mut self, view: GenerationView) -> Result<(), EngineError> {
        let map_id = self.map_id();
        match view {
            GenerationView::Champion => {
                let champion = self.session.champion.clone().ok_or(EngineError::NoChampion)?;
                self.show_champion(champion);
                info!("map {map_id}: switched to champion replay");
            }
            GenerationView::Numbered(requested) => {
                let latest = self.session.latest_generation;
                if requested == 0 || requested > latest {
                    warn!("map {map_id}: generation {requested} requested, latest is {latest}");
                    return Err(EngineError::GenerationOutOfRange { requested, latest });
                }
                let genomes = self.fetch_generation(map_id, requested)?;
                self.install(requested, genomes);
                info!("map {map_id}: switched to generation {requested}");
            }
        }
        Ok(())
    }

    fn fetch_generation(&mut self, map_id: u32, generation: u32) -> Result<Vec<Genome>, PersistenceError> {
        if let Some(genomes) = self.session.archive.get(&generation) {
            return Ok(genomes.clone());
        }
        let genomes = self.load_stored_generation(map_id, generation)?;
        self.session.archive.insert(generation, genomes.clone());
        Ok(genomes)
    }

    // Stored populations must match the configured population size and genome length
    fn load_stored_generation(&self, map_id: u32, generation: u32) -> Result<Vec<Genome>, PersistenceError> {
        let genomes = self.store.load_generation(map_id, generation)?;
        let mismatch = |reason: String| PersistenceError::ShapeMismatch { map_id, generation, reason };

        if genomes.len() != self.config.population_size {
            return Err(mismatch(format!(
                "{} genomes stored, population size is {}",
                genomes.len(),
                self.config.population_size
            )));
        }
        if let Some(genome) = genomes.iter().find(|g| g.len() != self.config.genome_length) {
            return Err(mismatch(format!(
                "genome of {} commands stored, genome length is {}",
                genome.len(),
                self.config.genome_length
            )));
        }
        Ok(genomes)
    }

    fn install(&mut self, generation: u32, genomes: Vec<Genome>) {
        self.session.instances = spawn_instances(&genomes, &self.config);
        self.session.current_generation = generation;
        self.session.view = GenerationView::Numbered(generation);
        self.elapsed_ms = 0;
    }

    fn show_champion(&mut self, champion: Genome) {
        // Zero-rate copy puts the replay back on the start line
        let replay = champion.mutate(&MutationRate::zero(), &mut self.rng);
        self.session.instances = spawn_instances(&[replay], &self.config);
        self.session.view = GenerationView::Champion;
        self.elapsed_ms = 0;
    }

    // --- Persistence ---

    fn persist_generation(&mut self, map_id: u32, generation: u32, genomes: &[Genome]) {
        if let Err(err) = self.store.save_generation(map_id, generation, genomes) {
            error!("map {map_id}: generation {generation} kept in memory only: {err}");
        }
    }

    fn persist_status(&mut self, map_id: u32, status: &MapStatus) {
        if let Err(err) = self.store.save_map_status(map_id, status) {
            error!("map {map_id}: status not saved: {err}");
        }
    }

    // --- Observers ---

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn map_id(&self) -> u32 {
        self.session.course.map_id()
    }

    pub fn current_view(&self) -> GenerationView {
        self.session.view
    }

    pub fn current_generation(&self) -> u32 {
        self.session.current_generation
    }

    pub fn latest_generation(&self) -> u32 {
        self.session.latest_generation
    }

    pub fn is_complete(&self) -> bool {
        self.session.champion.is_some()
    }

    pub fn champion(&self) -> Option<&Genome> {
        self.session.champion.as_ref()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.session.instances
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    // Time left before the current generation is retired
    pub fn countdown_ms(&self) -> u32 {
        self.config.time_budget_ms.saturating_sub(self.elapsed_ms)
    }

    /// Static geometry first, then every instance, in dispatch order.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        let geometry = self
            .session
            .course
            .geometry()
            .iter()
            .map(|g| EntitySnapshot { rect: *g.rect(), color: g.color() });
        let characters = self
            .session
            .instances
            .iter()
            .map(|i| EntitySnapshot { rect: *i.character.rect(), color: i.character.body.color });
        geometry.chain(characters).collect()
    }
}
