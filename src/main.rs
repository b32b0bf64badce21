mod character;
mod collision;
mod evolution;
mod organism;
mod persistence;
mod physics;
mod simulation;
mod visualization;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::{
    app::{AppExit, ScheduleRunnerPlugin},
    log::LogPlugin,
    prelude::*,
    window::PresentMode,
};
use bevy_egui::EguiPlugin;
use clap::Parser;

use evolution::{EvolutionEngine, GenerationView, TickOutcome};
use persistence::FileStore;
use physics::{WORLD_HEIGHT, WORLD_WIDTH};
use simulation::{Clock, SimulationConfig};
use visualization::*;

/// Evolves timed movement commands that steer a character across a map
#[derive(Parser, Debug)]
#[command(name = "evo_navigator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the maps/ tree
    #[arg(long, default_value = "final_files")]
    data_dir: PathBuf,

    /// Map to open at startup
    #[arg(long, default_value_t = 1)]
    map: u32,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Instances per generation
    #[arg(long, default_value_t = 10)]
    population: usize,

    /// Mutation strength in percent (0-100)
    #[arg(long, default_value_t = 10)]
    mutation_rate: u32,

    /// Simulated time each generation gets, in milliseconds
    #[arg(long, default_value_t = 7000)]
    time_budget_ms: u32,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Generations to run before exiting in headless mode
    #[arg(long, default_value_t = 10)]
    generations: u32,
}

impl Args {
    fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            population_size: self.population,
            mutation_percent: self.mutation_rate,
            time_budget_ms: self.time_budget_ms,
            seed: self.seed,
            ..Default::default()
        }
    }
}

// --- Bevy App Setup ---

// Resource owning the evolution engine
#[derive(Resource)]
pub struct EvoResource(pub EvolutionEngine);

#[derive(States, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SimulationMode {
    #[default]
    Paused,
    Running,
}

// Remaining generation advances before a headless run exits
#[derive(Resource)]
struct HeadlessRun {
    remaining: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.simulation_config();
    config.validate().context("invalid simulation settings")?;

    // Plugins go in first so the log subscriber is up before the map loads
    let mut app = App::new();
    if args.headless {
        app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
            .add_plugins(LogPlugin::default())
            .insert_resource(HeadlessRun { remaining: args.generations })
            .add_systems(Update, advance_simulation);
    } else {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Evolutionary Navigator".into(),
                resolution: (WORLD_WIDTH as f32, WORLD_HEIGHT as f32).into(),
                present_mode: PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin)
        .insert_resource(ClearColor(Color::WHITE))
        .add_state::<SimulationMode>()
        .init_resource::<PanelState>()
        // One simulation tick per fixed step
        .insert_resource(Time::<Fixed>::from_seconds(config.tick_ms as f64 / 1000.0))
        .add_systems(Startup, setup_graphics)
        .add_systems(FixedUpdate, advance_simulation.run_if(in_state(SimulationMode::Running)))
        .add_systems(Update, (keyboard_controls, ui_control_panel, sync_entity_sprites));
    }

    let store = FileStore::new(&args.data_dir);
    info!("Using data directory {}", store.root().display());
    let engine = EvolutionEngine::new(config.clone(), Box::new(store), args.map)
        .with_context(|| format!("could not start on map {}", args.map))?;

    app.insert_resource(Clock::new(config.tick_ms))
        .insert_resource(config)
        .insert_resource(EvoResource(engine))
        .run();
    Ok(())
}

fn advance_simulation(
    mut evo_res: ResMut<EvoResource>,
    mut clock: ResMut<Clock>,
    headless: Option<ResMut<HeadlessRun>>,
    mut exit: EventWriter<AppExit>,
) {
    let elapsed_ms = clock.tick();
    match evo_res.0.step(elapsed_ms) {
        TickOutcome::Running => {}
        TickOutcome::ChampionFound => {
            info!("Map {} completed", evo_res.0.map_id());
        }
        TickOutcome::GenerationAdvanced(view) => {
            clock.reset();
            if let Some(mut run) = headless {
                run.remaining = run.remaining.saturating_sub(1);
                info!("Now showing {:?}, {} generations left in this run", view, run.remaining);
                if run.remaining == 0 {
                    exit.send(AppExit);
                }
            }
        }
    }
}

fn keyboard_controls(
    keyboard_input: Res<Input<KeyCode>>,
    current_sim_mode: Res<State<SimulationMode>>,
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
    mut evo_res: ResMut<EvoResource>,
    mut clock: ResMut<Clock>,
) {
    if keyboard_input.just_pressed(KeyCode::Space) {
        match *current_sim_mode.get() {
            SimulationMode::Paused => {
                info!("Resuming simulation");
                next_sim_mode.set(SimulationMode::Running);
            }
            SimulationMode::Running => {
                info!("Pausing simulation");
                next_sim_mode.set(SimulationMode::Paused);
            }
        }
    }

    if keyboard_input.just_pressed(KeyCode::C) {
        match evo_res.0.change_generation(GenerationView::Champion) {
            Ok(()) => clock.reset(),
            Err(err) => warn!("C: {err}"),
        }
    }
}
