use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

use crate::evolution::GenerationView;
use crate::physics::{Rect, Rgb, WORLD_HEIGHT, WORLD_WIDTH};
use crate::simulation::{Clock, SimulationConfig};
use crate::{EvoResource, SimulationMode};

// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

// Tags sprites rebuilt from the engine snapshot every frame
#[derive(Component)]
pub struct EntitySprite;

// Text fields of the control panel
#[derive(Resource)]
pub struct PanelState {
    pub requested_generation: u32,
    pub requested_map: u32,
}

impl Default for PanelState {
    fn default() -> Self {
        Self { requested_generation: 1, requested_map: 1 }
    }
}

/// Maps a top-left, y-down box to the centre of the same box in bevy's
/// y-up world with the simulation area centred on the origin.
pub fn screen_to_world(rect: &Rect) -> Vec2 {
    let center_x = rect.x as f32 + rect.width as f32 / 2.0;
    let center_y = rect.y as f32 + rect.height as f32 / 2.0;
    Vec2::new(center_x - WORLD_WIDTH as f32 / 2.0, WORLD_HEIGHT as f32 / 2.0 - center_y)
}

fn to_bevy_color(color: Rgb) -> Color {
    Color::rgb_u8(color.r, color.g, color.b)
}

// --- Systems ---

pub fn setup_graphics(mut commands: Commands) {
    commands.spawn((Camera2dBundle::default(), MainCamera));
    info!("Camera spawned over a {}x{} world", WORLD_WIDTH, WORLD_HEIGHT);
}

pub fn sync_entity_sprites(
    mut commands: Commands,
    evo_res: Res<EvoResource>,
    sprites: Query<Entity, With<EntitySprite>>,
) {
    for entity in sprites.iter() {
        commands.entity(entity).despawn();
    }

    for (depth, entity) in evo_res.0.snapshot().iter().enumerate() {
        let position = screen_to_world(&entity.rect);
        commands.spawn((
            SpriteBundle {
                sprite: Sprite {
                    color: to_bevy_color(entity.color),
                    custom_size: Some(Vec2::new(entity.rect.width as f32, entity.rect.height as f32)),
                    ..default()
                },
                // Later entities draw on top, matching dispatch order
                transform: Transform::from_xyz(position.x, position.y, depth as f32 * 0.001),
                ..default()
            },
            EntitySprite,
        ));
    }
}

pub fn ui_control_panel(
    mut contexts: EguiContexts,
    mut evo_res: ResMut<EvoResource>,
    mut clock: ResMut<Clock>,
    mut panel: ResMut<PanelState>,
    config: Res<SimulationConfig>,
    sim_mode: Res<State<SimulationMode>>,
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
) {
    let engine = &mut evo_res.0;
    egui::Window::new("Navigator Controls").show(contexts.ctx_mut(), |ui| {
        ui.label(format!("Mode: {:?}", sim_mode.get()));
        ui.label(format!("Map: {}", engine.map_id()));
        ui.label(format!(
            "Population {} | mutation {}% | {} ms per generation",
            config.population_size, config.mutation_percent, config.time_budget_ms
        ));
        let showing = match engine.current_view() {
            GenerationView::Numbered(n) => format!("Generation {} of {}", n, engine.latest_generation()),
            GenerationView::Champion => "Successful Character".to_string(),
        };
        ui.label(showing);
        ui.label(format!("Time left: {:.2}s", engine.countdown_ms() as f32 / 1000.0));
        if let Some(best) = engine.find_top_performer() {
            ui.label(format!("Best fitness: {}", best.fitness()));
        }
        if engine.is_complete() {
            ui.colored_label(egui::Color32::from_rgb(0, 160, 0), "Course completed");
        }
        ui.separator();

        let running = *sim_mode.get() == SimulationMode::Running;
        if ui.button(if running { "Pause" } else { "Start" }).clicked() {
            next_sim_mode.set(if running { SimulationMode::Paused } else { SimulationMode::Running });
        }

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Generation:");
            ui.add(egui::DragValue::new(&mut panel.requested_generation).clamp_range(1..=engine.latest_generation().max(1)));
            if ui.button("Show").clicked() {
                match engine.change_generation(GenerationView::Numbered(panel.requested_generation)) {
                    Ok(()) => clock.reset(),
                    Err(err) => warn!("Generation change rejected: {err}"),
                }
            }
        });
        if ui
            .add_enabled(engine.is_complete(), egui::Button::new("Show successful character"))
            .clicked()
        {
            match engine.change_generation(GenerationView::Champion) {
                Ok(()) => clock.reset(),
                Err(err) => warn!("Champion replay unavailable: {err}"),
            }
        }

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Map:");
            ui.add(egui::DragValue::new(&mut panel.requested_map));
            if ui.button("Load").clicked() {
                engine.load_map(panel.requested_map);
                clock.reset();
                panel.requested_generation = engine.latest_generation().max(1);
            }
        });

        ui.separator();
        ui.label("Space - Start / Pause");
        ui.label("C - Show successful character");
    });
}
