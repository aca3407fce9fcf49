//! Two tank platoons meet in the middle of a small map.
//!
//! Run with `RUST_LOG=boson_sim=debug cargo run --example skirmish` for the
//! unit lifecycle, or plain for the summary only.

use boson_sim::{
    BosonMap, Canvas, CanvasConfig, Condition, EffectProperties, EffectPropertiesTable, Player,
    PlayerId, Players, Position, SpeciesTheme,
};
use std::sync::Arc;
use tracing::{info, warn};

const SPECIES: &str = r#"{
    "name": "human",
    "units": [
        {
            "type_id": 1,
            "name": "light tank",
            "health": 120,
            "armor": 5,
            "speed": 0.3,
            "rotation_speed": 30.0,
            "exploding_damage": 20,
            "exploding_damage_range": 1.5,
            "exploding_fragment_count": 2,
            "exploding_fragment_damage": 5,
            "exploding_fragment_damage_range": 1.0,
            "destroyed_effects": [1],
            "weapons": [
                { "id": 1, "shot_type": "Rocket", "damage": 35, "range": 6.0, "reload": 25 }
            ]
        }
    ]
}"#;

const TANK: u32 = 1;
const MAX_TICKS: u64 = 3000;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let species = Arc::new(SpeciesTheme::from_json(SPECIES)?);
    let blue = PlayerId(1);
    let red = PlayerId(2);
    let players = Players::new(vec![
        Player::new(blue, "blue", 0, species.clone()),
        Player::new(red, "red", 1, species.clone()),
        Player::new(PlayerId(3), "neutral", 99, species),
    ]);
    let mut effects = EffectPropertiesTable::default();
    effects.insert(EffectProperties {
        id: 1,
        delay: 0.0,
        lifetime: Some(2.0),
    });

    let mut canvas = Canvas::new(BosonMap::new(48, 48), players, effects, CanvasConfig::default());
    canvas
        .listener_mut()
        .add_condition(Condition::new("UnitWithTypeDestroyed", "LogLoss"));

    for i in 0..6 {
        let row = 14.0 + 3.0 * i as f32;
        let b = canvas.create_unit(blue, TANK, Position::new(4.0, row, 0.0))?;
        let r = canvas.create_unit(red, TANK, Position::new(42.0, row, 0.0))?;
        canvas.order_move(b, 22.0, row)?;
        canvas.order_move(r, 25.0, row)?;
    }

    let mut tick = 0;
    while tick < MAX_TICKS && !canvas.listener().is_game_over() {
        tick += 1;
        canvas.slot_advance(tick, tick % 2 == 1)?;
        for event in canvas.process_events() {
            if event.name == "LogLoss" {
                info!(tick, unit = ?event.unit_id, player = ?event.player_id, "unit lost");
            }
        }
    }

    for player in canvas.players().iter() {
        info!(
            player = %player.id,
            units = player.units().len(),
            shots_fired = player.statistics().shots_fired,
            won = player.has_won,
            lost = player.has_lost,
            "final state"
        );
    }
    if !canvas.listener().is_game_over() {
        warn!(tick, "no winner before the tick limit");
    }

    let snapshot = canvas.snapshot();
    info!(tick = snapshot.tick, items = snapshot.items.len(), effects = snapshot.effects, "snapshot");
    let xml = canvas.save_as_xml()?;
    info!(bytes = xml.len(), "savegame written");
    info!("profile\n{}", canvas.profiler().summary());
    Ok(())
}
