use boson_sim::{
    BosonMap, Canvas, CanvasConfig, EffectPropertiesTable, Player, PlayerId, Players, Position,
    ShotType, SpeciesTheme, UnitProperties, WeaponProperties,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;

const TANK: u32 = 1;

fn populated_canvas(units_per_side: u32) -> Canvas {
    let mut species = SpeciesTheme::new("bench");
    species.insert(UnitProperties {
        type_id: TANK,
        name: "tank".into(),
        health: 200,
        speed: 0.2,
        weapons: vec![WeaponProperties {
            id: 1,
            shot_type: ShotType::Rocket,
            damage: 10,
            range: 5.0,
            reload: 20,
            ..WeaponProperties::default()
        }],
        ..UnitProperties::default()
    });
    let species = Arc::new(species);
    let players = Players::new(vec![
        Player::new(PlayerId(1), "blue", 0, species.clone()),
        Player::new(PlayerId(2), "red", 1, species.clone()),
        Player::new(PlayerId(3), "neutral", 99, species),
    ]);
    let mut canvas = Canvas::new(
        BosonMap::new(128, 128),
        players,
        EffectPropertiesTable::default(),
        CanvasConfig::default(),
    );
    for i in 0..units_per_side {
        let (col, row) = ((i % 20) as f32 * 2.0, (i / 20) as f32 * 2.0);
        // Placement can fail at the map edge for large counts; skip those.
        let _ = canvas.create_unit(PlayerId(1), TANK, Position::new(10.0 + col, 10.0 + row, 0.0));
        let _ = canvas.create_unit(PlayerId(2), TANK, Position::new(70.0 + col, 10.0 + row, 0.0));
    }
    canvas
}

fn bench_slot_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_advance");
    for units in [50_u32, 200, 800] {
        group.bench_function(format!("units{units}_ticks100"), |b| {
            b.iter_batched(
                || populated_canvas(units),
                |mut canvas| {
                    for tick in 1..=100 {
                        canvas.slot_advance(tick, tick % 2 == 1).unwrap();
                    }
                    canvas
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_slot_advance);
criterion_main!(benches);
