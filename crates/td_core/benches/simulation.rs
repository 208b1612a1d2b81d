//! Simulation benchmarks for td_core.
//!
//! Run with: `cargo bench -p td_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use td_core::config::GameConfig;
use td_core::game::Game;
use td_core::math::percent;
use td_core::tower::TowerType;

fn defended_game() -> Game {
    let config = GameConfig {
        starting_gold: 5_000,
        first_round_delay: percent(10),
        ..GameConfig::default()
    };
    let mut game = Game::new(config).expect("default config is valid");
    game.start();
    for (slot, tower_type) in [TowerType::Basic, TowerType::Frost, TowerType::Fire]
        .into_iter()
        .cycle()
        .take(8)
        .enumerate()
    {
        let _ = game.build_tower(slot, tower_type);
    }
    game
}

/// One round of a fully built board, tick by tick.
pub fn simulation_benchmark(c: &mut Criterion) {
    c.bench_function("round_one_300_ticks", |b| {
        b.iter_batched(
            defended_game,
            |mut game| {
                for _ in 0..300 {
                    game.tick(percent(10));
                }
                black_box(game.state_hash())
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("state_hash", |b| {
        let mut game = defended_game();
        for _ in 0..50 {
            game.tick(percent(10));
        }
        b.iter(|| black_box(game.state_hash()))
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
