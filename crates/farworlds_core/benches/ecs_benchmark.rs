//! # ECS Benchmark
//!
//! Measures the deferred spawn path, a full tick with routed systems and
//! component access under the per-type store locks.
//!
//! Run with: `cargo bench --package farworlds_core`

#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use farworlds_core::{
    Component, EcsConfig, EcsResult, EntityId, FnSystem, Manager, SystemFilter, World,
};

#[derive(Clone, Debug)]
struct Guid(u64);
impl Component for Guid {}

#[derive(Clone, Debug)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

fn manager() -> Manager {
    let config = EcsConfig {
        trace_commands: false,
        entity_capacity: 100_000,
        store_capacity: 100_000,
        ..EcsConfig::default()
    };
    let mut manager = Manager::new(config).unwrap();
    for result in [
        manager.register_component::<Guid>(),
        manager.register_component::<Position>(),
        manager.register_component::<Velocity>(),
    ] {
        result.unwrap();
    }
    manager
}

fn populate(world: &World, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            world
                .create()
                .with(Guid(i as u64))
                .and_then(|b| b.with(Position { x: 0.0, y: 0.0 }))
                .and_then(|b| b.with(Velocity { dx: 1.0, dy: 0.5 }))
                .map(farworlds_core::EntityBuilder::commit)
                .unwrap()
        })
        .collect()
}

/// Benchmark: enqueue N spawns and flush them.
fn bench_spawn_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_flush");

    for count in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut manager = manager();
                let world = manager.world();
                populate(&world, count);
                black_box(manager.flush())
            });
        });
    }

    group.finish();
}

/// Benchmark: one tick with a movement system over 10k entities.
fn bench_tick(c: &mut Criterion) {
    let mut manager = manager();
    let world = manager.world();
    let entities = populate(&world, 10_000);
    manager.update(0.0);

    let filter = SystemFilter::new(
        world
            .tag_of::<Position>()
            .unwrap()
            .with(world.component_id::<Velocity>().unwrap()),
    );
    let routed = entities.clone();
    manager
        .register_system_filtered(
            FnSystem::new("movement", move |world: &World, dt| -> EcsResult<()> {
                for entity in &routed {
                    let Some(v) = world.get::<Velocity>(*entity) else {
                        continue;
                    };
                    world.with_mut(*entity, |p: &mut Position| {
                        p.x += v.dx * dt;
                        p.y += v.dy * dt;
                    });
                }
                Ok(())
            }),
            filter,
        )
        .unwrap();

    c.bench_function("tick_10k_movement", |b| {
        b.iter(|| black_box(manager.update(0.016)));
    });
}

/// Benchmark: bitmask `has` against store `get`.
fn bench_component_access(c: &mut Criterion) {
    let mut manager = manager();
    let world = manager.world();
    let entities = populate(&world, 10_000);
    manager.update(0.0);

    let mut group = c.benchmark_group("component_access");
    group.bench_function("has_bitmask", |b| {
        b.iter(|| entities.iter().filter(|e| world.has::<Position>(**e)).count());
    });
    group.bench_function("get_clone", |b| {
        b.iter(|| {
            entities
                .iter()
                .filter_map(|e| world.get::<Position>(*e))
                .count()
        });
    });
    group.bench_function("query_tag", |b| {
        let tag = world.tag_of::<Velocity>().unwrap();
        b.iter(|| black_box(world.query(tag)).len());
    });
    group.finish();
}

criterion_group!(benches, bench_spawn_flush, bench_tick, bench_component_access);
criterion_main!(benches);
