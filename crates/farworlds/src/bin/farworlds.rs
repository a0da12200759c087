//! # FAR WORLDS Headless Runner
//!
//! Boots the manager, registers the map components and systems, then drives
//! a short scripted session:
//!
//! 1. one entity gains and loses components across ticks, then is destroyed
//! 2. background threads spawn entities while the main thread keeps ticking
//! 3. the session ends once every spawner has finished and been flushed
//!
//! Usage: `farworlds [config.toml]`

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use farworlds::{
    init_telemetry, register_components, register_systems, Guid, MapItem, MapItemMovement,
};
use farworlds_core::{EcsConfig, EcsError, EcsResult, EntityId, Manager, World};

/// Simulated frame time.
const DT: f32 = 0.1;

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => EcsConfig::load(path),
        None => Ok(EcsConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("farworlds: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = init_telemetry(&config.log_filter) {
        eprintln!("farworlds: {err}");
    }

    if let Err(err) = run(config) {
        tracing::error!(%err, "session aborted");
        std::process::exit(1);
    }
}

fn run(config: EcsConfig) -> EcsResult<()> {
    let mut manager = Manager::new(config)?;
    register_components(&mut manager)?;
    let guids = register_systems(&mut manager)?;
    let world = manager.world();

    tracing::info!(systems = ?manager.systems(), "session starting");

    // =========================================================================
    // PHASE 1: One entity through its whole lifecycle
    // =========================================================================
    let entity = spawn_wanderer(&world)?;
    manager.update(DT);

    world.enqueue_add_component(entity, MapItem::default())?;
    manager.update(DT);

    world.enqueue_remove_component::<Guid>(entity)?;
    manager.update(DT);

    manager.destroy(entity);
    manager.update(DT);

    // =========================================================================
    // PHASE 2: Background spawners racing the tick loop
    // =========================================================================
    let mut spawners: Vec<JoinHandle<EcsResult<EntityId>>> = (0..6).map(|_| spawner(&world)).collect();
    let entity2 = spawn_wanderer(&world)?;
    spawners.extend((0..2).map(|_| spawner(&world)));
    manager.update(DT);

    spawners.extend((0..4).map(|_| spawner(&world)));
    manager.update(DT);

    manager.destroy(entity2);
    manager.update(DT);

    let mut spawned = Vec::with_capacity(spawners.len());
    for handle in spawners {
        let entity = handle
            .join()
            .map_err(|_| EcsError::system("spawner", "thread panicked"))??;
        spawned.push(entity);
    }
    let stats = manager.update(DT);

    let indexed = spawned
        .iter()
        .filter_map(|e| world.get::<Guid>(*e))
        .filter(|guid| guids.get(guid.as_str()).is_some())
        .count();

    tracing::info!(
        ticks = stats.ticks,
        live = world.live_count(),
        spawned = spawned.len(),
        indexed,
        system_failures = stats.system_failures,
        max_tick_us = stats.max_tick_us,
        "session finished"
    );
    Ok(())
}

/// Queues a new entity with a random GUID and an idle movement component.
fn spawn_wanderer(world: &World) -> EcsResult<EntityId> {
    Ok(world
        .create()
        .with(Guid::random())?
        .with(MapItemMovement::default())?
        .commit())
}

fn spawner(world: &Arc<World>) -> JoinHandle<EcsResult<EntityId>> {
    let world = Arc::clone(world);
    thread::spawn(move || spawn_wanderer(&world))
}
