//! Integration tests for the tick lifecycle: flush ordering, cascading
//! destruction, system ordering and fault isolation.

use std::sync::{Arc, Mutex};

use farworlds_core::{
    Component, EcsConfig, EcsError, EcsResult, EntityId, FnSystem, Manager, System, World,
};

#[derive(Clone, Debug, PartialEq)]
struct Guid(String);
impl Component for Guid {}

#[derive(Clone, Debug, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}
impl Component for Position {}

fn manager() -> Manager {
    let mut manager = Manager::new(EcsConfig::default()).unwrap();
    manager.register_component::<Guid>().unwrap();
    manager.register_component::<Position>().unwrap();
    manager
}

/// Bitmask and store agree for every registered type on every live entity.
fn assert_consistent(world: &World, entity: EntityId) {
    assert_eq!(world.has::<Guid>(entity), world.get::<Guid>(entity).is_some());
    assert_eq!(
        world.has::<Position>(entity),
        world.get::<Position>(entity).is_some()
    );
}

#[test]
fn test_guid_position_scenario() {
    let mut manager = manager();
    let world = manager.world();

    let e1 = world
        .create()
        .with(Guid("e1".into()))
        .unwrap()
        .with(Position { x: 1, y: 2 })
        .unwrap()
        .commit();
    manager.update(0.1);
    assert!(world.has::<Guid>(e1));
    assert_consistent(&world, e1);

    world.enqueue_remove_component::<Guid>(e1).unwrap();
    manager.update(0.1);
    assert!(!world.has::<Guid>(e1));
    assert!(world.has::<Position>(e1));
    assert_consistent(&world, e1);

    assert!(manager.destroy(e1));
    manager.update(0.1);
    assert!(!world.live_entities().contains(&e1));
    assert!(!world.has::<Position>(e1));
    assert_consistent(&world, e1);
}

#[test]
fn test_readd_in_same_tick_wins() {
    let mut manager = manager();
    let world = manager.world();
    let e = world.create().with(Position { x: 0, y: 0 }).unwrap().commit();
    manager.update(0.1);

    world.enqueue_remove_component::<Position>(e).unwrap();
    world.enqueue_add_component(e, Position { x: 5, y: 6 }).unwrap();
    manager.update(0.1);

    assert_eq!(world.get::<Position>(e), Some(Position { x: 5, y: 6 }));
    assert_consistent(&world, e);
}

#[test]
fn test_stale_removal_does_not_resurrect() {
    let mut manager = manager();
    let world = manager.world();
    let e = world.create().with(Guid("g".into())).unwrap().commit();
    manager.update(0.1);

    world.enqueue_remove_entity(e);
    world.enqueue_remove_component::<Guid>(e).unwrap();
    let stats = manager.update(0.1);

    assert!(!world.is_live(e));
    assert_eq!(world.get::<Guid>(e), None);
    assert_eq!(stats.last_flush.entities_removed, 1);
}

#[test]
fn test_cascade_destroys_descendants() {
    let mut manager = manager();
    let world = manager.world();

    let root = world.create().with(Guid("root".into())).unwrap().commit();
    let child = world
        .create()
        .child_of(root)
        .with(Position { x: 1, y: 1 })
        .unwrap()
        .commit();
    let grandchild = world
        .create()
        .child_of(child)
        .with(Guid("leaf".into()))
        .unwrap()
        .with(Position { x: 2, y: 2 })
        .unwrap()
        .commit();
    let bystander = world.create().with(Guid("other".into())).unwrap().commit();
    manager.update(0.1);

    assert_eq!(world.descendants(root), vec![grandchild, child]);

    world.enqueue_remove_entity(root);
    let stats = manager.update(0.1);

    assert_eq!(stats.last_flush.entities_removed, 3);
    assert_eq!(stats.last_flush.components_removed, 4);
    for gone in [root, child, grandchild] {
        assert!(!world.is_live(gone));
        assert!(world.component_types(gone).is_empty());
        assert_consistent(&world, gone);
    }
    assert_eq!(world.live_entities(), vec![bystander]);
}

#[test]
fn test_systems_run_by_priority_then_registration() {
    let mut manager = manager();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, priority) in [("b0", 0), ("a500", 500), ("c0", 0), ("d_neg", -1), ("e500", 500)] {
        let sink = Arc::clone(&order);
        manager
            .register_system(
                FnSystem::new(name, move |_: &World, _| {
                    sink.lock().unwrap().push(name);
                    Ok(())
                })
                .with_priority(priority),
            )
            .unwrap();
    }

    for _ in 0..3 {
        order.lock().unwrap().clear();
        manager.update(0.1);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["a500", "e500", "b0", "c0", "d_neg"]
        );
    }
}

#[test]
fn test_failing_systems_do_not_stop_the_tick() {
    let mut manager = manager();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&ran);
    manager
        .register_system(
            FnSystem::new("panics", move |_: &World, _| -> EcsResult<()> {
                sink.lock().unwrap().push("panics");
                panic!("boom");
            })
            .with_priority(3),
        )
        .unwrap();
    let sink = Arc::clone(&ran);
    manager
        .register_system(
            FnSystem::new("errors", move |_: &World, _| {
                sink.lock().unwrap().push("errors");
                Err(EcsError::system("errors", "nothing to do"))
            })
            .with_priority(2),
        )
        .unwrap();
    let sink = Arc::clone(&ran);
    manager
        .register_system(FnSystem::new("healthy", move |_: &World, _| {
            sink.lock().unwrap().push("healthy");
            Ok(())
        }))
        .unwrap();

    let stats = manager.update(0.1);
    assert_eq!(*ran.lock().unwrap(), vec!["panics", "errors", "healthy"]);
    assert_eq!(stats.last_run.failed, 2);
    assert_eq!(stats.last_run.succeeded, 1);
    assert_eq!(stats.system_failures, 2);

    let stats = manager.update(0.1);
    assert_eq!(stats.system_failures, 4);
    assert_eq!(stats.ticks, 2);
}

#[test]
fn test_enqueue_during_update_waits_for_next_tick() {
    let mut manager = manager();
    let world = manager.world();
    let spawned = Arc::new(Mutex::new(Vec::new()));
    let seen_live = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&spawned);
    manager
        .register_system(
            FnSystem::new("spawner", move |world: &World, _| {
                let e = world.create().with(Guid("late".into()))?.commit();
                sink.lock().unwrap().push(e);
                Ok(())
            })
            .with_priority(10),
        )
        .unwrap();
    let probe = Arc::clone(&spawned);
    let seen = Arc::clone(&seen_live);
    manager
        .register_system(FnSystem::new("observer", move |world: &World, _| {
            let last = probe.lock().unwrap().last().copied();
            if let Some(e) = last {
                seen.lock().unwrap().push(world.is_live(e));
            }
            Ok(())
        }))
        .unwrap();

    manager.update(0.1);
    assert_eq!(*seen_live.lock().unwrap(), vec![false]);
    let first = spawned.lock().unwrap()[0];
    assert!(!world.is_live(first));

    manager.update(0.1);
    assert!(world.is_live(first));
    assert!(world.has::<Guid>(first));
}

struct Cache {
    entities: Arc<Mutex<Vec<EntityId>>>,
}

impl System for Cache {
    fn update(&mut self, world: &World, _dt: f32) -> EcsResult<()> {
        for entity in self.entities.lock().unwrap().iter() {
            if !world.is_live(*entity) {
                return Err(EcsError::EntityNotFound(*entity));
            }
        }
        Ok(())
    }

    fn add(&mut self, entity: EntityId) {
        self.entities.lock().unwrap().push(entity);
    }

    fn remove(&mut self, entity: EntityId) {
        self.entities.lock().unwrap().retain(|e| *e != entity);
    }
}

#[test]
fn test_routed_system_never_sees_dead_entities() {
    let mut manager = manager();
    let world = manager.world();
    let entities = Arc::new(Mutex::new(Vec::new()));
    let filter = farworlds_core::SystemFilter::new(world.tag_of::<Position>().unwrap());
    manager
        .register_system_filtered(
            Cache {
                entities: Arc::clone(&entities),
            },
            filter,
        )
        .unwrap();

    let a = world.create().with(Position { x: 0, y: 0 }).unwrap().commit();
    let b = world.create().with(Position { x: 1, y: 0 }).unwrap().commit();
    manager.update(0.1);
    assert_eq!(*entities.lock().unwrap(), vec![a, b]);

    world.enqueue_remove_entity(a);
    let stats = manager.update(0.1);
    assert_eq!(stats.last_run.failed, 0);
    assert_eq!(*entities.lock().unwrap(), vec![b]);
}
