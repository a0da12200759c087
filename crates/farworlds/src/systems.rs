//! # Map Systems
//!
//! - [`MovementSystem`] advances in-progress tile steps every tick.
//! - [`GuidIndex`] keeps a GUID → entity lookup for entities spawned with a
//!   [`Guid`].

use std::collections::HashMap;
use std::sync::Arc;

use farworlds_core::{EcsResult, EntityId, Manager, System, SystemFilter, Tag, World};
use parking_lot::RwLock;

use crate::components::{Guid, MapItem, MapItemMovement};

/// Tile steps completed per second.
pub const STEPS_PER_SECOND: f32 = 2.0;

/// Moves map items one tile at a time.
///
/// Works on every live entity with both [`MapItem`] and [`MapItemMovement`],
/// queried each tick, so components attached after spawn are picked up too.
#[derive(Debug)]
pub struct MovementSystem {
    moving: Tag,
    steps_per_second: f32,
}

impl MovementSystem {
    /// Creates a movement system with the given speed.
    #[must_use]
    pub const fn new(steps_per_second: f32) -> Self {
        Self {
            moving: Tag::EMPTY,
            steps_per_second,
        }
    }
}

impl Default for MovementSystem {
    fn default() -> Self {
        Self::new(STEPS_PER_SECOND)
    }
}

impl System for MovementSystem {
    fn name(&self) -> &str {
        "movement"
    }

    fn priority(&self) -> i32 {
        500
    }

    fn init(&mut self, world: &Arc<World>) -> EcsResult<()> {
        let item = world.tag_of::<MapItem>()?;
        let movement = world.tag_of::<MapItemMovement>()?;
        self.moving = Tag::from_bits(item.bits() | movement.bits());
        Ok(())
    }

    fn update(&mut self, world: &World, dt: f32) -> EcsResult<()> {
        let advance = dt * self.steps_per_second;
        let mut moved = 0_u32;

        for entity in world.query(self.moving) {
            let finished = world
                .with_mut(entity, |step: &mut MapItemMovement| {
                    if !step.is_moving() {
                        return None;
                    }
                    step.progress += advance;
                    if step.progress < 1.0 {
                        return None;
                    }
                    let done = *step;
                    *step = MapItemMovement::default();
                    Some(done)
                })
                .flatten();

            let Some(step) = finished else {
                continue;
            };
            world.with_mut(entity, |item: &mut MapItem| {
                item.tile_x = item.tile_x.wrapping_add_signed(step.move_x);
                item.tile_y = item.tile_y.wrapping_add_signed(step.move_y);
                item.tile_z = item.tile_z.wrapping_add_signed(step.move_z);
            });
            moved += 1;
        }

        if moved > 0 {
            tracing::trace!(moved, "map items stepped");
        }
        Ok(())
    }

    fn remove(&mut self, _entity: EntityId) {}
}

/// Read handle to a [`GuidIndex`].
#[derive(Clone, Debug, Default)]
pub struct GuidLookup(Arc<RwLock<HashMap<String, EntityId>>>);

impl GuidLookup {
    /// Entity carrying `guid`, if it is indexed.
    #[must_use]
    pub fn get(&self, guid: &str) -> Option<EntityId> {
        self.0.read().get(guid).copied()
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

/// Indexes entities by their [`Guid`] as they are spawned.
///
/// Register it with a filter on [`Guid`]; entities are dropped from the index
/// when destroyed.
#[derive(Debug, Default)]
pub struct GuidIndex {
    world: Option<Arc<World>>,
    lookup: GuidLookup,
    by_entity: HashMap<EntityId, String>,
}

impl GuidIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that stays valid after the index is handed to the manager.
    #[must_use]
    pub fn lookup(&self) -> GuidLookup {
        self.lookup.clone()
    }
}

impl System for GuidIndex {
    fn name(&self) -> &str {
        "guid_index"
    }

    fn priority(&self) -> i32 {
        1000
    }

    fn init(&mut self, world: &Arc<World>) -> EcsResult<()> {
        self.world = Some(Arc::clone(world));
        Ok(())
    }

    fn update(&mut self, _world: &World, _dt: f32) -> EcsResult<()> {
        Ok(())
    }

    fn add(&mut self, entity: EntityId) {
        let Some(guid) = self.world.as_ref().and_then(|w| w.get::<Guid>(entity)) else {
            return;
        };
        let guid = guid.as_str().to_owned();
        self.lookup.0.write().insert(guid.clone(), entity);
        self.by_entity.insert(entity, guid);
    }

    fn remove(&mut self, entity: EntityId) {
        if let Some(guid) = self.by_entity.remove(&entity) {
            self.lookup.0.write().remove(&guid);
        }
    }
}

/// Registers the map systems and returns the GUID lookup handle.
///
/// # Errors
///
/// Fails if the map components were not registered first.
pub fn register_systems(manager: &mut Manager) -> EcsResult<GuidLookup> {
    let index = GuidIndex::new();
    let lookup = index.lookup();
    let guid = manager.world().tag_of::<Guid>()?;

    manager.register_system(MovementSystem::default())?;
    manager.register_system_filtered(index, SystemFilter::new(guid))?;
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_components;
    use farworlds_core::EcsConfig;

    fn manager() -> (Manager, GuidLookup) {
        let mut manager = Manager::new(EcsConfig::default()).unwrap();
        register_components(&mut manager).unwrap();
        let lookup = register_systems(&mut manager).unwrap();
        (manager, lookup)
    }

    #[test]
    fn test_system_order() {
        let (manager, _) = manager();
        assert_eq!(manager.systems(), vec!["guid_index", "movement"]);
    }

    #[test]
    fn test_movement_completes_a_step() {
        let (mut manager, _) = manager();
        let world = manager.world();
        let e = world
            .create()
            .with(MapItem::default())
            .unwrap()
            .with(MapItemMovement::towards(1, 0, -1))
            .unwrap()
            .commit();

        // Flush, then 0.25 + 0.25 of a step at two steps per second.
        manager.update(0.25);
        assert_eq!(world.get::<MapItem>(e).unwrap().tile_x, 0);
        manager.update(0.25);

        let item = world.get::<MapItem>(e).unwrap();
        assert_eq!((item.tile_x, item.tile_y, item.tile_z), (1, 0, 255));
        assert!(!world.get::<MapItemMovement>(e).unwrap().is_moving());
    }

    #[test]
    fn test_movement_picks_up_late_components() {
        let (mut manager, _) = manager();
        let world = manager.world();
        let e = world.create().with(MapItemMovement::towards(0, 1, 0)).unwrap().commit();
        manager.update(0.0);

        world.enqueue_add_component(e, MapItem::default()).unwrap();
        manager.update(0.5);
        assert_eq!(world.get::<MapItem>(e).unwrap().tile_y, 1);
    }

    #[test]
    fn test_guid_index_follows_lifecycle() {
        let (mut manager, lookup) = manager();
        let world = manager.world();
        let guid = Guid::new("b8f0c2d2-0000-4000-8000-000000000001");
        let e = world.create().with(guid.clone()).unwrap().commit();
        let _anonymous = world.create().with(MapItem::default()).unwrap().commit();
        manager.update(0.1);

        assert_eq!(lookup.get(guid.as_str()), Some(e));
        assert_eq!(lookup.len(), 1);

        assert!(manager.destroy(e));
        assert!(lookup.is_empty());
        manager.update(0.1);
        assert!(!world.is_live(e));
    }
}
