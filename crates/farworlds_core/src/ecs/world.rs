//! # ECS World
//!
//! The shared container for entities, component stores and the command
//! buffer. A world is internally synchronized: the manager keeps it in an
//! `Arc`, hands `&World` to systems and lets any number of producer threads
//! hold clones.
//!
//! Two mutation paths exist:
//!
//! - **Immediate** (`insert`, `remove`, hierarchy edits): applied under the
//!   relevant locks right away. Meant for setup code and simple attach/detach.
//! - **Deferred** (`create().commit()`, `enqueue_*`): staged in the command
//!   buffer and applied at the start of the next tick.
//!
//! ## Lock Order
//!
//! component table → entity table → component stores (ascending slot).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::commands::{self, CommandBuffer, CommandObserver, EntityRouting, FlushStats, SpawnCommand};
use super::component::{Component, ComponentId, ComponentTypes};
use super::entity::EntityId;
use super::registry::EntityRegistry;
use super::scheduler::TickPhase;
use super::storage::ComponentStore;
use super::tag::Tag;
use crate::config::EcsConfig;
use crate::error::{EcsError, EcsResult};

/// The ECS World - entities, components and pending structural changes.
///
/// # Example
///
/// ```rust,ignore
/// let world = manager.world();
///
/// let entity = world
///     .create()
///     .with(Guid::random())?
///     .with(Position::new(1, 2))?
///     .commit();
///
/// manager.update(0.1);
/// assert!(world.has::<Guid>(entity));
/// ```
pub struct World {
    registry: EntityRegistry,
    components: RwLock<ComponentTypes>,
    commands: CommandBuffer,
    phase: AtomicU8,
}

impl World {
    /// Creates an empty world sized by `config`.
    #[must_use]
    pub fn new(config: &EcsConfig) -> Self {
        Self {
            registry: EntityRegistry::new(config.entity_capacity),
            components: RwLock::new(ComponentTypes::new(config.store_capacity)),
            commands: CommandBuffer::new(),
            phase: AtomicU8::new(TickPhase::Idle as u8),
        }
    }

    // =========================================================================
    // Component types
    // =========================================================================

    /// Registers `C`. Only the manager calls this, before ticking.
    pub(crate) fn register_component<C: Component>(&self) -> EcsResult<ComponentId> {
        self.components.write().register::<C>()
    }

    /// Slot of `C`, if registered.
    #[must_use]
    pub fn component_id<C: Component>(&self) -> Option<ComponentId> {
        self.components.read().id_of::<C>()
    }

    /// Name of the type registered in a slot.
    #[must_use]
    pub fn component_name(&self, id: ComponentId) -> Option<&'static str> {
        self.components.read().name(id)
    }

    /// Number of registered component types.
    #[must_use]
    pub fn component_type_count(&self) -> usize {
        self.components.read().len()
    }

    /// Tag with every registered slot set.
    #[must_use]
    pub fn registered_components(&self) -> Tag {
        self.components.read().registered()
    }

    /// ORs the bits of the given slots.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if a slot is unassigned.
    pub fn tag_for(&self, ids: &[ComponentId]) -> EcsResult<Tag> {
        self.components.read().tag_for(ids)
    }

    /// Single-slot tag for `C`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn tag_of<C: Component>(&self) -> EcsResult<Tag> {
        self.components.read().require::<C>().map(ComponentId::tag)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Starts building a new entity. It becomes live at the next flush after
    /// [`EntityBuilder::commit`].
    #[must_use]
    pub fn create(&self) -> EntityBuilder<'_> {
        EntityBuilder::new(self, self.registry.create())
    }

    /// Starts building `count` entities with contiguous identifiers.
    #[must_use]
    pub fn create_many(&self, count: usize) -> Vec<EntityBuilder<'_>> {
        self.registry
            .create_many(count)
            .into_iter()
            .map(|entity| EntityBuilder::new(self, entity))
            .collect()
    }

    /// Checks whether the entity is live.
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.registry.is_live(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Snapshot of live entities, ascending.
    #[must_use]
    pub fn live_entities(&self) -> Vec<EntityId> {
        self.registry.live_entities()
    }

    /// Snapshot of live entities whose mask matches `query`, ascending.
    #[must_use]
    pub fn query(&self, query: Tag) -> Vec<EntityId> {
        self.registry.query(query)
    }

    /// Component mask of a live entity.
    #[must_use]
    pub fn mask(&self, entity: EntityId) -> Option<Tag> {
        self.registry.mask(entity)
    }

    /// Direct access to the entity registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Makes `child` the last child of `parent`. See [`EntityRegistry::attach_child`].
    ///
    /// # Errors
    ///
    /// Not-found and cycle errors from the registry.
    pub fn attach_child(&self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        self.registry.attach_child(parent, child)
    }

    /// Detaches `child` from `parent`. See [`EntityRegistry::detach_child`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if `parent` is not live.
    pub fn detach_child(&self, parent: EntityId, child: EntityId) -> EcsResult<bool> {
        self.registry.detach_child(parent, child)
    }

    /// Parent of a live entity.
    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.registry.parent(entity)
    }

    /// Children of a live entity.
    #[must_use]
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.registry.children(entity)
    }

    /// Descendants of a live entity, depth-first post-order, root excluded.
    #[must_use]
    pub fn descendants(&self, entity: EntityId) -> Vec<EntityId> {
        self.registry.descendants(entity)
    }

    // =========================================================================
    // Immediate component access
    // =========================================================================

    /// Attaches or overwrites `C` on a live entity right away.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    /// - [`EcsError::EntityNotFound`] if the entity is not live.
    pub fn insert<C: Component>(&self, entity: EntityId, value: C) -> EcsResult<()> {
        let store = self.store_of::<C>()?;
        let live = self.registry.read();
        let record = live.get(&entity).ok_or(EcsError::EntityNotFound(entity))?;
        store.attach(entity, record, value)?;
        Ok(())
    }

    /// Detaches `C` right away, returning the value.
    ///
    /// `None` if the entity is not live, has no `C`, or `C` is unknown.
    pub fn remove<C: Component>(&self, entity: EntityId) -> Option<C> {
        let store = self.store_of::<C>().ok()?;
        let live = self.registry.read();
        let record = live.get(&entity)?;
        store.detach_as::<C>(entity, record)
    }

    /// Clone of the entity's `C`.
    #[must_use]
    pub fn get<C: Component + Clone>(&self, entity: EntityId) -> Option<C> {
        self.store_of::<C>().ok()?.get::<C>(entity)
    }

    /// Runs `f` on the entity's `C` under the store's read lock.
    pub fn with<C: Component, R>(&self, entity: EntityId, f: impl FnOnce(&C) -> R) -> Option<R> {
        self.store_of::<C>().ok()?.with(entity, f)
    }

    /// Runs `f` on the entity's `C` under the store's write lock.
    pub fn with_mut<C: Component, R>(
        &self,
        entity: EntityId,
        f: impl FnOnce(&mut C) -> R,
    ) -> Option<R> {
        self.store_of::<C>().ok()?.with_mut(entity, f)
    }

    /// Bitmask check: does the live entity carry `C`? Takes no store lock.
    #[must_use]
    pub fn has<C: Component>(&self, entity: EntityId) -> bool {
        self.component_id::<C>()
            .is_some_and(|id| self.registry.has(entity, id))
    }

    /// Bitmask check by slot.
    #[must_use]
    pub fn has_id(&self, entity: EntityId, id: ComponentId) -> bool {
        self.registry.has(entity, id)
    }

    /// Slots that hold data for `entity`, read from the stores themselves.
    ///
    /// Read-locks every store in ascending slot order.
    #[must_use]
    pub fn component_types(&self, entity: EntityId) -> Vec<ComponentId> {
        let types = self.components.read();
        let guards: Vec<_> = types.stores().iter().map(|store| (store.id(), store.read())).collect();
        guards
            .iter()
            .filter(|(_, data)| data.contains_key(&entity))
            .map(|(id, _)| *id)
            .collect()
    }

    // =========================================================================
    // Deferred mutation
    // =========================================================================

    /// Queues `C` to be attached at the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn enqueue_add_component<C: Component>(&self, entity: EntityId, value: C) -> EcsResult<()> {
        let id = self.components.read().require::<C>()?;
        self.commands.enqueue_add_component(entity, id, Box::new(value));
        Ok(())
    }

    /// Queues `C` to be detached at the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn enqueue_remove_component<C: Component>(&self, entity: EntityId) -> EcsResult<()> {
        let id = self.components.read().require::<C>()?;
        self.commands.enqueue_remove_component(entity, id);
        Ok(())
    }

    /// Queues the entity and its subtree for removal at the next flush.
    pub fn enqueue_remove_entity(&self, entity: EntityId) {
        self.commands.enqueue_remove_entity(entity);
    }

    /// The raw command buffer.
    #[must_use]
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    /// Number of queued structural operations.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Current phase of the tick driving this world.
    #[must_use]
    pub fn phase(&self) -> TickPhase {
        TickPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    // =========================================================================
    // Manager hooks
    // =========================================================================

    pub(crate) fn set_phase(&self, phase: TickPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Applies every queued operation. Tick thread only.
    pub(crate) fn flush(
        &self,
        observer: &dyn CommandObserver,
        routing: &mut dyn EntityRouting,
    ) -> FlushStats {
        let types = self.components.read();
        self.commands.flush(&self.registry, &types, observer, routing)
    }

    /// Makes a built entity live right away.
    pub(crate) fn spawn_now(
        &self,
        spawn: SpawnCommand,
        observer: &dyn CommandObserver,
        routing: &mut dyn EntityRouting,
    ) -> FlushStats {
        let types = self.components.read();
        let mut stats = FlushStats::default();
        commands::apply_entity_additions(vec![spawn], &self.registry, &types, observer, routing, &mut stats);
        stats
    }

    /// Destroys an entity and its subtree right away.
    pub(crate) fn despawn_now(
        &self,
        entity: EntityId,
        notified: &[EntityId],
        observer: &dyn CommandObserver,
        routing: &mut dyn EntityRouting,
    ) -> FlushStats {
        let types = self.components.read();
        let mut stats = FlushStats::default();
        commands::despawn(entity, notified, &self.registry, &types, observer, routing, &mut stats);
        stats
    }

    fn store_of<C: Component>(&self) -> EcsResult<Arc<ComponentStore>> {
        let types = self.components.read();
        let id = types.require::<C>()?;
        types
            .store(id)
            .cloned()
            .ok_or(EcsError::ComponentNotRegistered(C::name()))
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("live", &self.registry.len())
            .field("component_types", &*self.components.read())
            .field("pending_commands", &self.commands.len())
            .field("phase", &self.phase())
            .finish()
    }
}

/// A not-yet-live entity collecting its initial components.
///
/// Dropping a builder without committing it discards the entity; its
/// identifier is never reused.
#[must_use = "an entity only becomes live once committed"]
pub struct EntityBuilder<'w> {
    world: &'w World,
    spawn: SpawnCommand,
}

impl<'w> EntityBuilder<'w> {
    fn new(world: &'w World, entity: EntityId) -> Self {
        Self {
            world,
            spawn: SpawnCommand::new(entity),
        }
    }

    /// The identifier the entity will have once live.
    #[inline]
    pub const fn id(&self) -> EntityId {
        self.spawn.entity
    }

    /// Adds a component. A later value of the same type replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn with<C: Component>(mut self, value: C) -> EcsResult<Self> {
        let id = self.world.components.read().require::<C>()?;
        self.spawn.set(id, Box::new(value));
        Ok(self)
    }

    /// Attaches the entity under `parent` when it becomes live.
    pub fn child_of(mut self, parent: EntityId) -> Self {
        self.spawn.parent = Some(parent);
        self
    }

    /// Queues the entity to become live at the next flush.
    pub fn commit(self) -> EntityId {
        let entity = self.spawn.entity;
        self.world.commands.enqueue_add_entity(self.spawn);
        entity
    }

    /// Converts the builder into a spawn command without queueing it.
    pub(crate) fn into_command(self) -> SpawnCommand {
        self.spawn
    }
}

impl std::fmt::Debug for EntityBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityBuilder")
            .field("spawn", &self.spawn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::commands::NullObserver;

    #[derive(Clone, Debug, PartialEq)]
    struct Guid(String);
    impl Component for Guid {}

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }
    impl Component for Position {}

    #[derive(Clone, Debug, PartialEq)]
    struct Unregistered;
    impl Component for Unregistered {}

    fn world() -> World {
        let world = World::new(&EcsConfig::default());
        world.register_component::<Guid>().unwrap();
        world.register_component::<Position>().unwrap();
        world
    }

    fn flush(world: &World) -> FlushStats {
        world.flush(&NullObserver, &mut ())
    }

    #[test]
    fn test_builder_commit_and_flush() {
        let world = world();
        let e = world
            .create()
            .with(Guid("a".into()))
            .unwrap()
            .with(Position { x: 1, y: 2 })
            .unwrap()
            .commit();

        assert!(!world.is_live(e));
        assert!(!world.has::<Guid>(e));

        flush(&world);
        assert!(world.is_live(e));
        assert!(world.has::<Guid>(e));
        assert_eq!(world.get::<Position>(e), Some(Position { x: 1, y: 2 }));
        assert_eq!(world.component_types(e).len(), 2);
    }

    #[test]
    fn test_builder_rejects_unregistered() {
        let world = world();
        let err = world.create().with(Unregistered).unwrap_err();
        assert!(err.is_configuration());
        assert!(world.enqueue_add_component(EntityId::from_raw(1), Unregistered).is_err());
    }

    #[test]
    fn test_immediate_insert_and_remove_keep_mask_in_sync() {
        let world = world();
        let e = world.create().commit();
        flush(&world);

        world.insert(e, Position { x: 3, y: 4 }).unwrap();
        assert!(world.has::<Position>(e));
        assert_eq!(world.get::<Position>(e), Some(Position { x: 3, y: 4 }));

        assert_eq!(world.remove::<Position>(e), Some(Position { x: 3, y: 4 }));
        assert!(!world.has::<Position>(e));
        assert_eq!(world.get::<Position>(e), None);
        assert_eq!(world.remove::<Position>(e), None);
    }

    #[test]
    fn test_insert_on_missing_entity() {
        let world = world();
        let pending = world.create().commit();
        assert_eq!(
            world.insert(pending, Guid("x".into())),
            Err(EcsError::EntityNotFound(pending))
        );
        assert_eq!(world.get::<Guid>(pending), None);
    }

    #[test]
    fn test_with_mut_updates_in_place() {
        let world = world();
        let e = world.create().with(Position { x: 0, y: 0 }).unwrap().commit();
        flush(&world);

        world.with_mut(e, |p: &mut Position| p.y = 9);
        assert_eq!(world.with(e, |p: &Position| p.y), Some(9));
    }

    #[test]
    fn test_child_of_same_flush() {
        let world = world();
        let parent = world.create().commit();
        let child = world.create().child_of(parent).commit();
        flush(&world);

        assert_eq!(world.children(parent), vec![child]);
        assert_eq!(world.parent(child), Some(parent));
    }

    #[test]
    fn test_query_by_tag() {
        let world = world();
        let guid_only = world.create().with(Guid("g".into())).unwrap().commit();
        let both = world
            .create()
            .with(Guid("h".into()))
            .unwrap()
            .with(Position { x: 0, y: 0 })
            .unwrap()
            .commit();
        flush(&world);

        let pos = world.tag_of::<Position>().unwrap();
        assert_eq!(world.query(pos), vec![both]);
        assert_eq!(world.query(pos.inverted()), vec![guid_only]);
    }

    #[test]
    fn test_builder_with_same_type_replaces() {
        let world = world();
        let e = world
            .create()
            .with(Position { x: 1, y: 1 })
            .unwrap()
            .with(Guid("g".into()))
            .unwrap()
            .with(Position { x: 2, y: 2 })
            .unwrap()
            .commit();
        world.enqueue_add_component(e, Guid("h".into())).unwrap();

        let stats = flush(&world);
        assert_eq!(stats.components_added, 2);
        assert_eq!(stats.entities_added, 1);
        assert_eq!(world.get::<Position>(e), Some(Position { x: 2, y: 2 }));
        assert_eq!(world.get::<Guid>(e), Some(Guid("h".into())));
    }

    #[test]
    fn test_create_many_contiguous() {
        let world = world();
        let builders = world.create_many(3);
        let ids: Vec<EntityId> = builders.into_iter().map(EntityBuilder::commit).collect();
        assert_eq!(ids[1].raw(), ids[0].raw() + 1);
        assert_eq!(ids[2].raw(), ids[0].raw() + 2);

        let stats = flush(&world);
        assert_eq!(stats.entities_added, 3);
        assert_eq!(world.live_entities(), ids);
    }

    #[test]
    fn test_despawn_now_cascades() {
        let world = world();
        let root = world.create().with(Guid("r".into())).unwrap().commit();
        let child = world.create().child_of(root).with(Position { x: 1, y: 1 }).unwrap().commit();
        flush(&world);

        let stats = world.despawn_now(root, &[], &NullObserver, &mut ());
        assert_eq!(stats.entities_removed, 2);
        assert!(!world.is_live(child));
        assert_eq!(world.get::<Position>(child), None);
        assert!(world.component_types(child).is_empty());
    }
}
