//! # Command Buffer
//!
//! Structural changes requested while the world is being simulated are
//! staged here and applied once per tick, before any system runs.
//!
//! ## Architecture
//!
//! ```text
//!   Producer 1 ──┐       ┌─> [remove-component queue] ─┐
//!   Producer 2 ──┼───────┼─> [remove-entity queue]    ─┤
//!   System  N  ──┘       ├─> [add-component queue]    ─┼──> flush (tick thread)
//!                        └─> [add-entity queue]       ─┘
//! ```
//!
//! Every operation kind has its own unbounded MPSC queue, so producers never
//! block each other and never take a lock that systems use.
//!
//! ## Flush Order
//!
//! 1. component removals
//! 2. entity removals (every component, every descendant)
//! 3. component additions
//! 4. entity additions
//!
//! Additions run last, so "removed then re-added in the same tick" always
//! ends with the data present. Only operations that were queued when the
//! flush started are applied; anything queued during the flush waits for the
//! next one. Queue lengths are sampled additions first, so a flush that picks
//! up an operation also picks up everything queued before it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::{Receiver, Sender};

use super::component::{ComponentId, ComponentTypes};
use super::entity::EntityId;
use super::registry::{self, EntityRegistry};
use super::storage::BoxedComponent;
use super::tag::Tag;

/// Request to make an entity live.
pub struct SpawnCommand {
    /// The pre-allocated identifier.
    pub entity: EntityId,
    /// Parent to attach to once live.
    pub parent: Option<EntityId>,
    /// Components to attach before the entity becomes visible.
    pub components: Vec<(ComponentId, BoxedComponent)>,
}

impl SpawnCommand {
    /// An entity with no components and no parent.
    #[must_use]
    pub const fn new(entity: EntityId) -> Self {
        Self {
            entity,
            parent: None,
            components: Vec::new(),
        }
    }

    /// Adds a component, replacing an earlier value in the same slot.
    pub fn set(&mut self, id: ComponentId, value: BoxedComponent) {
        match self.components.iter_mut().find(|(slot, _)| *slot == id) {
            Some(entry) => entry.1 = value,
            None => self.components.push((id, value)),
        }
    }
}

impl std::fmt::Debug for SpawnCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnCommand")
            .field("entity", &self.entity)
            .field("parent", &self.parent)
            .field("components", &self.components.len())
            .finish()
    }
}

/// Request to destroy an entity and its subtree.
#[derive(Debug)]
struct DespawnCommand {
    entity: EntityId,
    /// Entities whose systems were already told about the removal.
    notified: Vec<EntityId>,
}

/// Request to attach (or overwrite) one component.
struct InsertCommand {
    entity: EntityId,
    id: ComponentId,
    value: BoxedComponent,
}

/// Request to detach one component.
#[derive(Debug)]
struct RemoveCommand {
    entity: EntityId,
    id: ComponentId,
}

/// Receives one callback per applied operation.
///
/// Implementations must be cheap; they run on the tick thread. A panicking
/// observer is logged and skipped, it never aborts the flush.
pub trait CommandObserver: Send + Sync {
    /// An entity became live.
    fn entity_added(&self, _entity: EntityId) {}
    /// An entity left the live table.
    fn entity_removed(&self, _entity: EntityId) {}
    /// A component was attached to a live entity.
    fn component_added(&self, _entity: EntityId, _component: ComponentId, _name: &'static str) {}
    /// A component was detached.
    fn component_removed(&self, _entity: EntityId, _component: ComponentId, _name: &'static str) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl CommandObserver for NullObserver {}

/// Observer that reports every operation as a `tracing` debug event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CommandObserver for TracingObserver {
    fn entity_added(&self, entity: EntityId) {
        tracing::debug!(entity = entity.raw(), "entity added");
    }

    fn entity_removed(&self, entity: EntityId) {
        tracing::debug!(entity = entity.raw(), "entity removed");
    }

    fn component_added(&self, entity: EntityId, component: ComponentId, name: &'static str) {
        tracing::debug!(entity = entity.raw(), component = component.index(), component_name = name, "component added");
    }

    fn component_removed(&self, entity: EntityId, component: ComponentId, name: &'static str) {
        tracing::debug!(entity = entity.raw(), component = component.index(), component_name = name, "component removed");
    }
}

/// Structural notifications the flush hands to whoever routes entities to
/// systems.
pub trait EntityRouting {
    /// Called before `entity`'s storage is reclaimed.
    fn entity_removing(&mut self, entity: EntityId);
    /// Called after `entity` became live with the given mask.
    fn entity_added(&mut self, entity: EntityId, mask: Tag);
}

impl EntityRouting for () {
    fn entity_removing(&mut self, _entity: EntityId) {}
    fn entity_added(&mut self, _entity: EntityId, _mask: Tag) {}
}

/// Counters for one flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Components detached (explicitly or by entity removal).
    pub components_removed: u32,
    /// Entities removed, descendants included.
    pub entities_removed: u32,
    /// Components attached.
    pub components_added: u32,
    /// Entities made live.
    pub entities_added: u32,
    /// Operations that targeted something absent and were dropped.
    pub dropped: u32,
}

impl FlushStats {
    /// Total number of applied operations.
    #[must_use]
    pub const fn applied(&self) -> u32 {
        self.components_removed + self.entities_removed + self.components_added + self.entities_added
    }

    /// Returns `true` if nothing was applied or dropped.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.applied() == 0 && self.dropped == 0
    }
}

/// One unbounded multi-producer queue.
struct Queue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    fn push(&self, item: T) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        if self.sender.send(item).is_err() {
            tracing::warn!("command queue disconnected; operation dropped");
        }
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Takes at most `count` items, oldest first.
    fn drain(&self, count: usize) -> Vec<T> {
        self.receiver.try_iter().take(count).collect()
    }
}

/// Deferred structural mutations, one queue per operation kind.
pub struct CommandBuffer {
    remove_components: Queue<RemoveCommand>,
    remove_entities: Queue<DespawnCommand>,
    add_components: Queue<InsertCommand>,
    add_entities: Queue<SpawnCommand>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remove_components: Queue::new(),
            remove_entities: Queue::new(),
            add_components: Queue::new(),
            add_entities: Queue::new(),
        }
    }

    /// Queues an entity to become live, with its initial components.
    pub fn enqueue_add_entity(&self, spawn: SpawnCommand) {
        self.add_entities.push(spawn);
    }

    /// Queues an entity (and its subtree) for removal.
    pub fn enqueue_remove_entity(&self, entity: EntityId) {
        self.remove_entities.push(DespawnCommand {
            entity,
            notified: Vec::new(),
        });
    }

    /// Queues a removal whose systems were already notified for `notified`.
    pub(crate) fn enqueue_remove_entity_notified(&self, entity: EntityId, notified: Vec<EntityId>) {
        self.remove_entities.push(DespawnCommand { entity, notified });
    }

    /// Queues a component attach. The value's type must match the slot.
    pub fn enqueue_add_component(&self, entity: EntityId, id: ComponentId, value: BoxedComponent) {
        self.add_components.push(InsertCommand { entity, id, value });
    }

    /// Queues a component detach.
    pub fn enqueue_remove_component(&self, entity: EntityId, id: ComponentId) {
        self.remove_components.push(RemoveCommand { entity, id });
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.remove_components.len()
            + self.remove_entities.len()
            + self.add_components.len()
            + self.add_entities.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies every operation queued before this call, in flush order.
    ///
    /// Must only be called from the tick thread, never concurrently with itself.
    pub fn flush(
        &self,
        registry: &EntityRegistry,
        types: &ComponentTypes,
        observer: &dyn CommandObserver,
        routing: &mut dyn EntityRouting,
    ) -> FlushStats {
        // Snapshot the queue lengths first: later arrivals wait for the next tick.
        // Reverse apply order, so everything queued before an included
        // operation is included as well.
        let inserts = self.add_components.len();
        let spawns = self.add_entities.len();
        let despawns = self.remove_entities.len();
        let removals = self.remove_components.len();

        let removals = self.remove_components.drain(removals);
        let despawns = self.remove_entities.drain(despawns);
        let inserts = self.add_components.drain(inserts);
        let spawns = self.add_entities.drain(spawns);

        let mut stats = FlushStats::default();
        apply_component_removals(removals, registry, types, observer, &mut stats);
        apply_entity_removals(despawns, registry, types, observer, routing, &mut stats);
        let spawns = apply_component_additions(inserts, spawns, registry, types, observer, &mut stats);
        apply_entity_additions(spawns, registry, types, observer, routing, &mut stats);

        if !stats.is_empty() {
            tracing::trace!(?stats, "command buffer flushed");
        }
        stats
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("remove_components", &self.remove_components.len())
            .field("remove_entities", &self.remove_entities.len())
            .field("add_components", &self.add_components.len())
            .field("add_entities", &self.add_entities.len())
            .finish()
    }
}

/// Runs an observer callback, containing panics.
fn report(callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::warn!("command observer panicked; flush continues");
    }
}

fn apply_component_removals(
    removals: Vec<RemoveCommand>,
    registry: &EntityRegistry,
    types: &ComponentTypes,
    observer: &dyn CommandObserver,
    stats: &mut FlushStats,
) {
    for RemoveCommand { entity, id } in removals {
        let Some(store) = types.store(id) else {
            tracing::debug!(entity = entity.raw(), component = id.index(), "remove for unassigned component slot");
            stats.dropped += 1;
            continue;
        };

        let removed = {
            let live = registry.read();
            let Some(record) = live.get(&entity) else {
                tracing::debug!(entity = entity.raw(), "component remove for missing entity");
                stats.dropped += 1;
                continue;
            };
            store.detach(entity, record).is_some()
        };

        if removed {
            stats.components_removed += 1;
            report(|| observer.component_removed(entity, id, store.type_name()));
        } else {
            stats.dropped += 1;
        }
    }
}

fn apply_entity_removals(
    despawns: Vec<DespawnCommand>,
    registry: &EntityRegistry,
    types: &ComponentTypes,
    observer: &dyn CommandObserver,
    routing: &mut dyn EntityRouting,
    stats: &mut FlushStats,
) {
    for DespawnCommand { entity, notified } in despawns {
        despawn(entity, &notified, registry, types, observer, routing, stats);
    }
}

/// Removes `entity`, every descendant and all of their components.
///
/// Routing is told first for every doomed entity not listed in `notified`.
pub(crate) fn despawn(
    entity: EntityId,
    notified: &[EntityId],
    registry: &EntityRegistry,
    types: &ComponentTypes,
    observer: &dyn CommandObserver,
    routing: &mut dyn EntityRouting,
    stats: &mut FlushStats,
) {
    let doomed = registry::subtree(&registry.read(), entity);
    if doomed.is_empty() {
        tracing::debug!(entity = entity.raw(), "remove for missing entity");
        stats.dropped += 1;
        return;
    }

    // Systems drop their references before any storage goes away.
    for doomed_entity in doomed.iter().filter(|e| !notified.contains(*e)) {
        routing.entity_removing(*doomed_entity);
    }

    let mut detached = Vec::new();
    let doomed = {
        let mut live = registry.write();
        let doomed = registry::subtree(&live, entity);
        for store in types.stores() {
            for removed in store.remove_all(&doomed) {
                detached.push((removed, store.id(), store.type_name()));
            }
        }
        registry::remove_subtree(&mut live, entity, &doomed);
        doomed
    };

    for (removed, id, name) in detached {
        stats.components_removed += 1;
        report(|| observer.component_removed(removed, id, name));
    }
    for removed in doomed {
        stats.entities_removed += 1;
        report(|| observer.entity_removed(removed));
    }
}

/// Applies component additions to live entities and folds additions aimed at
/// entities spawned in this flush into their spawn commands.
fn apply_component_additions(
    inserts: Vec<InsertCommand>,
    mut spawns: Vec<SpawnCommand>,
    registry: &EntityRegistry,
    types: &ComponentTypes,
    observer: &dyn CommandObserver,
    stats: &mut FlushStats,
) -> Vec<SpawnCommand> {
    let pending: HashMap<EntityId, usize> = spawns
        .iter()
        .enumerate()
        .map(|(index, spawn)| (spawn.entity, index))
        .collect();

    for InsertCommand { entity, id, value } in inserts {
        if let Some(index) = pending.get(&entity) {
            spawns[*index].set(id, value);
            continue;
        }

        let Some(store) = types.store(id) else {
            tracing::debug!(entity = entity.raw(), component = id.index(), "add for unassigned component slot");
            stats.dropped += 1;
            continue;
        };

        let inserted = {
            let live = registry.read();
            let Some(record) = live.get(&entity) else {
                tracing::debug!(entity = entity.raw(), "component add for missing entity");
                stats.dropped += 1;
                continue;
            };
            match store.attach_boxed(entity, record, value) {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!(entity = entity.raw(), %err, "component add rejected");
                    false
                }
            }
        };

        if inserted {
            stats.components_added += 1;
            report(|| observer.component_added(entity, id, store.type_name()));
        } else {
            stats.dropped += 1;
        }
    }

    spawns
}

/// Makes spawned entities live, attaches their components and links parents.
pub(crate) fn apply_entity_additions(
    spawns: Vec<SpawnCommand>,
    registry: &EntityRegistry,
    types: &ComponentTypes,
    observer: &dyn CommandObserver,
    routing: &mut dyn EntityRouting,
    stats: &mut FlushStats,
) {
    if spawns.is_empty() {
        return;
    }

    let mut added = Vec::with_capacity(spawns.len());
    let mut attached = Vec::new();
    let mut parents = Vec::new();
    {
        let mut live = registry.write();
        for SpawnCommand { entity, parent, components } in spawns {
            let fresh = registry::commit(&mut live, entity);
            let Some(record) = live.get(&entity) else {
                continue;
            };
            for (id, value) in components {
                let Some(store) = types.store(id) else {
                    stats.dropped += 1;
                    continue;
                };
                match store.attach_boxed(entity, record, value) {
                    Ok(_) => attached.push((entity, id, store.type_name())),
                    Err(err) => {
                        tracing::warn!(entity = entity.raw(), %err, "spawn component rejected");
                        stats.dropped += 1;
                    }
                }
            }
            if let Some(parent) = parent {
                parents.push((parent, entity));
            }
            if fresh {
                added.push(entity);
            }
        }

        // Parents may be spawned in the same flush, so link after all commits.
        for (parent, child) in parents {
            if let Err(err) = registry::attach(&mut live, parent, child) {
                tracing::debug!(entity = child.raw(), %err, "spawned entity left without parent");
            }
        }
    }

    for entity in &added {
        stats.entities_added += 1;
        report(|| observer.entity_added(*entity));
    }
    for (entity, id, name) in attached {
        stats.components_added += 1;
        report(|| observer.component_added(entity, id, name));
    }
    for entity in added {
        if let Some(mask) = registry.mask(entity) {
            routing.entity_added(entity, mask);
        }
    }
}
