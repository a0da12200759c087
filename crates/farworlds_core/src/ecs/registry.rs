//! # Entity Registry
//!
//! Owns the live entity table: which identifiers are live, each one's
//! component mask, and the parent/child links between them.
//!
//! Parent/child relations are plain identifiers resolved through the table,
//! so a destroyed parent can never leave a dangling owner behind.
//!
//! ## Lock Order
//!
//! The table lock is always taken before any component store lock. Attaching
//! a component takes the table lock shared (the mask is atomic); destroying an
//! entity takes it exclusively while its stores are cleared.

use std::collections::HashMap;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::component::ComponentId;
use super::entity::{EntityAllocator, EntityId, EntityRecord};
use super::tag::Tag;
use crate::error::{EcsError, EcsResult};

/// The live entity table.
pub(crate) type LiveTable = HashMap<EntityId, EntityRecord>;

/// Identity allocation, liveness, masks and hierarchy.
#[derive(Debug)]
pub struct EntityRegistry {
    allocator: EntityAllocator,
    live: RwLock<LiveTable>,
}

impl EntityRegistry {
    /// Creates an empty registry with room for `capacity` live entities.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator,
            live: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Allocates a fresh identifier. The entity is not live until committed.
    #[inline]
    #[must_use]
    pub fn create(&self) -> EntityId {
        self.allocator.next()
    }

    /// Allocates `count` identifiers from one contiguous range.
    #[must_use]
    pub fn create_many(&self, count: usize) -> Vec<EntityId> {
        self.allocator.next_many(count)
    }

    /// Checks whether the entity is in the live table.
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.live.read().contains_key(&entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// Returns `true` if no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Component mask of a live entity.
    #[must_use]
    pub fn mask(&self, entity: EntityId) -> Option<Tag> {
        self.live.read().get(&entity).map(EntityRecord::mask)
    }

    /// Bitmask check for one component slot. Takes no store lock.
    #[must_use]
    pub fn has(&self, entity: EntityId, id: ComponentId) -> bool {
        self.mask(entity).is_some_and(|mask| mask.contains(id))
    }

    /// Snapshot of live entities in ascending identifier order.
    #[must_use]
    pub fn live_entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.live.read().keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Snapshot of live entities whose mask matches `query`, ascending.
    #[must_use]
    pub fn query(&self, query: Tag) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self
            .live
            .read()
            .iter()
            .filter(|(_, record)| record.mask().matches(query))
            .map(|(id, _)| *id)
            .collect();
        entities.sort_unstable();
        entities
    }

    /// Parent of a live entity.
    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.live.read().get(&entity).and_then(EntityRecord::parent)
    }

    /// Children of a live entity, in attachment order. Empty if not found.
    #[must_use]
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.live
            .read()
            .get(&entity)
            .map(|record| record.children().to_vec())
            .unwrap_or_default()
    }

    /// Every descendant of `entity`, depth-first post-order, root excluded.
    ///
    /// Returns a snapshot; an unknown entity yields an empty list.
    #[must_use]
    pub fn descendants(&self, entity: EntityId) -> Vec<EntityId> {
        let live = self.live.read();
        let mut out = Vec::new();
        if live.contains_key(&entity) {
            collect_descendants(&live, entity, &mut out);
        }
        out
    }

    /// Makes `child` the last child of `parent`.
    ///
    /// A child that already has a parent is moved.
    ///
    /// # Errors
    ///
    /// - [`EcsError::EntityNotFound`] if either entity is not live.
    /// - [`EcsError::HierarchyCycle`] if `child` is `parent` or one of its ancestors.
    pub fn attach_child(&self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        let mut live = self.live.write();
        attach(&mut live, parent, child)
    }

    /// Removes `child` from `parent`'s children.
    ///
    /// Returns `false` if `child` was not a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if `parent` is not live.
    pub fn detach_child(&self, parent: EntityId, child: EntityId) -> EcsResult<bool> {
        let mut live = self.live.write();
        let record = live
            .get_mut(&parent)
            .ok_or(EcsError::EntityNotFound(parent))?;

        let Some(pos) = record.children.iter().position(|c| *c == child) else {
            return Ok(false);
        };
        record.children.remove(pos);

        if let Some(child_record) = live.get_mut(&child) {
            child_record.parent = None;
        }
        Ok(true)
    }

    /// Shared access to the table for attach/detach paths.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, LiveTable> {
        self.live.read()
    }

    /// Exclusive access to the table for commit/destroy paths.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, LiveTable> {
        self.live.write()
    }
}

/// Inserts a record for `entity` if it is not live yet. Returns `true` if inserted.
pub(crate) fn commit(live: &mut LiveTable, entity: EntityId) -> bool {
    if live.contains_key(&entity) {
        return false;
    }
    live.insert(entity, EntityRecord::new());
    true
}

/// Links `child` under `parent` in an already locked table.
pub(crate) fn attach(live: &mut LiveTable, parent: EntityId, child: EntityId) -> EcsResult<()> {
    if !live.contains_key(&parent) {
        return Err(EcsError::EntityNotFound(parent));
    }
    let Some(previous_parent) = live.get(&child).map(EntityRecord::parent) else {
        return Err(EcsError::EntityNotFound(child));
    };

    // Walk up from the parent; meeting the child means a cycle.
    let mut cursor = Some(parent);
    while let Some(current) = cursor {
        if current == child {
            return Err(EcsError::HierarchyCycle { parent, child });
        }
        cursor = live.get(&current).and_then(EntityRecord::parent);
    }

    if let Some(old_parent) = previous_parent {
        if old_parent == parent {
            return Ok(());
        }
        if let Some(old) = live.get_mut(&old_parent) {
            old.children.retain(|c| *c != child);
        }
    }

    if let Some(record) = live.get_mut(&child) {
        record.parent = Some(parent);
    }
    if let Some(record) = live.get_mut(&parent) {
        record.children.push(child);
    }
    Ok(())
}

/// Returns `root` and all its descendants, children before parents, with
/// `root` last. Empty if `root` is not live.
pub(crate) fn subtree(live: &LiveTable, root: EntityId) -> Vec<EntityId> {
    if !live.contains_key(&root) {
        return Vec::new();
    }
    let mut out = Vec::new();
    collect_descendants(live, root, &mut out);
    out.push(root);
    out
}

/// Drops the records of a subtree and unlinks its root from the root's parent.
pub(crate) fn remove_subtree(live: &mut LiveTable, root: EntityId, doomed: &[EntityId]) {
    if let Some(parent) = live.get(&root).and_then(EntityRecord::parent) {
        if let Some(record) = live.get_mut(&parent) {
            record.children.retain(|c| *c != root);
        }
    }
    for entity in doomed {
        live.remove(entity);
    }
}

fn collect_descendants(live: &LiveTable, entity: EntityId, out: &mut Vec<EntityId>) {
    let Some(record) = live.get(&entity) else {
        return;
    };
    for child in record.children() {
        collect_descendants(live, *child, out);
        if live.contains_key(child) {
            out.push(*child);
        }
    }
}
