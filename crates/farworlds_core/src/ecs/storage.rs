//! # Component Storage
//!
//! One store per registered component type. Each store maps entity
//! identifiers to boxed values behind its own reader/writer lock, so work on
//! different component types never contends.
//!
//! Values are held as `Box<dyn Any + Send + Sync>`; the store remembers the
//! `TypeId` it was created for and is the only place that downcasts.
//!
//! Locks are held for a single map operation. Callers that need several
//! stores at once lock them in ascending slot order.
//!
//! `attach`/`detach` also flip the entity's mask bit while the write lock is
//! held, so the bit and the map entry always change together.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use parking_lot::{RwLock, RwLockReadGuard};

use super::component::{Component, ComponentId};
use super::entity::{EntityId, EntityRecord};
use crate::error::{EcsError, EcsResult};

/// A type-erased component value.
pub type BoxedComponent = Box<dyn Any + Send + Sync>;

/// Storage for a single component type.
///
/// # Example
///
/// ```rust,ignore
/// let store = ComponentStore::new::<Guid>(ComponentId::new(0), 256);
/// store.insert(entity, Guid::random())?;
/// let guid: Option<Guid> = store.get(entity);
/// ```
pub struct ComponentStore {
    id: ComponentId,
    type_id: TypeId,
    type_name: &'static str,
    data: RwLock<HashMap<EntityId, BoxedComponent>>,
}

impl ComponentStore {
    /// Creates an empty store for `C` in the given slot.
    #[must_use]
    pub fn new<C: Component>(id: ComponentId, capacity: usize) -> Self {
        Self {
            id,
            type_id: TypeId::of::<C>(),
            type_name: C::name(),
            data: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Slot of the stored type.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Name of the stored type.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `TypeId` of the stored type.
    #[inline]
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Checks whether this store holds values of type `C`.
    #[inline]
    #[must_use]
    pub fn holds<C: Component>(&self) -> bool {
        self.type_id == TypeId::of::<C>()
    }

    /// Inserts or overwrites an already boxed value, returning the old one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentTypeMismatch`] if the value is not of the
    /// stored type. The store is left unchanged.
    pub fn insert_boxed(
        &self,
        entity: EntityId,
        value: BoxedComponent,
    ) -> EcsResult<Option<BoxedComponent>> {
        self.check_boxed(&value)?;
        Ok(self.data.write().insert(entity, value))
    }

    /// Inserts a boxed value and sets the slot bit in `record` under the
    /// same write lock.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentTypeMismatch`] if the value is not of the
    /// stored type. Neither the store nor the mask change.
    pub fn attach_boxed(
        &self,
        entity: EntityId,
        record: &EntityRecord,
        value: BoxedComponent,
    ) -> EcsResult<Option<BoxedComponent>> {
        self.check_boxed(&value)?;
        let mut data = self.data.write();
        let previous = data.insert(entity, value);
        record.set_bits(self.id.tag());
        Ok(previous)
    }

    /// Typed [`attach_boxed`](Self::attach_boxed).
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentTypeMismatch`] if `C` is not the stored type.
    pub fn attach<C: Component>(
        &self,
        entity: EntityId,
        record: &EntityRecord,
        value: C,
    ) -> EcsResult<Option<C>> {
        self.check::<C>()?;
        let previous = self.attach_boxed(entity, record, Box::new(value))?;
        Ok(previous.and_then(|old| old.downcast::<C>().ok()).map(|old| *old))
    }

    /// Removes the entity's value and clears the slot bit in `record` under
    /// the same write lock.
    pub fn detach(&self, entity: EntityId, record: &EntityRecord) -> Option<BoxedComponent> {
        let mut data = self.data.write();
        let removed = data.remove(&entity);
        record.clear_bits(self.id.tag());
        removed
    }

    /// Typed [`detach`](Self::detach). `None` without touching anything if
    /// `C` is not the stored type.
    pub fn detach_as<C: Component>(&self, entity: EntityId, record: &EntityRecord) -> Option<C> {
        if !self.holds::<C>() {
            return None;
        }
        self.detach(entity, record)
            .and_then(|value| value.downcast::<C>().ok())
            .map(|value| *value)
    }

    /// Inserts or overwrites a typed value, returning the old one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentTypeMismatch`] if `C` is not the stored type.
    pub fn insert<C: Component>(&self, entity: EntityId, value: C) -> EcsResult<Option<C>> {
        self.check::<C>()?;
        let previous = self.data.write().insert(entity, Box::new(value));
        Ok(previous.and_then(|old| old.downcast::<C>().ok()).map(|old| *old))
    }

    /// Returns a clone of the entity's value.
    ///
    /// `None` if the entity has no value here or `C` is not the stored type.
    #[must_use]
    pub fn get<C: Component + Clone>(&self, entity: EntityId) -> Option<C> {
        self.with(entity, C::clone)
    }

    /// Runs `f` on the entity's value under the read lock.
    pub fn with<C: Component, R>(&self, entity: EntityId, f: impl FnOnce(&C) -> R) -> Option<R> {
        let data = self.data.read();
        data.get(&entity)
            .and_then(|value| value.downcast_ref::<C>())
            .map(f)
    }

    /// Runs `f` on the entity's value under the write lock.
    pub fn with_mut<C: Component, R>(
        &self,
        entity: EntityId,
        f: impl FnOnce(&mut C) -> R,
    ) -> Option<R> {
        let mut data = self.data.write();
        data.get_mut(&entity)
            .and_then(|value| value.downcast_mut::<C>())
            .map(f)
    }

    /// Removes the entity's value, returning it still boxed.
    pub fn remove(&self, entity: EntityId) -> Option<BoxedComponent> {
        self.data.write().remove(&entity)
    }

    /// Removes and unboxes the entity's value.
    pub fn take<C: Component>(&self, entity: EntityId) -> Option<C> {
        if !self.holds::<C>() {
            return None;
        }
        self.remove(entity)
            .and_then(|value| value.downcast::<C>().ok())
            .map(|value| *value)
    }

    /// Removes every listed entity under one write lock.
    ///
    /// Returns the entities that actually had a value.
    pub fn remove_all(&self, entities: &[EntityId]) -> Vec<EntityId> {
        let mut data = self.data.write();
        entities
            .iter()
            .filter(|entity| data.remove(*entity).is_some())
            .copied()
            .collect()
    }

    /// Checks whether the entity has a value here. Takes the read lock.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.data.read().contains_key(&entity)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of the entities that have a value here, in ascending order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.data.read().keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Acquires the read lock for multi-store reads.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<EntityId, BoxedComponent>> {
        self.data.read()
    }

    fn check_boxed(&self, value: &BoxedComponent) -> EcsResult<()> {
        if (**value).type_id() == self.type_id {
            Ok(())
        } else {
            Err(EcsError::ComponentTypeMismatch {
                expected: self.type_name,
                found: "<boxed value of another type>",
            })
        }
    }

    fn check<C: Component>(&self) -> EcsResult<()> {
        if self.holds::<C>() {
            Ok(())
        } else {
            Err(EcsError::ComponentTypeMismatch {
                expected: self.type_name,
                found: type_name::<C>(),
            })
        }
    }
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("len", &self.len())
            .finish()
    }
}
