//! # Component Registration
//!
//! Components are plain data attached to entities. A type becomes a component
//! by implementing the [`Component`] marker trait, and becomes usable once it
//! has been registered with the world, which assigns it:
//!
//! - a slot ([`ComponentId`]) in `0..64`, i.e. one bit of the entity mask
//! - a dedicated [`ComponentStore`] with its own lock
//!
//! Slots are assigned sequentially in registration order and are stable for
//! the lifetime of the world.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::storage::ComponentStore;
use super::tag::Tag;
use crate::error::{EcsError, EcsResult};

/// Maximum number of distinct component types (one bit each in a `u64` mask).
pub const MAX_COMPONENT_TYPES: usize = 64;

/// Marker trait for ECS components.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug)]
/// struct Guid(String);
///
/// impl Component for Guid {}
/// ```
pub trait Component: Send + Sync + 'static {
    /// Human-readable name used in logs and errors.
    fn name() -> &'static str
    where
        Self: Sized,
    {
        type_name::<Self>()
    }
}

/// Slot assigned to a component type at registration (0-63).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Creates a component slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is 64 or more.
    #[inline]
    #[must_use]
    pub const fn new(slot: u8) -> Self {
        assert!((slot as usize) < MAX_COMPONENT_TYPES, "component slot out of range");
        Self(slot)
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the mask bit for this slot.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u64 {
        1 << self.0
    }

    /// Returns a single-slot tag.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> Tag {
        Tag::from_bits(self.bit())
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration table: type identity → slot → store.
///
/// Only mutated during setup; the world keeps it behind a lock that is
/// write-locked exclusively by registration.
pub struct ComponentTypes {
    by_type: HashMap<TypeId, ComponentId>,
    /// Stores indexed by slot.
    stores: Vec<Arc<ComponentStore>>,
    store_capacity: usize,
}

impl ComponentTypes {
    /// Creates an empty table. New stores pre-allocate `store_capacity` entries.
    #[must_use]
    pub fn new(store_capacity: usize) -> Self {
        Self {
            by_type: HashMap::with_capacity(MAX_COMPONENT_TYPES),
            stores: Vec::with_capacity(MAX_COMPONENT_TYPES),
            store_capacity,
        }
    }

    /// Registers `C`, returning its slot.
    ///
    /// Registering an already known type returns the existing slot.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::TooManyComponentTypes`] when all 64 slots are taken.
    pub fn register<C: Component>(&mut self) -> EcsResult<ComponentId> {
        if let Some(id) = self.by_type.get(&TypeId::of::<C>()) {
            return Ok(*id);
        }

        if self.stores.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyComponentTypes {
                limit: MAX_COMPONENT_TYPES,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let id = ComponentId::new(self.stores.len() as u8);
        self.stores
            .push(Arc::new(ComponentStore::new::<C>(id, self.store_capacity)));
        self.by_type.insert(TypeId::of::<C>(), id);
        Ok(id)
    }

    /// Returns the slot of `C`, if registered.
    #[inline]
    #[must_use]
    pub fn id_of<C: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<C>()).copied()
    }

    /// Returns the slot of `C`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` was never registered.
    pub fn require<C: Component>(&self) -> EcsResult<ComponentId> {
        self.id_of::<C>()
            .ok_or_else(|| EcsError::ComponentNotRegistered(C::name()))
    }

    /// Returns the store for a slot.
    #[inline]
    #[must_use]
    pub fn store(&self, id: ComponentId) -> Option<&Arc<ComponentStore>> {
        self.stores.get(id.index())
    }

    /// All stores in ascending slot order.
    ///
    /// This is the global lock order for code that locks several stores.
    #[inline]
    #[must_use]
    pub fn stores(&self) -> &[Arc<ComponentStore>] {
        &self.stores
    }

    /// Checks whether a slot has been assigned.
    #[inline]
    #[must_use]
    pub fn is_registered(&self, id: ComponentId) -> bool {
        id.index() < self.stores.len()
    }

    /// Tag with every registered slot set.
    #[must_use]
    pub fn registered(&self) -> Tag {
        self.stores
            .iter()
            .fold(Tag::EMPTY, |tag, store| tag.with(store.id()))
    }

    /// ORs the bits of the given slots.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if a slot is unassigned.
    pub fn tag_for(&self, ids: &[ComponentId]) -> EcsResult<Tag> {
        if let Some(missing) = ids.iter().find(|id| !self.is_registered(**id)) {
            tracing::error!(slot = missing.index(), "tag requested for unassigned component slot");
            return Err(EcsError::ComponentNotRegistered("<unassigned slot>"));
        }
        Ok(Tag::from_ids(ids))
    }

    /// Name of the type registered in a slot.
    #[must_use]
    pub fn name(&self, id: ComponentId) -> Option<&'static str> {
        self.store(id).map(|store| store.type_name())
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl fmt::Debug for ComponentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stores.iter().map(|s| (s.id(), s.type_name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Guid;
    impl Component for Guid {}

    struct Position;
    impl Component for Position {}

    /// Generates distinct component types for capacity tests.
    struct Filler<const N: usize>;
    impl<const N: usize> Component for Filler<N> {}

    macro_rules! register_fillers {
        ($types:expr, $($n:literal)*) => {
            $( $types.register::<Filler<$n>>().unwrap(); )*
        };
    }

    #[test]
    fn test_sequential_slots() {
        let mut types = ComponentTypes::new(4);
        assert_eq!(types.register::<Guid>().unwrap(), ComponentId::new(0));
        assert_eq!(types.register::<Position>().unwrap(), ComponentId::new(1));
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut types = ComponentTypes::new(4);
        let first = types.register::<Guid>().unwrap();
        let second = types.register::<Guid>().unwrap();
        assert_eq!(first, second);
        assert_eq!(types.len(), 1);
    }

    #[test]
    fn test_sixty_fifth_type_rejected() {
        let mut types = ComponentTypes::new(1);
        register_fillers!(types,
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
            32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
            48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63);
        assert_eq!(types.len(), MAX_COMPONENT_TYPES);

        let err = types.register::<Guid>().unwrap_err();
        assert_eq!(err, EcsError::TooManyComponentTypes { limit: 64 });

        // Known types still resolve after the table is full.
        assert_eq!(types.register::<Filler<63>>().unwrap(), ComponentId::new(63));
    }

    #[test]
    fn test_require_unregistered() {
        let types = ComponentTypes::new(1);
        assert!(matches!(
            types.require::<Guid>(),
            Err(EcsError::ComponentNotRegistered(_))
        ));
    }

    #[test]
    fn test_tag_for() {
        let mut types = ComponentTypes::new(1);
        let guid = types.register::<Guid>().unwrap();
        let pos = types.register::<Position>().unwrap();
        assert_eq!(types.tag_for(&[guid, pos]).unwrap().bits(), 0b11);
        assert!(types.tag_for(&[ComponentId::new(9)]).is_err());
        assert_eq!(types.registered().bits(), 0b11);
    }
}
