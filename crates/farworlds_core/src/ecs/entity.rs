//! # Entity Management
//!
//! Entities are plain 64-bit identifiers handed out by a process-wide
//! monotonic counter. Identifiers are never reused, so a stale handle can
//! never alias a newer entity.
//!
//! The per-entity bookkeeping (component mask, hierarchy links) lives in an
//! [`EntityRecord`] owned by the [`EntityRegistry`](super::registry::EntityRegistry).

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use super::tag::Tag;

/// Next identifier to hand out. Identifier 0 is never issued.
static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Wraps a raw identifier.
    ///
    /// Intended for logs and tests; live identifiers come from
    /// [`EntityAllocator`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityId(NULL)")
        } else {
            write!(f, "EntityId({})", self.0)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out entity identifiers.
///
/// All allocators share one process-wide counter, so identifiers are unique
/// across every world in the process. Safe for concurrent use.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityAllocator;

impl EntityAllocator {
    /// Allocates one identifier.
    #[inline]
    #[must_use]
    pub fn next(self) -> EntityId {
        EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserves `count` contiguous identifiers with a single atomic add.
    #[must_use]
    pub fn reserve(self, count: usize) -> Range<u64> {
        let count = count as u64;
        let first = NEXT_ENTITY_ID.fetch_add(count, Ordering::Relaxed);
        first..first + count
    }

    /// Allocates `count` identifiers from one contiguous range.
    #[must_use]
    pub fn next_many(self, count: usize) -> Vec<EntityId> {
        self.reserve(count).map(EntityId).collect()
    }
}

/// Registry-side state of a live entity.
///
/// The mask is atomic so that attaching components of different types only
/// needs shared access to the live table.
#[derive(Debug)]
pub struct EntityRecord {
    mask: AtomicU64,
    /// Non-owning back-reference to the parent.
    pub(crate) parent: Option<EntityId>,
    /// Children in attachment order.
    pub(crate) children: Vec<EntityId>,
}

impl EntityRecord {
    /// Creates a record with no components and no hierarchy links.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mask: AtomicU64::new(0),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns the current component mask.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> Tag {
        Tag::from_bits(self.mask.load(Ordering::Acquire))
    }

    /// Sets the bits of `tag` in the mask.
    #[inline]
    pub fn set_bits(&self, tag: Tag) {
        self.mask.fetch_or(tag.bits(), Ordering::AcqRel);
    }

    /// Clears the bits of `tag` from the mask.
    #[inline]
    pub fn clear_bits(&self, tag: Tag) {
        self.mask.fetch_and(!tag.bits(), Ordering::AcqRel);
    }

    /// Returns the parent, if any.
    #[inline]
    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Returns the children in attachment order.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self::new()
    }
}
