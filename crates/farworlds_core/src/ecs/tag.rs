//! # Tags
//!
//! A tag is a set of component slots packed into a `u64`, plus an `inverse`
//! flag that flips the result of matching against it.
//!
//! ```text
//! entity mask:  0b1011   (slots 0, 1, 3)
//! query tag:    0b0011   -> matches (mask is a superset)
//! query tag:    0b0011 + inverse -> does not match
//! ```

use std::fmt;

use super::component::{ComponentId, MAX_COMPONENT_TYPES};

/// A set of component slots with inclusion/exclusion matching.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tag {
    flags: u64,
    inverse: bool,
}

impl Tag {
    /// The empty, non-inverted tag. Every mask matches it.
    pub const EMPTY: Self = Self {
        flags: 0,
        inverse: false,
    };

    /// Creates a tag from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(flags: u64) -> Self {
        Self {
            flags,
            inverse: false,
        }
    }

    /// Creates a tag with one bit set per component slot.
    #[must_use]
    pub fn from_ids(ids: &[ComponentId]) -> Self {
        ids.iter().fold(Self::EMPTY, |tag, id| tag.with(*id))
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.flags
    }

    /// Returns whether matching against this tag is inverted.
    #[inline]
    #[must_use]
    pub const fn is_inverse(self) -> bool {
        self.inverse
    }

    /// Returns a copy with the slot's bit set.
    #[inline]
    #[must_use]
    pub const fn with(self, id: ComponentId) -> Self {
        Self {
            flags: self.flags | id.bit(),
            inverse: self.inverse,
        }
    }

    /// Returns a copy with the slot's bit cleared.
    #[inline]
    #[must_use]
    pub const fn without(self, id: ComponentId) -> Self {
        Self {
            flags: self.flags & !id.bit(),
            inverse: self.inverse,
        }
    }

    /// Checks whether the slot's bit is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, id: ComponentId) -> bool {
        self.flags & id.bit() != 0
    }

    /// ORs `other`'s bits into this tag.
    #[inline]
    pub fn union(&mut self, other: Self) -> &mut Self {
        self.flags |= other.flags;
        self
    }

    /// XORs `other`'s bits into this tag.
    #[inline]
    pub fn toggle(&mut self, other: Self) -> &mut Self {
        self.flags ^= other.flags;
        self
    }

    /// Returns a copy with the inverse flag set to `inverse`.
    #[inline]
    #[must_use]
    pub const fn inverse(self, inverse: bool) -> Self {
        Self {
            flags: self.flags,
            inverse,
        }
    }

    /// Returns a copy with the inverse flag set.
    #[inline]
    #[must_use]
    pub const fn inverted(self) -> Self {
        self.inverse(true)
    }

    /// Superset test against `query`, XOR'd with `query`'s inverse flag.
    ///
    /// `self` is usually an entity's component mask.
    #[inline]
    #[must_use]
    pub const fn matches(self, query: Self) -> bool {
        let superset = self.flags & query.flags == query.flags;
        superset != query.inverse
    }

    /// Checks whether the two tags share any bit.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.flags & other.flags != 0
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.flags == 0
    }

    /// Number of slots in the tag.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.flags.count_ones()
    }

    /// Iterates over the slots in ascending order.
    pub fn ids(self) -> impl Iterator<Item = ComponentId> {
        (0..MAX_COMPONENT_TYPES as u8)
            .map(ComponentId::new)
            .filter(move |id| self.contains(*id))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverse {
            write!(f, "Tag(!{:#b})", self.flags)
        } else {
            write!(f, "Tag({:#b})", self.flags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ComponentId {
        ComponentId::new(n)
    }

    #[test]
    fn test_superset_matching() {
        let mask = Tag::from_ids(&[id(0), id(1), id(3)]);
        assert!(mask.matches(Tag::from_ids(&[id(0), id(1)])));
        assert!(mask.matches(Tag::EMPTY));
        assert!(!mask.matches(Tag::from_ids(&[id(2)])));
        assert!(!mask.matches(Tag::from_ids(&[id(0), id(2)])));
    }

    #[test]
    fn test_inverse_matching() {
        let mask = Tag::from_ids(&[id(0)]);
        let lacks_position = Tag::from_ids(&[id(1)]).inverted();
        assert!(mask.matches(lacks_position));
        assert!(!Tag::from_ids(&[id(0), id(1)]).matches(lacks_position));
        // The empty inverted tag matches nothing.
        assert!(!mask.matches(Tag::EMPTY.inverted()));
    }

    #[test]
    fn test_union_and_toggle() {
        let mut tag = Tag::from_bits(0b0101);
        tag.union(Tag::from_bits(0b0011));
        assert_eq!(tag.bits(), 0b0111);
        tag.toggle(Tag::from_bits(0b0110));
        assert_eq!(tag.bits(), 0b0001);
    }

    #[test]
    fn test_highest_slot() {
        let tag = Tag::EMPTY.with(id(63));
        assert_eq!(tag.bits(), 1 << 63);
        assert!(tag.contains(id(63)));
        assert_eq!(tag.without(id(63)), Tag::EMPTY);
        assert_eq!(tag.ids().collect::<Vec<_>>(), vec![id(63)]);
    }

    #[test]
    fn test_inverse_preserved_by_with() {
        let tag = Tag::EMPTY.inverted().with(id(4));
        assert!(tag.is_inverse());
        assert_eq!(tag.len(), 1);
    }
}
