//! # Systems
//!
//! A system is per-tick logic over the entities that carry a given set of
//! components. The scheduler calls [`System::update`] once per tick in
//! priority order (higher first) after the command buffer has been flushed.
//!
//! Systems registered with a [`SystemFilter`] are also told about matching
//! entities as they become live ([`System::add`]), and every system is told
//! about entities that are going away ([`System::remove`]) before their
//! storage is reclaimed.

use std::any::type_name;
use std::sync::Arc;

use super::entity::EntityId;
use super::tag::Tag;
use super::world::World;
use crate::error::{EcsError, EcsResult};

/// A unit of per-tick logic.
///
/// # Example
///
/// ```rust,ignore
/// struct Gravity {
///     bodies: Vec<EntityId>,
/// }
///
/// impl System for Gravity {
///     fn priority(&self) -> i32 { 100 }
///
///     fn update(&mut self, world: &World, dt: f32) -> EcsResult<()> {
///         for body in &self.bodies {
///             world.with_mut(*body, |v: &mut Velocity| v.y -= 9.81 * dt);
///         }
///         Ok(())
///     }
///
///     fn add(&mut self, entity: EntityId) { self.bodies.push(entity); }
///     fn remove(&mut self, entity: EntityId) { self.bodies.retain(|e| *e != entity); }
/// }
/// ```
pub trait System: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Execution order within a tick; higher runs earlier. Default 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Called once, synchronously, when the system is registered.
    ///
    /// The world handle can resolve component tags, read entities and queue
    /// commands, and may be kept for later. It cannot register component
    /// types or systems; those go through the [`Manager`](crate::Manager),
    /// which is mutably borrowed for the duration of the call.
    ///
    /// # Errors
    ///
    /// An error aborts the registration and is returned to the caller.
    fn init(&mut self, _world: &Arc<World>) -> EcsResult<()> {
        Ok(())
    }

    /// Runs the system for one tick. `dt` is the time since the previous tick.
    ///
    /// Structural changes must go through the command buffer; they become
    /// visible at the next tick.
    ///
    /// # Errors
    ///
    /// An error is logged and counted; other systems still run.
    fn update(&mut self, world: &World, dt: f32) -> EcsResult<()>;

    /// A live entity matching this system's filter appeared.
    fn add(&mut self, _entity: EntityId) {}

    /// `entity` is about to be destroyed; drop any cached reference to it.
    fn remove(&mut self, entity: EntityId);
}

/// A [`System`] backed by a closure.
pub struct FnSystem<F>
where
    F: FnMut(&World, f32) -> EcsResult<()> + Send,
{
    name: &'static str,
    priority: i32,
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&World, f32) -> EcsResult<()> + Send,
{
    /// Creates a function-backed system with priority 0.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, priority: 0, f }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&World, f32) -> EcsResult<()> + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn update(&mut self, world: &World, dt: f32) -> EcsResult<()> {
        (self.f)(world, dt)
    }

    fn remove(&mut self, _entity: EntityId) {}
}

impl<F> std::fmt::Debug for FnSystem<F>
where
    F: FnMut(&World, f32) -> EcsResult<()> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSystem")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Decides which newly live entities are routed to a system.
///
/// An entity is accepted when its mask matches `include` (see
/// [`Tag::matches`]) and carries none of the `exclude` components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemFilter {
    include: Tag,
    exclude: Tag,
}

impl SystemFilter {
    /// Accepts entities matching `include`.
    #[must_use]
    pub const fn new(include: Tag) -> Self {
        Self {
            include,
            exclude: Tag::EMPTY,
        }
    }

    /// Also rejects entities carrying any component in `exclude`.
    #[must_use]
    pub const fn excluding(mut self, exclude: Tag) -> Self {
        self.exclude = exclude;
        self
    }

    /// Inclusion tag.
    #[must_use]
    pub const fn include(&self) -> Tag {
        self.include
    }

    /// Exclusion tag.
    #[must_use]
    pub const fn exclude(&self) -> Tag {
        self.exclude
    }

    /// Checks an entity mask against the filter.
    #[must_use]
    pub fn accepts(&self, mask: Tag) -> bool {
        mask.matches(self.include) && !mask.intersects(self.exclude)
    }

    /// Rejects overlapping include/exclude sets and unassigned slots.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConflictingFilter`].
    pub fn validate(&self, system: &str, registered: Tag) -> EcsResult<()> {
        if self.include.intersects(self.exclude) {
            return Err(EcsError::ConflictingFilter {
                system: system.to_owned(),
                reason: "inclusion and exclusion sets overlap".to_owned(),
            });
        }
        let named = self.include.bits() | self.exclude.bits();
        if named & !registered.bits() != 0 {
            return Err(EcsError::ConflictingFilter {
                system: system.to_owned(),
                reason: "filter names an unregistered component slot".to_owned(),
            });
        }
        Ok(())
    }
}
