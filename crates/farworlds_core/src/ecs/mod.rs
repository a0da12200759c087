//! # Entity Component System
//!
//! A concurrent ECS with deferred structural mutation.
//!
//! ## Design Philosophy
//!
//! - Entity IDs are process-wide, monotonically increasing and never reused
//! - Each component type has its own store behind its own lock
//! - Structural changes made during a tick are staged and applied at the next one
//! - Systems run single-threaded, in priority order, after the flush

pub mod commands;
mod component;
mod entity;
mod registry;
mod scheduler;
mod storage;
mod system;
mod tag;
mod world;

pub use commands::{
    CommandBuffer, CommandObserver, EntityRouting, FlushStats, NullObserver, SpawnCommand,
    TracingObserver,
};
pub use component::{Component, ComponentId, ComponentTypes, MAX_COMPONENT_TYPES};
pub use entity::{EntityAllocator, EntityId, EntityRecord};
pub use registry::EntityRegistry;
pub use scheduler::{RunStats, SystemScheduler, TickPhase};
pub use storage::{BoxedComponent, ComponentStore};
pub use system::{FnSystem, System, SystemFilter};
pub use tag::Tag;
pub use world::{EntityBuilder, World};
