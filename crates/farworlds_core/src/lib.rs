//! # FAR WORLDS Core
//!
//! Runtime core of the FAR WORLDS entity component system:
//! - typed components attached to process-unique entity identifiers
//! - per-type stores, each behind its own reader/writer lock
//! - a deferred command buffer that any number of threads can feed
//! - priority-ordered systems run once per tick after the buffer is flushed
//!
//! ## Example
//!
//! ```rust,ignore
//! use farworlds_core::{EcsConfig, Manager};
//!
//! let mut manager = Manager::new(EcsConfig::default())?;
//! manager.register_component::<Guid>()?;
//! manager.register_component::<Position>()?;
//!
//! let world = manager.world();
//! let entity = world
//!     .create()
//!     .with(Guid::random())?
//!     .with(Position::new(0, 0))?
//!     .commit();
//!
//! manager.update(0.1);
//! assert!(world.has::<Position>(entity));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod manager;

pub use config::EcsConfig;
pub use ecs::{
    CommandObserver, Component, ComponentId, EntityBuilder, EntityId, FlushStats, FnSystem,
    System, SystemFilter, Tag, TickPhase, World,
};
pub use error::{EcsError, EcsResult};
pub use manager::{Manager, TickStats};
