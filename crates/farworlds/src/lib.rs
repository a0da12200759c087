//! # FAR WORLDS
//!
//! The game-side wiring of the runtime core: map components, the systems that
//! interpret them, and the logging bootstrap used by the binaries.
//!
//! ```rust,ignore
//! let mut manager = Manager::new(config)?;
//! farworlds::register_components(&mut manager)?;
//! let guids = farworlds::register_systems(&mut manager)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod components;
pub mod systems;
pub mod telemetry;

pub use components::{register_components, Guid, MapItem, MapItemBlock, MapItemMovement, Position};
pub use systems::{register_systems, GuidIndex, GuidLookup, MovementSystem};
pub use telemetry::init_telemetry;
