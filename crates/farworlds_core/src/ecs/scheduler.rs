//! # System Scheduler
//!
//! Holds the systems in execution order and runs them once per tick.
//!
//! ## Tick State Machine
//!
//! ```text
//! Idle ──> Flushing ──> Running ──> Idle
//!          (commands)   (systems, highest priority first)
//! ```
//!
//! Order is descending priority, ties broken by registration order. The
//! order is recomputed only by [`SystemScheduler::resort`], never implicitly.
//!
//! Every system is a fault boundary: an `Err` from `update` (or a panic, when
//! isolation is on) is logged, counted and the tick moves on to the next
//! system.

use std::any::Any;
use std::cmp::Reverse;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::commands::EntityRouting;
use super::entity::EntityId;
use super::system::{System, SystemFilter};
use super::tag::Tag;
use super::world::World;
use crate::error::EcsError;

/// Phase of the tick loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TickPhase {
    /// Between ticks.
    Idle = 0,
    /// Applying the command buffer.
    Flushing = 1,
    /// Running system updates.
    Running = 2,
}

impl TickPhase {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Flushing,
            2 => Self::Running,
            _ => Self::Idle,
        }
    }
}

/// Outcome of one pass over the systems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Systems whose update returned `Ok`.
    pub succeeded: u32,
    /// Systems whose update failed or panicked.
    pub failed: u32,
}

struct Entry {
    system: Box<dyn System>,
    filter: Option<SystemFilter>,
    priority: i32,
    seq: u64,
}

/// Priority-ordered system list.
pub struct SystemScheduler {
    entries: Vec<Entry>,
    next_seq: u64,
    isolate_panics: bool,
}

impl SystemScheduler {
    /// Creates an empty scheduler. With `isolate_panics`, a panicking system
    /// counts as a failure instead of unwinding through the tick.
    #[must_use]
    pub const fn new(isolate_panics: bool) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            isolate_panics,
        }
    }

    /// Appends a system without re-sorting.
    pub fn push(&mut self, system: Box<dyn System>, filter: Option<SystemFilter>) {
        let priority = system.priority();
        self.entries.push(Entry {
            system,
            filter,
            priority,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Appends a system and re-sorts.
    pub fn insert(&mut self, system: Box<dyn System>, filter: Option<SystemFilter>) {
        self.push(system, filter);
        self.resort();
    }

    /// Re-reads every system's priority and restores execution order.
    pub fn resort(&mut self) {
        for entry in &mut self.entries {
            entry.priority = entry.system.priority();
        }
        self.entries
            .sort_by_key(|entry| (Reverse(entry.priority), entry.seq));
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// System names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.system.name().to_owned())
            .collect()
    }

    /// Runs every system once, in order.
    pub fn run(&mut self, world: &World, dt: f32) -> RunStats {
        let mut stats = RunStats::default();
        for entry in &mut self.entries {
            let outcome = guarded(self.isolate_panics, || entry.system.update(world, dt))
                .unwrap_or_else(|panic| Err(EcsError::system(entry.system.name(), panic)));
            match outcome {
                Ok(()) => stats.succeeded += 1,
                Err(err) => {
                    tracing::error!(system = entry.system.name(), %err, "system update failed");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

impl EntityRouting for SystemScheduler {
    fn entity_removing(&mut self, entity: EntityId) {
        for entry in &mut self.entries {
            if let Err(panic) = guarded(self.isolate_panics, || entry.system.remove(entity)) {
                tracing::error!(system = entry.system.name(), entity = entity.raw(), reason = %panic, "removal callback panicked");
            }
        }
    }

    fn entity_added(&mut self, entity: EntityId, mask: Tag) {
        for entry in &mut self.entries {
            if !entry.filter.is_some_and(|filter| filter.accepts(mask)) {
                continue;
            }
            if let Err(panic) = guarded(self.isolate_panics, || entry.system.add(entity)) {
                tracing::error!(system = entry.system.name(), entity = entity.raw(), reason = %panic, "add callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for SystemScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemScheduler")
            .field("systems", &self.names())
            .field("isolate_panics", &self.isolate_panics)
            .finish()
    }
}

/// Runs `f`, catching a panic as its message when `isolate` is set.
fn guarded<T>(isolate: bool, f: impl FnOnce() -> T) -> Result<T, String> {
    if !isolate {
        return Ok(f());
    }
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}
