//! # Manager
//!
//! The façade composing the world and the scheduler. It registers component
//! types and systems during setup and drives the tick loop afterwards:
//!
//! ```text
//! update(dt):  Idle ─> Flushing (command buffer) ─> Running (systems) ─> Idle
//! ```
//!
//! The manager does not own a timing source; an external driver calls
//! [`Manager::update`] once per frame. `update` takes `&mut self`, so the
//! tick can never run concurrently with itself, while producer threads keep
//! enqueueing through their own [`World`] handles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EcsConfig;
use crate::ecs::{
    CommandObserver, Component, ComponentId, EntityBuilder, EntityId, EntityRouting, FlushStats,
    NullObserver, RunStats, System, SystemFilter, SystemScheduler, Tag, TickPhase, TracingObserver,
    World,
};
use crate::error::EcsResult;

/// Tick statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks completed.
    pub ticks: u64,
    /// Result of the most recent flush.
    pub last_flush: FlushStats,
    /// Result of the most recent system pass.
    pub last_run: RunStats,
    /// System failures across all ticks.
    pub system_failures: u64,
    /// Duration of the most recent tick.
    pub last_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
}

/// Owns the world and the systems, and runs ticks.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = Manager::new(EcsConfig::default())?;
/// manager.register_component::<Guid>()?;
/// manager.register_component::<Position>()?;
/// manager.register_system(MovementSystem::default())?;
///
/// let world = manager.world();
/// let e = world.create().with(Guid::random())?.commit();
///
/// manager.update(0.1);
/// assert!(world.has::<Guid>(e));
/// ```
pub struct Manager {
    world: Arc<World>,
    scheduler: SystemScheduler,
    observer: Box<dyn CommandObserver>,
    stats: TickStats,
    /// Entities whose removal systems were already told about, until the
    /// flush that reclaims them.
    notified: HashSet<EntityId>,
}

impl Manager {
    /// Creates a manager with an empty world.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`](crate::EcsError::InvalidConfig) if
    /// `config` fails validation.
    pub fn new(config: EcsConfig) -> EcsResult<Self> {
        config.validate()?;
        let observer: Box<dyn CommandObserver> = if config.trace_commands {
            Box::new(TracingObserver)
        } else {
            Box::new(NullObserver)
        };

        tracing::info!(
            entity_capacity = config.entity_capacity,
            store_capacity = config.store_capacity,
            isolate_panics = config.isolate_panics,
            "ecs manager created"
        );

        Ok(Self {
            world: Arc::new(World::new(&config)),
            scheduler: SystemScheduler::new(config.isolate_panics),
            observer,
            stats: TickStats::default(),
            notified: HashSet::new(),
        })
    }

    /// A shared handle to the world, for producers and setup code.
    #[must_use]
    pub fn world(&self) -> Arc<World> {
        Arc::clone(&self.world)
    }

    /// Replaces the flush observer.
    pub fn set_observer(&mut self, observer: impl CommandObserver + 'static) {
        self.observer = Box::new(observer);
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Registers a component type. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::TooManyComponentTypes`](crate::EcsError::TooManyComponentTypes)
    /// for the 65th distinct type.
    pub fn register_component<C: Component>(&mut self) -> EcsResult<ComponentId> {
        self.world.register_component::<C>().map_err(|err| {
            tracing::error!(component = C::name(), %err, "component registration failed");
            err
        })
    }

    /// Registers a system that is not routed entities, only ticked and told
    /// about removals.
    ///
    /// # Errors
    ///
    /// Whatever the system's `init` returns.
    pub fn register_system(&mut self, system: impl System + 'static) -> EcsResult<()> {
        self.add_system(Box::new(system), None)?;
        self.scheduler.resort();
        Ok(())
    }

    /// Registers a system that also receives every newly live entity accepted
    /// by `filter`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ConflictingFilter`](crate::EcsError::ConflictingFilter)
    ///   for an overlapping or unregistered filter.
    /// - Whatever the system's `init` returns.
    pub fn register_system_filtered(
        &mut self,
        system: impl System + 'static,
        filter: SystemFilter,
    ) -> EcsResult<()> {
        self.add_system(Box::new(system), Some(filter))?;
        self.scheduler.resort();
        Ok(())
    }

    /// Registers several unfiltered systems and sorts once.
    ///
    /// # Errors
    ///
    /// Stops at the first failing `init`; systems before it stay registered.
    pub fn register_systems(
        &mut self,
        systems: impl IntoIterator<Item = Box<dyn System>>,
    ) -> EcsResult<()> {
        let outcome = systems
            .into_iter()
            .try_for_each(|system| self.add_system(system, None));
        self.scheduler.resort();
        outcome
    }

    /// Re-reads system priorities and restores execution order.
    pub fn resort_systems(&mut self) {
        self.scheduler.resort();
    }

    /// System names in execution order.
    #[must_use]
    pub fn systems(&self) -> Vec<String> {
        self.scheduler.names()
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Runs one tick: flush the command buffer, then run every system.
    ///
    /// Returns the updated statistics.
    pub fn update(&mut self, dt: f32) -> TickStats {
        let start = Instant::now();
        let (flush, run) = {
            let phase = PhaseGuard::new(Arc::clone(&self.world));
            phase.set(TickPhase::Flushing);
            let flush = self.apply_commands();
            phase.set(TickPhase::Running);
            let run = self.scheduler.run(&self.world, dt);
            (flush, run)
        };

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.stats.ticks += 1;
        self.stats.last_flush = flush;
        self.stats.last_run = run;
        self.stats.system_failures += u64::from(run.failed);
        self.stats.last_tick_us = elapsed_us;
        self.stats.max_tick_us = self.stats.max_tick_us.max(elapsed_us);

        tracing::trace!(tick = self.stats.ticks, elapsed_us, ?flush, ?run, "tick complete");
        self.stats
    }

    /// Applies pending commands without running systems.
    pub fn flush(&mut self) -> FlushStats {
        let phase = PhaseGuard::new(Arc::clone(&self.world));
        phase.set(TickPhase::Flushing);
        self.apply_commands()
    }

    /// Statistics so far.
    #[must_use]
    pub const fn stats(&self) -> TickStats {
        self.stats
    }

    /// Current tick phase.
    #[must_use]
    pub fn phase(&self) -> TickPhase {
        self.world.phase()
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Destroys an entity and its subtree at the next flush.
    ///
    /// Every system's removal callback runs now, for the entity and each
    /// current descendant, so systems drop their references before the
    /// storage is reclaimed. Systems are told at most once per entity, however
    /// many removals are queued for it before the flush.
    ///
    /// Returns `false` if the entity is not live or already being destroyed.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.world.is_live(entity) {
            tracing::debug!(entity = entity.raw(), "destroy for missing entity");
            return false;
        }
        if self.notified.contains(&entity) {
            tracing::debug!(entity = entity.raw(), "destroy already pending");
            return false;
        }
        let mut doomed = self.world.descendants(entity);
        doomed.push(entity);
        for doomed_entity in &doomed {
            if self.notified.insert(*doomed_entity) {
                self.scheduler.entity_removing(*doomed_entity);
            }
        }
        self.world.commands().enqueue_remove_entity_notified(entity, doomed);
        true
    }

    /// Makes a built entity live right away, bypassing the command buffer.
    ///
    /// For setup code before the loop starts.
    pub fn spawn_now(&mut self, builder: EntityBuilder<'_>) -> EntityId {
        let spawn = builder.into_command();
        let entity = spawn.entity;
        self.world
            .spawn_now(spawn, self.observer.as_ref(), &mut self.scheduler);
        entity
    }

    /// Destroys an entity and its subtree right away.
    ///
    /// Returns `false` if the entity is not live.
    pub fn despawn_now(&mut self, entity: EntityId) -> bool {
        let mut routing = PendingRemovals {
            scheduler: &mut self.scheduler,
            notified: &self.notified,
        };
        let stats = self
            .world
            .despawn_now(entity, &[], self.observer.as_ref(), &mut routing);
        stats.entities_removed > 0
    }

    /// Flushes the command buffer, skipping removal callbacks that
    /// [`destroy`](Self::destroy) already delivered.
    fn apply_commands(&mut self) -> FlushStats {
        let mut routing = PendingRemovals {
            scheduler: &mut self.scheduler,
            notified: &self.notified,
        };
        let stats = self.world.flush(self.observer.as_ref(), &mut routing);
        self.notified.clear();
        stats
    }

    fn add_system(&mut self, mut system: Box<dyn System>, filter: Option<SystemFilter>) -> EcsResult<()> {
        if let Some(filter) = &filter {
            if let Err(err) = filter.validate(system.name(), self.world.registered_components()) {
                tracing::error!(system = system.name(), %err, "system registration rejected");
                return Err(err);
            }
        }
        if let Err(err) = system.init(&self.world) {
            tracing::error!(system = system.name(), %err, "system init failed");
            return Err(err);
        }
        tracing::debug!(system = system.name(), priority = system.priority(), "system registered");
        self.scheduler.push(system, filter);
        Ok(())
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("world", &self.world)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .field("pending_removals", &self.notified.len())
            .finish_non_exhaustive()
    }
}

/// Routes flush notifications to the scheduler, minus removals systems
/// have already seen.
struct PendingRemovals<'a> {
    scheduler: &'a mut SystemScheduler,
    notified: &'a HashSet<EntityId>,
}

impl EntityRouting for PendingRemovals<'_> {
    fn entity_removing(&mut self, entity: EntityId) {
        if !self.notified.contains(&entity) {
            self.scheduler.entity_removing(entity);
        }
    }

    fn entity_added(&mut self, entity: EntityId, mask: Tag) {
        self.scheduler.entity_added(entity, mask);
    }
}

/// Returns the world to `Idle` when dropped, even if a system unwinds.
struct PhaseGuard {
    world: Arc<World>,
}

impl PhaseGuard {
    fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    fn set(&self, phase: TickPhase) {
        self.world.set_phase(phase);
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.world.set_phase(TickPhase::Idle);
    }
}
