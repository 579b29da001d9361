//! Emulator modules.
//!
//! Modules give the core access to machinery that lives outside the
//! interrupt subsystem, such as boot ROM emulation or a compiled-block
//! cache. They do not perform any scheduling themselves.

use crate::system::System;

/// A snapshot operation requested by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotJob {
    Load,
    Save,
}

/// Trait for boot ROM emulation.
pub trait BootromModule: Send {
    /// Emulates the effect of running the boot ROM on the system.
    fn execute(&mut self, sys: &mut System);
}

/// Trait for compiled-block caches used by recompiling cores.
pub trait CodeCacheModule: Send {
    /// Discards every compiled block.
    fn discard_all(&mut self);
    /// Prepares the cache for compilation after a discard.
    fn reinitialize(&mut self);
    /// Marks every compiled block as stale without discarding storage.
    fn invalidate_all(&mut self);
}

/// Trait for snapshot persistence.
pub trait SnapshotModule: Send {
    /// The snapshot operation waiting to be performed, if any.
    fn pending(&self) -> Option<SnapshotJob>;
    /// Restores system state, including the event queue, from the pending
    /// snapshot.
    fn load(&mut self, sys: &mut System);
    /// Captures system state into the pending snapshot.
    fn save(&mut self, sys: &mut System);
}

/// An implementation of [`BootromModule`] which does nothing.
pub struct NopBootromModule;

impl BootromModule for NopBootromModule {
    fn execute(&mut self, _: &mut System) {}
}

/// An implementation of [`CodeCacheModule`] which does nothing.
pub struct NopCodeCacheModule;

impl CodeCacheModule for NopCodeCacheModule {
    fn discard_all(&mut self) {}
    fn reinitialize(&mut self) {}
    fn invalidate_all(&mut self) {}
}

/// An implementation of [`SnapshotModule`] which never has pending work.
pub struct NopSnapshotModule;

impl SnapshotModule for NopSnapshotModule {
    fn pending(&self) -> Option<SnapshotJob> {
        None
    }

    fn load(&mut self, _: &mut System) {}
    fn save(&mut self, _: &mut System) {}
}

/// Modules of the emulator core.
pub struct Modules {
    pub bootrom: Box<dyn BootromModule>,
    pub code: Box<dyn CodeCacheModule>,
    pub snapshots: Box<dyn SnapshotModule>,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            bootrom: Box::new(NopBootromModule),
            code: Box::new(NopCodeCacheModule),
            snapshots: Box::new(NopSnapshotModule),
        }
    }
}
