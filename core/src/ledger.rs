//! The ledger: single in-process authority for `ParkState`.
//!
//! RULE: Nothing outside this module holds a reference into the live
//! snapshot. Writers go through `mutate`, readers get a copy.
//! The lock is held for the in-memory change and the synchronous persist
//! only; callers make outbound calls after `mutate` returns.

use crate::{
    error::{ParkError, ParkResult},
    snapshot::SnapshotFile,
    state::ParkState,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

pub struct Ledger {
    state:    RwLock<ParkState>,
    snapshot: SnapshotFile,
    /// Set when a persist failed; cleared by the next successful save.
    dirty:    AtomicBool,
}

impl Ledger {
    pub fn new(initial: ParkState, snapshot: SnapshotFile) -> Self {
        Self {
            state: RwLock::new(initial),
            snapshot,
            dirty: AtomicBool::new(false),
        }
    }

    /// Load the persisted snapshot, or start from `default` when there is
    /// none. Any failure other than a missing file is returned.
    pub fn load(snapshot: SnapshotFile, default: impl FnOnce() -> ParkState) -> ParkResult<Self> {
        let initial = match snapshot.load::<ParkState>()? {
            Some(state) => {
                log::info!(
                    "Loaded park snapshot: money=${:.2} used={:.2}/{:.2} acres attractions={}",
                    state.money,
                    state.used_space,
                    state.total_space,
                    state.attractions.len()
                );
                state
            }
            None => {
                log::info!("No park snapshot found, starting fresh");
                default()
            }
        };
        Ok(Self::new(initial, snapshot))
    }

    /// A copy of the current snapshot.
    pub fn read(&self) -> ParkResult<ParkState> {
        self.view(ParkState::clone)
    }

    /// Run `f` against the snapshot under the shared lock.
    pub fn view<T>(&self, f: impl FnOnce(&ParkState) -> T) -> ParkResult<T> {
        let guard = self.state.read().map_err(|_| ParkError::LockPoisoned)?;
        Ok(f(&guard))
    }

    /// Apply `f` atomically. `f` works on a scratch copy that replaces the
    /// live snapshot only if `f` succeeds, so a rejected mutation leaves no
    /// trace. The accepted snapshot is persisted before the lock is released.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut ParkState) -> ParkResult<T>) -> ParkResult<T> {
        let mut guard = self.state.write().map_err(|_| ParkError::LockPoisoned)?;
        let mut scratch = guard.clone();
        let out = f(&mut scratch)?;
        debug_assert!(
            scratch.used_space >= 0.0
                && scratch.used_space <= scratch.total_space + scratch.space_tolerance(),
            "capacity invariant violated: used={} total={}",
            scratch.used_space,
            scratch.total_space
        );
        self.persist(&scratch);
        *guard = scratch;
        Ok(out)
    }

    /// Persist the current snapshot. Called on the save interval and at
    /// shutdown.
    pub fn save(&self) -> ParkResult<()> {
        let guard = self.state.read().map_err(|_| ParkError::LockPoisoned)?;
        self.snapshot.save(&*guard)?;
        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.path().is_some()
    }

    fn persist(&self, state: &ParkState) {
        match self.snapshot.save(state) {
            Ok(()) => self.dirty.store(false, Ordering::Relaxed),
            Err(e) => {
                log::warn!("Failed to persist park snapshot, will retry on next save: {e}");
                self.dirty.store(true, Ordering::Relaxed);
            }
        }
    }
}
