//! Per-Map State
//!
//! A [`MapState`] is the shared aggregate behind one registered map: the
//! resolved definition, the desired-entry cache, the consecutive error counter
//! and the published [`SyncPhase`].
//!
//! # Phases
//!
//! ```text
//!          set_desired          settle delay
//!   Idle ─────────────► Scheduled ─────────► Running
//!    ▲                     ▲                    │
//!    │   no failures       │  errors <= limit   │
//!    └─────────────────────┴────────────────────┤
//!                                               │ errors > limit
//!                                               ▼
//!                                             Failed
//! ```
//!
//! A map whose controller is stopped by close or re-registration ends in
//! `Closed` unless it had already failed.
//!
//! Every phase change made by a pass or by [`MapState::set_desired`] happens
//! with the cache lock held.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bpfmap_caps::{MapDef, MapKind};
use tokio::sync::watch;

use crate::entry::{DesiredAction, EntryCache};
use crate::error::{RegistryError, RegistryResult};

/// Observable controller state of one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Nothing owed to the kernel
    Idle,
    /// A pass is waiting for its timer
    Scheduled,
    /// A pass holds the cache
    Running,
    /// Error ceiling exceeded; no further passes
    Failed,
    /// Controller stopped; no further passes
    Closed,
}

impl SyncPhase {
    /// No pass pending or running.
    pub const fn is_quiescent(self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Closed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Closed => "closed",
        })
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every operation succeeded; counter cleared
    Clean,
    /// Some operations failed; another pass is due
    Retry,
    /// Error ceiling exceeded
    Failed,
}

/// Shared state of one registered map.
pub struct MapState {
    name: String,
    requested: MapDef,
    def: MapDef,
    cache: Mutex<EntryCache>,
    errors: AtomicU32,
    failed: AtomicBool,
    passes: AtomicU64,
    phase: watch::Sender<SyncPhase>,
}

impl MapState {
    /// Create state for a map opened with `def`, originally requested as
    /// `requested`.
    pub fn new(name: impl Into<String>, requested: MapDef, def: MapDef) -> Self {
        Self {
            name: name.into(),
            requested,
            def,
            cache: Mutex::new(EntryCache::new()),
            errors: AtomicU32::new(0),
            failed: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            phase: watch::channel(SyncPhase::Idle).0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition as registered, before fallback.
    pub fn requested(&self) -> &MapDef {
        &self.requested
    }

    /// Definition the kernel map was opened with.
    pub fn def(&self) -> &MapDef {
        &self.def
    }

    /// Record a desired change.
    ///
    /// Returns `true` when this call moved the map from `Idle` to `Scheduled`
    /// and the controller must be woken. A failed or closed map accepts the
    /// change but never schedules a pass.
    ///
    /// # Errors
    ///
    /// Rejects [`DesiredAction::Ok`], inserts without a value, and keys or
    /// values whose size does not match the map.
    pub fn set_desired(
        &self,
        key: &[u8],
        action: DesiredAction,
        value: Option<&[u8]>,
    ) -> RegistryResult<bool> {
        let value = match action {
            DesiredAction::Ok => return Err(RegistryError::UnsupportedAction(action)),
            DesiredAction::Insert => {
                Some(value.ok_or_else(|| RegistryError::MissingValue(self.name.clone()))?)
            }
            DesiredAction::Delete => None,
        };

        if key.len() != self.def.key_size as usize {
            return Err(RegistryError::KeySize {
                map: self.name.clone(),
                expected: self.def.key_size,
                actual: key.len(),
            });
        }
        if let Some(value) = value {
            if value.len() != self.def.value_size as usize {
                return Err(RegistryError::ValueSize {
                    map: self.name.clone(),
                    expected: self.def.value_size,
                    actual: value.len(),
                });
            }
        }

        let mut cache = self.lock_cache();
        let owed = match value {
            Some(value) => {
                cache.insert(key, value);
                true
            }
            None => !cache.delete(key),
        };

        Ok(owed && self.request_pass())
    }

    /// Diagnostic view.
    pub fn snapshot(&self) -> MapSnapshot {
        let pending = self.lock_cache().pending();
        MapSnapshot {
            name: self.name.clone(),
            requested: self.requested.kind,
            kind: self.def.kind,
            errors: self.error_count(),
            failed: self.is_failed(),
            pending,
            passes: self.passes.load(Ordering::Acquire),
            phase: self.phase(),
        }
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Consecutive failed operations since the last clean pass.
    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Lock the entry cache.
    ///
    /// A pass that panicked leaves the lock poisoned; the map is marked failed
    /// in that case, so the cache contents are still safe to inspect.
    pub fn lock_cache(&self) -> MutexGuard<'_, EntryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `Idle` to `Scheduled`. Caller holds the cache lock.
    fn request_pass(&self) -> bool {
        if self.is_failed() {
            return false;
        }
        self.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Idle {
                *phase = SyncPhase::Scheduled;
                true
            } else {
                false
            }
        })
    }

    /// Caller holds the cache lock.
    pub(crate) fn begin_pass(&self) {
        self.phase.send_replace(SyncPhase::Running);
    }

    /// Account for a finished pass. Caller holds the cache lock.
    pub(crate) fn finish_pass(&self, failures: u32, max_sync_errors: u32) -> PassOutcome {
        self.passes.fetch_add(1, Ordering::AcqRel);

        if failures == 0 {
            self.errors.store(0, Ordering::Release);
            self.phase.send_replace(SyncPhase::Idle);
            return PassOutcome::Clean;
        }

        let total = self.error_count().saturating_add(failures);
        self.errors.store(total, Ordering::Release);

        if total > max_sync_errors {
            self.failed.store(true, Ordering::Release);
            self.phase.send_replace(SyncPhase::Failed);
            PassOutcome::Failed
        } else {
            self.phase.send_replace(SyncPhase::Scheduled);
            PassOutcome::Retry
        }
    }

    /// Publish the terminal phase of a stopped controller.
    pub(crate) fn mark_closed(&self) {
        let _cache = self.lock_cache();
        self.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Failed || *phase == SyncPhase::Closed {
                false
            } else {
                *phase = SyncPhase::Closed;
                true
            }
        });
    }

    pub(crate) fn mark_failed(&self) {
        let _cache = self.lock_cache();
        self.failed.store(true, Ordering::Release);
        self.phase.send_replace(SyncPhase::Failed);
    }
}

impl fmt::Debug for MapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapState")
            .field("name", &self.name)
            .field("def", &self.def)
            .field("errors", &self.error_count())
            .field("failed", &self.is_failed())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Coarse health of one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Ok,
    Errors(u32),
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Errors(n) => write!(f, "Errors: {n}"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Point-in-time view of one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSnapshot {
    pub name: String,
    /// Kind as registered
    pub requested: MapKind,
    /// Kind after fallback
    pub kind: MapKind,
    pub errors: u32,
    pub failed: bool,
    /// Entries with an outstanding action
    pub pending: usize,
    pub passes: u64,
    pub phase: SyncPhase,
}

impl MapSnapshot {
    pub fn status(&self) -> SyncStatus {
        if self.failed {
            SyncStatus::Failed
        } else if self.errors > 0 {
            SyncStatus::Errors(self.errors)
        } else {
            SyncStatus::Ok
        }
    }
}

impl fmt::Display for MapSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}
