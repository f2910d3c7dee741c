//! Reconciliation Pass
//!
//! One sweep over a map's cache that applies every outstanding action to the
//! kernel map. The cache lock is held for the whole sweep.

use log::{debug, trace};
use tokio::time::Instant;

use crate::entry::DesiredAction;
use crate::kernel::KernelMap;
use crate::state::{MapState, PassOutcome};

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Inserts applied
    pub written: usize,
    /// Deletes applied
    pub deleted: usize,
    /// Operations that failed in this pass
    pub failed: u32,
    /// Counter after the pass
    pub error_count: u32,
    pub outcome: PassOutcome,
    /// When the pass acquired the cache
    pub started: Instant,
}

/// Apply outstanding actions of `state` to `map`.
///
/// Successful inserts become [`DesiredAction::Ok`]; successful deletes leave
/// the cache. Failed operations keep their action and add one to the error
/// counter each.
pub fn run_pass(state: &MapState, map: &dyn KernelMap, max_sync_errors: u32) -> PassReport {
    let mut cache = state.lock_cache();
    let started = Instant::now();
    state.begin_pass();

    let mut written = 0;
    let mut deleted = 0;
    let mut failed = 0u32;

    cache.retain(|key, entry| match entry.action {
        DesiredAction::Ok => true,
        DesiredAction::Insert => {
            entry.may_exist = true;
            let value = entry.value.as_deref().unwrap_or(&[]);
            match map.update(key, value) {
                Ok(()) => {
                    trace!("{}: wrote {}", state.name(), HexKey(key));
                    entry.action = DesiredAction::Ok;
                    written += 1;
                }
                Err(err) => {
                    debug!("{}: update {} failed: {err}", state.name(), HexKey(key));
                    failed = failed.saturating_add(1);
                }
            }
            true
        }
        DesiredAction::Delete => match map.delete(key) {
            Ok(()) => {
                trace!("{}: deleted {}", state.name(), HexKey(key));
                deleted += 1;
                false
            }
            Err(err) => {
                debug!("{}: delete {} failed: {err}", state.name(), HexKey(key));
                failed = failed.saturating_add(1);
                true
            }
        },
    });

    let outcome = state.finish_pass(failed, max_sync_errors);
    let error_count = state.error_count();
    drop(cache);

    debug!(
        "{}: pass done, {written} written, {deleted} deleted, {failed} failed ({outcome:?})",
        state.name()
    );

    PassReport {
        written,
        deleted,
        failed,
        error_count,
        outcome,
        started,
    }
}

struct HexKey<'a>(&'a [u8]);

impl std::fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
