//! Per-Map Controller
//!
//! Each registered map gets one task that owns its timers. The task sleeps
//! until woken, waits out the settle delay, runs a pass on the blocking pool
//! and either goes back to sleep, re-arms the retry timer, or exits when the
//! map fails.
//!
//! | Event                 | Effect                                            |
//! |-----------------------|---------------------------------------------------|
//! | wake while idle       | pass at `now + settle_delay`                      |
//! | wake while scheduled  | absorbed                                          |
//! | pass with failures    | pass at `start of previous pass + min_interval`   |
//! | pass over the ceiling | task exits                                        |
//! | sender dropped        | phase `Closed`, task exits before the next pass   |

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::SyncConfig;
use crate::kernel::KernelMap;
use crate::pass::run_pass;
use crate::state::{MapState, PassOutcome};

/// Wakes a controller. Cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct Waker {
    tx: mpsc::Sender<()>,
}

impl Waker {
    pub(crate) fn wake(&self) {
        match self.tx.try_send(()) {
            // A full channel already holds a wake.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("Wake for a stopped controller dropped"),
        }
    }
}

/// Owner side of a running controller task.
pub(crate) struct ControllerHandle {
    waker: Waker,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    pub(crate) fn spawn(state: Arc<MapState>, map: Arc<dyn KernelMap>, config: SyncConfig) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run(state, map, config, rx));
        Self {
            waker: Waker { tx },
            task,
        }
    }

    pub(crate) fn waker(&self) -> Waker {
        self.waker.clone()
    }

    /// Stop the task and wait for it, including any pass in flight.
    pub(crate) async fn shutdown(self) {
        drop(self.waker);
        if let Err(err) = self.task.await {
            if err.is_panic() {
                error!("Map controller panicked: {err}");
            }
        }
    }
}

async fn run(
    state: Arc<MapState>,
    map: Arc<dyn KernelMap>,
    config: SyncConfig,
    mut wake: mpsc::Receiver<()>,
) {
    'idle: while wake.recv().await.is_some() {
        let mut deadline = Instant::now() + config.settle_delay;

        loop {
            if !sleep_absorbing(deadline, &mut wake).await {
                debug!("{}: scheduled pass cancelled", state.name());
                state.mark_closed();
                return;
            }

            let pass_state = Arc::clone(&state);
            let pass_map = Arc::clone(&map);
            let max_sync_errors = config.max_sync_errors;
            let report = tokio::task::spawn_blocking(move || {
                run_pass(&pass_state, pass_map.as_ref(), max_sync_errors)
            })
            .await;

            let report = match report {
                Ok(report) => report,
                Err(err) => {
                    error!("{}: reconciliation pass aborted: {err}", state.name());
                    state.mark_failed();
                    return;
                }
            };

            match report.outcome {
                PassOutcome::Clean => continue 'idle,
                PassOutcome::Retry => {
                    warn!(
                        "{}: {} operations failed, {} errors so far, retrying",
                        state.name(),
                        report.failed,
                        report.error_count
                    );
                    deadline = report.started + config.min_interval;
                }
                PassOutcome::Failed => {
                    error!(
                        "{}: map failed after {} errors, reconciliation stopped",
                        state.name(),
                        report.error_count
                    );
                    return;
                }
            }
        }
    }

    state.mark_closed();
    debug!("{}: controller stopped", state.name());
}

/// Sleep until `deadline`, swallowing wakes. Returns `false` if the sender
/// side went away first.
async fn sleep_absorbing(deadline: Instant, wake: &mut mpsc::Receiver<()>) -> bool {
    let sleep = time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            msg = wake.recv() => {
                if msg.is_none() {
                    return false;
                }
            }
            () = &mut sleep => return true,
        }
    }
}
