//! Sync state machine and its observation API.

use carelog_protocol::Timestamp;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// The observable state of a sync run.
///
/// One run moves `NotStarted → Started → InProgress* → terminal`, where the
/// terminal state is `Finished`, `Failed` or `Glitch`. The variant is the
/// serialized discriminant; state is never reconstructed from a type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum SyncState {
    /// No sync run has been started yet.
    NotStarted,
    /// A run was invoked; emitted before any network I/O.
    Started,
    /// Progress after a completed batch or page, with cumulative counters.
    InProgress {
        /// Entries committed or records applied so far.
        completed: u64,
        /// Known total for the run so far.
        total: u64,
    },
    /// The run completed with zero unresolved failures.
    Finished {
        /// When the run finished.
        at: Timestamp,
    },
    /// A non-recoverable error aborted the run.
    Failed {
        /// Description of the fatal error.
        error: String,
        /// When the run failed.
        at: Timestamp,
    },
    /// The run completed, but individual entries or pages failed.
    Glitch {
        /// Descriptions of the recoverable failures.
        recoverable: Vec<String>,
    },
}

impl SyncState {
    /// Returns true for `Finished`, `Failed` and `Glitch`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Finished { .. } | SyncState::Failed { .. } | SyncState::Glitch { .. }
        )
    }

    /// Returns true while a run is underway.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Started | SyncState::InProgress { .. })
    }
}

/// Publishes state transitions to any number of observers.
///
/// Observers see transitions in emission order with no drops; there is no
/// replay, so a late subscriber starts from the next transition.
pub struct StateNotifier {
    current: RwLock<SyncState>,
    observers: Mutex<Vec<Sender<SyncState>>>,
}

impl StateNotifier {
    /// Creates a notifier in the `NotStarted` state.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(SyncState::NotStarted),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the most recently emitted state.
    pub fn current(&self) -> SyncState {
        self.current.read().clone()
    }

    /// Registers an observer and returns its receiving end.
    pub fn subscribe(&self) -> Receiver<SyncState> {
        let (tx, rx) = mpsc::channel();
        self.observers.lock().push(tx);
        rx
    }

    /// Publishes a transition to every live observer.
    pub(crate) fn emit(&self, state: SyncState) {
        debug!(state = ?state, "sync state transition");
        *self.current.write() = state.clone();
        self.observers
            .lock()
            .retain(|tx| tx.send(state.clone()).is_ok());
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}
