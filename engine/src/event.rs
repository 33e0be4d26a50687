use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use rtcrack_commons::Password;

use crate::error::EngineResult;

/// An event reported by a running engine action.
#[derive(Clone, Debug)]
pub enum Event {
    /// Progress snapshot of a table build.
    Progress {
        /// Chains present in the table, including resumed ones.
        chains_written: u64,
        /// Target chain count of the build.
        total_chains: u64,
        /// Chains generated per second across all workers.
        chains_per_sec: f64,
        /// Hash invocations per second across all workers.
        hashes_per_sec: f64,
        /// Endpoint of the most recently completed block.
        last_endpoint: Password,
    },
    /// A plaintext was recovered for a target digest.
    Found { digest: String, plaintext: String },
}

/// Handle to an engine action running on a background thread.
///
/// Events stream through [`EngineHandle::recv`] while the action runs; the
/// final result is collected with [`EngineHandle::join`].
pub struct EngineHandle<T> {
    pub(crate) handle: JoinHandle<EngineResult<T>>,
    pub(crate) receiver: Receiver<Event>,
}

impl<T> EngineHandle<T> {
    /// Blocks until an event is received.
    /// Returns `None` once the action is finished.
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }

    /// Returns the result of the action.
    /// Blocks until it is finished.
    pub fn join(self) -> EngineResult<T> {
        self.handle.join().expect("engine thread panicked")
    }
}
