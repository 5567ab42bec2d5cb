use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::error::{SecSuiteError, SecSuiteResult};

/// An event to track the progress of a long-running job,
/// such as a search or the generation of a rainbow table.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Overall progress of the job in percent.
    Progress(f64),
    /// Number of candidates verified so far.
    Attempts(u64),
    /// The nth batch of chains is being computed.
    Batch {
        batch_number: usize,
        batch_count: usize,
    },
}

/// A handle to a job running on a background thread.
pub struct EventHandle<T> {
    pub(crate) thread_handle: JoinHandle<SecSuiteResult<T>>,
    pub(crate) receiver: Receiver<Event>,
}

impl<T> EventHandle<T> {
    /// Returns the output of the job.
    /// Blocks until the job is finished.
    pub fn join(self) -> SecSuiteResult<T> {
        self.thread_handle
            .join()
            .map_err(|_| SecSuiteError::WorkerPanic)?
    }

    /// Blocks until an event is received.
    /// Returns `None` if the job is finished.
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }

    /// Returns true if the job is finished.
    pub fn is_finished(&self) -> bool {
        self.thread_handle.is_finished()
    }
}
