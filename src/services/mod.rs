//! Background services for jobscout.
//!
//! Long-running tasks that operate independently of the command that
//! spawned them.

pub mod progress_poller;

pub use progress_poller::{PollControl, PollHandle, ProgressPoller, SnapshotSink};
