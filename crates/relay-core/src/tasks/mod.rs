//! Asynchronous artifact tasks: submit once, poll until terminal

pub mod backend;
pub mod poller;
pub mod prediction;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::TaskBackend;
pub use poller::{AsyncTaskPoller, PollerConfig};
pub use prediction::PredictionBackend;
pub use protocol::{AsyncTask, PollReport, TaskStatus};
