mod executor;
mod report;
mod worker;

pub use executor::{Task, TiredExecutor};
pub use report::{WorkerReport, WorkerStats};
pub use worker::{FATIGUE_RANGE, Worker};

pub(crate) use worker::Job;
