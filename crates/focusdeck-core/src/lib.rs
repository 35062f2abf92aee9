pub mod config;
pub mod integration;
pub mod orchestrator;
pub mod process;

mod error;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use orchestrator::{AppManager, Session, SessionItem, TaskState};
pub use process::{ProcessController, ProcessTable, StopOutcome, SystemProcessTable};
