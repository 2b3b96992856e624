//! Hana3D asset pipeline: downloads asset files on worker threads, appends
//! them to the open document one tick at a time, and runs thumbnail renderers
//! as monitored subprocesses.
//!
//! The host application owns the main thread. It builds an [`Orchestrator`]
//! around its [`host::SceneHost`] implementation and calls the tick methods
//! from its timer facility, or lets [`scheduler::run`] drive them.

pub mod append;
pub mod asset;
pub mod config;
pub mod downloads;
mod error;
pub mod host;
pub mod log;
pub mod orchestrator;
pub mod process;
pub mod scheduler;

pub use error::Error;
pub use orchestrator::{Orchestrator, StartOutcome};
