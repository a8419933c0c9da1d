//! # Ensemble Tasks
//!
//! The task side of the runtime: materializing plans into persisted tasks
//! and steps, executing steps against the plugin runtime, and the periodic
//! scheduler pass that claims pending tasks and drives them to a terminal
//! status.

pub mod executor;
pub mod scheduler;
pub mod service;

pub use executor::TaskExecutor;
pub use scheduler::TaskScheduler;
pub use service::{TaskCreation, TaskDetail, TaskService};
