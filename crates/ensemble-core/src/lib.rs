//! # Ensemble Core
//!
//! Core abstractions and deterministic logic for the Ensemble runtime.
//!
//! This crate contains:
//! - Task / TaskStep / status state machine definitions
//! - Planner output types (plugin selection, execution plan, plan result)
//! - Plugin registration model (manifest, services, function catalog)
//! - Task query / paging types
//! - The `TaskStore` persistence trait
//!
//! This crate does NOT care about:
//! - How plugins are hosted or invoked
//! - Which completion provider produced a plan
//! - Which database backs the store
//! - How results are displayed

pub mod store;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::store::{StoreError, TaskStore};
    pub use crate::types::{
        ExecutionPlan, FunctionDescriptor, LoadStatus, PlanParseError, PlanResult, PluginFunctions,
        PluginManifest, PluginRegistration, PluginSelection, PluginService, SelectedFunction,
        SelectedPlugin, SortField, SortOrder, SortSpec, StepExecutionResult, StepPatch, Task,
        TaskId, TaskPage, TaskPatch, TaskQuery, TaskStatus, TaskStep,
    };
}

// Re-export key types at crate root
pub use store::{StoreError, TaskStore};
pub use types::{
    ExecutionPlan, PlanParseError, PlanResult, PluginRegistration, Task, TaskId, TaskStatus,
    TaskStep,
};
