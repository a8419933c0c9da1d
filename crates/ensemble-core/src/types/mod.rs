//! Core type definitions for Ensemble
//!
//! This module contains the fundamental types used throughout the system:
//! - TaskStatus: shared task/step state machine
//! - Task / TaskStep: persisted orchestration entities
//! - PluginSelection / ExecutionPlan / PlanResult: planner output
//! - PluginRegistration and friends: the plugin runtime model
//! - TaskQuery / TaskPage: filtered, sorted, paged task listing

mod plan;
mod plugin;
mod query;
mod status;
mod task;

pub use plan::{
    extract_json, ExecutionPlan, PlanParseError, PlanResult, PluginFunctions, PluginSelection,
    SelectedFunction, SelectedPlugin,
};
pub use plugin::{
    FunctionDescriptor, LoadStatus, ManifestAuthor, ManifestBuildSystem, ManifestLicense,
    ManifestProject, ManifestUrls, PluginManifest, PluginRegistration, PluginService,
};
pub use query::{SortField, SortOrder, SortSpec, TaskPage, TaskQuery};
pub use status::{TaskStatus, UnknownStatus};
pub use task::{StepExecutionResult, StepPatch, Task, TaskId, TaskPatch, TaskStep};
