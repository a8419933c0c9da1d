//! # Ensemble Planner
//!
//! Turns a free-text user request into an ordered plugin-function execution
//! plan in two stages: plugin selection over the available-plugin summaries,
//! then function planning over the selected plugins' catalogs.
//!
//! Both stages run through the completion capability: an ordered
//! multi-provider fallback chain with a bounded one-shot repair round-trip
//! for structurally invalid output. Malformed output collapses to "no plan",
//! never a crash.

pub mod completion;
pub mod planner;
pub mod prompt;
pub mod router;

pub use completion::{
    build_client, CompletionClient, CompletionError, CompletionManager, CompletionRequest,
    ProviderStatus,
};
pub use planner::TaskPlanner;
pub use router::{PluginRouter, PluginSummary};
