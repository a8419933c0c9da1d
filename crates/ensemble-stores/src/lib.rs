//! # Ensemble Stores
//!
//! [`TaskStore`](ensemble_core::store::TaskStore) implementations:
//! - [`InMemoryTaskStore`] for development and tests
//! - [`SqliteTaskStore`] for durable single-node deployments
//!
//! Both uphold the same contract: atomic task+steps creation, load-apply-save
//! patches, and `total` computed under the query's filter predicate.

mod memory;
mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;
