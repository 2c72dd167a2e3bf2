//! Testing infrastructure for correctness verification
//!
//! Tests record indexing runs and searches into an [`EventLog`] and then
//! check the history against invariants.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sourcedex::testing::prelude::*;
//!
//! let log = EventLog::new();
//! let op = log.record_invoke(OperationType::IndexRun { project, tree: tree_hashes(root)? });
//! let report = scheduler.index_project(&index, root, &cancel)?;
//! log.record_return(op, OperationResult::Indexed {
//!     generation_before,
//!     generation: index.generation(),
//!     documents: generation_documents(&index.snapshot()),
//! });
//!
//! let violations = check_all_invariants(&log, &default_invariants());
//! assert!(violations.is_empty());
//! ```
//!
//! # Invariants
//!
//! - **IndexMirrorsTree**: a completed run publishes exactly the tree's files
//! - **GenerationsNeverRegress**: observed generations only move forward
//! - **IdempotentReindex**: an unchanged tree publishes nothing
//! - **SearchWithinGeneration**: hits come from the pinned generation
//! - **DeterministicSearch**: equal query and generation rank equally

pub mod events;
pub mod history;
pub mod invariants;

pub use events::{
    generation_documents, tree_hashes, Event, OperationId, OperationResult, OperationType,
    PathHashes, Timestamp,
};
pub use history::EventLog;
pub use invariants::{
    check_all_invariants, default_invariants, DeterministicSearch, GenerationsNeverRegress,
    IdempotentReindex, IndexMirrorsTree, Invariant, SearchWithinGeneration, Violation,
};

/// Prelude for easy imports
pub mod prelude {
    pub use super::events::*;
    pub use super::history::EventLog;
    pub use super::invariants::{check_all_invariants, default_invariants, Invariant, Violation};
}
