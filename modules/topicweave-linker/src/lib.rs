pub mod aggregator;
pub mod coordinator;
pub mod dedup;
pub mod deps;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use aggregator::{Aggregation, CandidateAggregator, ProviderWarning};
pub use coordinator::{LinkCoordinator, LinkFailure, LinkOutcome};
pub use deps::LinkerDeps;
pub use orchestrator::{BatchOrchestrator, BatchPhase, BatchProgress, BatchRun, CandidateStatus};
pub use reconciler::{LinkedMirror, RefreshStatus, StateReconciler};
pub use report::BatchReport;
pub use session::{SuggestionFeed, SuggestionSession};
