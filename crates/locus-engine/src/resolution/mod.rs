pub mod chain;
pub mod locator;
pub mod plan;
pub mod result;
pub mod runner;

pub use chain::{FallbackExecutor, SemanticRetryPolicy, narrow_to_semantic};
pub use locator::{Locator, Relocated, RelocatedBy};
pub use plan::{FallbackPlan, PlanEntry, PlanError};
pub use result::ChainOutcome;
pub use runner::{LocalStrategyRunner, StrategyRun, StrategyRunner, project};
