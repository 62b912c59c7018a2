//! Selection-mode resolution over a strategy's candidates.

mod batch;
mod dedupe;
mod mode;

pub use batch::{BatchConfig, BatchSession, BatchStep, RefreshPolicy};
pub use dedupe::dedupe_by_center;
pub use mode::{resolve, Selection, SelectionContext, SelectionMode};
