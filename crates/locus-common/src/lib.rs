pub mod bounds;
pub mod dump;
pub mod error;
pub mod error_mapping;
pub mod formatter;
pub mod protocol;
pub mod tree;

pub use bounds::Bounds;
pub use error::{ErrorKind, MatchError, StrategyAttempt};
pub use protocol::{FieldMatchMode, MatchCriteria, Strategy};
pub use tree::{NodeId, UiNode, UiTree};
