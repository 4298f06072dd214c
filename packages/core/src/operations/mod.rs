//! Operations on top of the maintainer
//!
//! - `OrderSpecParser` turns a drag-and-drop submission into maintainer calls
//! - `ConflictRetry` re-runs an operation that lost a write-lock race

pub mod order_parser;
pub mod retry;

pub use order_parser::{OrderPlan, OrderSpecParser, PlanStep, RawOrderEntry};
pub use retry::ConflictRetry;
