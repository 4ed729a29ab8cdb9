pub mod engine;
pub mod event;
pub mod filter;

pub use engine::{EventEngine, EventGenerator};
pub use event::{Event, EventField};
pub use filter::{ContentFilterElement, EventFilter, FilterOperand, FilterOperator};
