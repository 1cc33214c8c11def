mod debounce;
mod engine;

pub use debounce::{DebounceTicket, Debouncer, DEFAULT_DEBOUNCE};
pub use engine::{PersistOutcome, ReorderEngine, ReorderPhase};
