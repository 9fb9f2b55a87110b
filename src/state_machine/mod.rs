// State machine module for the order lifecycle
//
// Defines the canonical lifecycle states and transition table, and the
// transition guard that is the sole legal path for changing an order's state.

pub mod errors;
pub mod states;
pub mod transition_guard;

pub use errors::{StateMachineError, StateMachineResult};
pub use states::OrderState;
pub use transition_guard::TransitionGuard;
