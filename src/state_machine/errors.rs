//! Error types for the order state machine, using thiserror for structured
//! errors instead of stringly-typed failures.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: String,
        to: String,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
