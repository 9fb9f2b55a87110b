//! # Order Persistence
//!
//! Backing-store contract the transition guard notifies on every durable
//! mutation, plus the recovery loader that rebuilds the in-memory store on
//! startup. Two implementations ship: an in-memory map for tests and a
//! Postgres store.

pub mod memory;
pub mod postgres;
pub mod recovery;

pub use memory::InMemoryPersistence;
pub use postgres::PgOrderPersistence;
pub use recovery::RecoveryLoader;

use crate::models::Order;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Order serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt persisted order {order_id}: {message}")]
    CorruptRecord { order_id: Uuid, message: String },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Backing store for orders.
///
/// `persist` is an upsert keyed by order id and is called on creation and on
/// every state transition; `load_by_state` feeds recovery; `delete` prunes
/// an order once the closed processor confirms provider-side cleanup, so it
/// cannot resurrect on the next restart.
#[async_trait]
pub trait OrderPersistence: Send + Sync {
    async fn persist(&self, order: &Order) -> PersistenceResult<()>;

    async fn load_by_state(&self, state: OrderState) -> PersistenceResult<Vec<Order>>;

    async fn delete(&self, order_id: Uuid) -> PersistenceResult<()>;
}
