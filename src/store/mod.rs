//! Process-wide registry of active orders: an O(1) id index plus one FIFO
//! queue per lifecycle state.

pub mod order_store;

pub use order_store::{OrderStore, SharedOrder};
