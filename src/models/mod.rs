//! Data model for the broker: the [`Order`] record and its resource-type
//! specific request parameters.

pub mod order;

pub use order::{
    Allocation, FederationUser, NetworkAllocationMode, Order, OrderSnapshot, ResourceParameters,
    ResourceType,
};
