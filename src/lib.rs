#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Broker Core Rust
//!
//! Core of a multi-provider cloud resource broker: accepts abstract resource
//! requests (compute, network, volume, attachment, public IP) from
//! federation users and fulfills them against local or remote cloud
//! providers, tracking each request through an asynchronous provisioning
//! lifecycle.
//!
//! ## Architecture
//!
//! Every accepted request becomes an [`Order`](models::Order) owned by the
//! [`OrderStore`](store::OrderStore), which pairs an O(1) id index with one
//! FIFO queue per lifecycle state. The
//! [`TransitionGuard`](state_machine::TransitionGuard) is the only legal
//! path for changing an order's state: it serializes concurrent attempts
//! per order, validates the canonical transition table, moves the order
//! between queues atomically and notifies persistence. Five independent
//! [`processors`] drive the lifecycle, one polling worker per state:
//!
//! ```text
//! OPEN -> SPAWNING -> FULFILLED
//!   \        |  \        |
//!    \       |   FAILED  |
//!     \      |      \    v
//!      `----- ------ -> CLOSED   (UNABLE_TO_CHECK_STATUS recovers to
//!                                 FULFILLED/SPAWNING or exits to CLOSED)
//! ```
//!
//! No order is processed twice concurrently, and no order is lost across a
//! process restart: the [`RecoveryLoader`](persistence::RecoveryLoader)
//! rebuilds the store from the backing store before any processor starts.
//!
//! ## Module Organization
//!
//! - [`models`] - The order record and resource-type parameters
//! - [`store`] - Active orders index and per-state queues
//! - [`state_machine`] - Lifecycle states, transition table and guard
//! - [`processors`] - The five per-state polling workers
//! - [`plugins`] - Cloud, authorization and remote-dispatch trait seams
//! - [`persistence`] - Backing store contract and recovery
//! - [`broker`] - The dependency-injected composition root
//! - [`config`] - Tunable intervals and retry budgets
//! - [`error`] - Structured error handling
//! - [`events`] - Lifecycle transition broadcasts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use broker_core::broker::{BrokerCore, CreateOrderRequest};
//! use broker_core::config::BrokerConfig;
//! use broker_core::models::{FederationUser, ResourceParameters};
//! use broker_core::persistence::InMemoryPersistence;
//! use broker_core::plugins::{AllowAllAuthorization, EmulatedCloudPlugin, NoRemoteDispatch};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut broker = BrokerCore::new(
//!     BrokerConfig::from_env()?,
//!     Arc::new(EmulatedCloudPlugin::new()),
//!     Arc::new(AllowAllAuthorization),
//!     Arc::new(NoRemoteDispatch),
//!     Arc::new(InMemoryPersistence::new()),
//! );
//! broker.init().await?;
//!
//! let order_id = broker
//!     .create_order(CreateOrderRequest {
//!         requester: FederationUser {
//!             id: "alice".into(),
//!             identity_provider: "idp.example.org".into(),
//!         },
//!         target_provider: None,
//!         cloud_name: "emulated".into(),
//!         parameters: ResourceParameters::Compute {
//!             vcpu: 2,
//!             ram_mb: 2048,
//!             disk_gb: 20,
//!             image_id: "ubuntu-24.04".into(),
//!             public_key: None,
//!             user_data: None,
//!         },
//!     })
//!     .await?;
//! println!("order {order_id} accepted");
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod plugins;
pub mod processors;
pub mod state_machine;
pub mod store;

pub use broker::{BrokerCore, CreateOrderRequest};
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use models::{Order, OrderSnapshot, ResourceType};
pub use state_machine::OrderState;
