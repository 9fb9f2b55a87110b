use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    OrderNotFound(Uuid),
    DuplicateOrder(Uuid),
    StateTransitionError(String),
    PluginError(String),
    AuthorizationError(String),
    RemoteDispatchError(String),
    PersistenceError(String),
    ConfigurationError(String),
    ShutdownError(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::OrderNotFound(id) => write!(f, "Order not found: {id}"),
            BrokerError::DuplicateOrder(id) => write!(f, "Order already exists: {id}"),
            BrokerError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            BrokerError::PluginError(msg) => write!(f, "Cloud plugin error: {msg}"),
            BrokerError::AuthorizationError(msg) => write!(f, "Authorization error: {msg}"),
            BrokerError::RemoteDispatchError(msg) => write!(f, "Remote dispatch error: {msg}"),
            BrokerError::PersistenceError(msg) => write!(f, "Persistence error: {msg}"),
            BrokerError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            BrokerError::ShutdownError(msg) => write!(f, "Shutdown error: {msg}"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<crate::state_machine::StateMachineError> for BrokerError {
    fn from(err: crate::state_machine::StateMachineError) -> Self {
        match err {
            crate::state_machine::StateMachineError::OrderNotFound(id) => {
                BrokerError::OrderNotFound(id)
            }
            other => BrokerError::StateTransitionError(other.to_string()),
        }
    }
}

impl From<crate::plugins::PluginError> for BrokerError {
    fn from(err: crate::plugins::PluginError) -> Self {
        BrokerError::PluginError(err.to_string())
    }
}

impl From<crate::plugins::AuthorizationError> for BrokerError {
    fn from(err: crate::plugins::AuthorizationError) -> Self {
        BrokerError::AuthorizationError(err.to_string())
    }
}

impl From<crate::plugins::RemoteDispatchError> for BrokerError {
    fn from(err: crate::plugins::RemoteDispatchError) -> Self {
        BrokerError::RemoteDispatchError(err.to_string())
    }
}

impl From<crate::persistence::PersistenceError> for BrokerError {
    fn from(err: crate::persistence::PersistenceError) -> Self {
        BrokerError::PersistenceError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
