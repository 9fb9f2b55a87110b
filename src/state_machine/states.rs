use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states.
///
/// The transition table in [`OrderState::can_transition_to`] is the single
/// canonical definition of the lifecycle; the
/// [`TransitionGuard`](super::TransitionGuard) is its only consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Initial state: accepted but not yet dispatched to a cloud.
    Open,
    /// A cloud resource has been requested but is not yet confirmed ready.
    Spawning,
    /// Steady state: the resource is ready and in active use.
    Fulfilled,
    /// The cloud accepted the request but the instance entered an
    /// unrecoverable state.
    FailedAfterSuccessfulRequest,
    /// Status checks are failing; the order is being rechecked before either
    /// recovering or being closed.
    UnableToCheckStatus,
    /// Terminal state: the order is being (or has been) cleaned up.
    Closed,
}

impl OrderState {
    pub const ALL: [OrderState; 6] = [
        Self::Open,
        Self::Spawning,
        Self::Fulfilled,
        Self::FailedAfterSuccessfulRequest,
        Self::UnableToCheckStatus,
        Self::Closed,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position of this state in [`Self::ALL`]; indexes the per-state queues.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Spawning => 1,
            Self::Fulfilled => 2,
            Self::FailedAfterSuccessfulRequest => 3,
            Self::UnableToCheckStatus => 4,
            Self::Closed => 5,
        }
    }

    /// The directed transition table. Any pair not listed here is an illegal
    /// transition and must be rejected by the guard.
    pub fn can_transition_to(self, target: OrderState) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Spawning)
                | (Self::Open, Self::Closed)
                | (Self::Spawning, Self::Fulfilled)
                | (Self::Spawning, Self::UnableToCheckStatus)
                | (Self::Spawning, Self::FailedAfterSuccessfulRequest)
                | (Self::Spawning, Self::Closed)
                | (Self::Fulfilled, Self::UnableToCheckStatus)
                | (Self::Fulfilled, Self::Closed)
                | (Self::UnableToCheckStatus, Self::Fulfilled)
                | (Self::UnableToCheckStatus, Self::Spawning)
                | (Self::UnableToCheckStatus, Self::Closed)
                | (Self::FailedAfterSuccessfulRequest, Self::Closed)
        )
    }

    /// Terminal states accept no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// States in which a provider-side instance exists (or existed) and the
    /// order carries an instance id.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Spawning | Self::Fulfilled | Self::FailedAfterSuccessfulRequest
        )
    }
}

impl Default for OrderState {
    fn default() -> Self {
        Self::Open
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Spawning => write!(f, "spawning"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::FailedAfterSuccessfulRequest => write!(f, "failed_after_successful_request"),
            Self::UnableToCheckStatus => write!(f, "unable_to_check_status"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "spawning" => Ok(Self::Spawning),
            "fulfilled" => Ok(Self::Fulfilled),
            "failed_after_successful_request" => Ok(Self::FailedAfterSuccessfulRequest),
            "unable_to_check_status" => Ok(Self::UnableToCheckStatus),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid order state: {s}")),
        }
    }
}
