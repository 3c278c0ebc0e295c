use std::time::Duration;

use ringwatch_hashring::HashRingError;
use thiserror::Error;

use crate::Lifecycle;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RingError {
    #[error("Ring manager has not been initialized!")]
    /// The operation was called on a manager handle which was never created.
    NotInitialized,

    #[error("Ring manager is not running, current state: {0}")]
    /// The manager has either not been started yet or has already been stopped.
    NotRunning(Lifecycle),

    #[error("Ring manager has already been started.")]
    AlreadyStarted,

    #[error("Ring manager must be started from within a tokio runtime.")]
    NoRuntime,

    #[error("No nodes in ring!")]
    /// A lookup was made while the ring had no members.
    EmptyRing,

    #[error("Ring manager did not respond within {0:?}")]
    /// The worker did not answer a ping within the liveness window.
    Timeout(Duration),
}

impl From<HashRingError> for RingError {
    fn from(error: HashRingError) -> Self {
        match error {
            HashRingError::EmptyRing => Self::EmptyRing,
        }
    }
}
