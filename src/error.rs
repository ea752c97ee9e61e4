//! Error types for the masque engine.

use thiserror::Error;

use crate::format::Party;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a format.
#[derive(Error, Debug)]
pub enum Error {
    /// An action was invoked with fewer arguments than it requires.
    ///
    /// Raised before any connection I/O for the offending action.
    #[error("not enough arguments")]
    NotEnoughArguments,

    /// An action argument's dynamic type does not match the expected type
    /// at that position.
    #[error("invalid argument type")]
    InvalidArgumentType,

    /// Transport I/O error, passed through verbatim.
    ///
    /// Timeout-classified errors are absorbed by the canonical send/receive
    /// retry loops and never reach the caller of `Fsm::run`.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// A non-terminal state has no outgoing transition for the active party.
    #[error("no transition out of state {state:?} for party {party}")]
    NoTransition {
        /// State the session was stuck in.
        state: String,
        /// Party the session is running as.
        party: Party,
    },

    /// A transition references an action name missing from the registry.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Malformed format table or invalid action parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// A receive action read bytes that differ from the expected literal.
    #[error("unexpected payload: expected {expected:?}")]
    UnexpectedPayload {
        /// Literal the format said the peer would send.
        expected: String,
    },

    /// The session's cancellation token fired during a blocking action.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Network(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        )
    }

    /// Check if this error is recoverable inside a retry loop.
    ///
    /// Only timeouts qualify: a slow transport is live, everything else is
    /// permanent and must abort the transition.
    pub fn is_recoverable(&self) -> bool {
        self.is_timeout()
    }

    /// Check if this error indicates a broken format table rather than a
    /// runtime failure.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::NoTransition { .. } | Error::UnknownAction(_) | Error::Config(_)
        )
    }
}
