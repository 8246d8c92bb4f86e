//! Error types for SASL negotiation.
//!
//! Every failure in this crate is a [`SaslError`]. The variants keep the
//! categories a connection layer needs to tell apart:
//! - local configuration problems (unknown mechanism, malformed credential)
//! - contract violations (a stepper driven past its terminal state)
//! - credentials rejected by the server or a failed cryptographic check
//! - transport failures (could not reach or talk to the server)
//! - cancellation or timeout of an in-flight negotiation

use thiserror::Error;

use crate::sasl::StepperState;

/// Error type for all SASL stepper and negotiation operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaslError {
    /// The requested mechanism is not known or not compiled in.
    #[error("sasl: unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    /// The credential is structurally unusable for its mechanism.
    #[error("sasl: invalid credential: {0}")]
    InvalidCredential(String),

    /// A stepper was stepped after reaching a terminal state.
    ///
    /// This is a bug in the caller, not an authentication outcome.
    #[error("sasl: {mechanism} stepper stepped in terminal state {state}")]
    InvalidState {
        mechanism: &'static str,
        state: StepperState,
    },

    /// The server rejected the credentials, or a server proof did not verify.
    #[error("sasl: authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The underlying transport failed to send or receive.
    ///
    /// Note: transport errors are usually `std::io::Error`, which is not
    /// `Clone`, so only the message is kept.
    #[error("sasl: transport error: {0}")]
    Transport(String),

    /// The negotiation was cancelled or timed out before completing.
    #[error("sasl: negotiation cancelled: {0}")]
    Cancelled(String),
}

impl SaslError {
    pub(crate) fn auth(reason: impl Into<String>) -> Self {
        SaslError::AuthenticationFailed(reason.into())
    }

    /// Returns `true` if the server rejected the credentials.
    #[inline]
    pub fn is_auth(&self) -> bool {
        matches!(self, SaslError::AuthenticationFailed(_))
    }

    /// Returns `true` if the transport failed.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, SaslError::Transport(_))
    }

    /// Returns `true` if the error is a local programming or configuration
    /// problem that no retry will fix.
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SaslError::UnsupportedMechanism(_)
                | SaslError::InvalidCredential(_)
                | SaslError::InvalidState { .. }
        )
    }

    /// Returns `true` if retrying the whole connection may succeed.
    ///
    /// Rejected credentials are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, SaslError::Transport(_) | SaslError::Cancelled(_))
    }
}

impl From<std::io::Error> for SaslError {
    fn from(err: std::io::Error) -> Self {
        SaslError::Transport(err.to_string())
    }
}

impl From<crate::transport::TransportError> for SaslError {
    fn from(err: crate::transport::TransportError) -> Self {
        SaslError::Transport(err.0)
    }
}

/// Result type alias for SASL operations.
pub type Result<T> = std::result::Result<T, SaslError>;
