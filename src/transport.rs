//! Transport seam for SASL negotiation.
//!
//! The negotiation driver never touches sockets or wire framing. It hands
//! [`ClientFrame`]s to a [`SaslTransport`] and reads back [`ServerReply`]s;
//! how those map onto a database protocol is up to the implementation:
//!
//! - **MongoDB**: `Start` is a `saslStart` command, `Continue` is
//!   `saslContinue` carrying the conversation id; a reply with `done: true`
//!   is [`ServerReply::Done`], and `ok: 0` is [`ServerReply::Rejected`].
//! - **PostgreSQL**: `Start` is `SASLInitialResponse`, `Continue` is
//!   `SASLResponse`; `AuthenticationSASLContinue` is `Continue`,
//!   `AuthenticationSASLFinal` followed by `AuthenticationOk` is `Done`, and an
//!   `ErrorResponse` is `Rejected`.
//!
//! One transport value serves one connection. Implementations report I/O
//! failures as [`TransportError`]; the driver never retries them.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::mechanism::Mechanism;

/// A client message in a SASL conversation.
///
/// The payload is borrowed so the driver can wipe it once it has been sent;
/// a transport that buffers it must copy it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    /// Opens the conversation, naming the mechanism and carrying the initial
    /// response (possibly empty).
    Start { mechanism: Mechanism, payload: &'a [u8] },
    /// Any later client response.
    Continue { payload: &'a [u8] },
}

impl<'a> ClientFrame<'a> {
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            ClientFrame::Start { payload, .. } | ClientFrame::Continue { payload } => payload,
        }
    }
}

// Payloads can carry passwords (PLAIN), so only their length is shown.
impl fmt::Debug for ClientFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientFrame::Start { mechanism, payload } => f
                .debug_struct("Start")
                .field("mechanism", mechanism)
                .field("payload_len", &payload.len())
                .finish(),
            ClientFrame::Continue { payload } => f
                .debug_struct("Continue")
                .field("payload_len", &payload.len())
                .finish(),
        }
    }
}

/// A server message in a SASL conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// The server wants another client response.
    Continue(Bytes),
    /// The server considers the client authenticated. The payload carries any
    /// final server data (e.g. SCRAM server-final) and may be empty.
    Done(Bytes),
    /// The server rejected the authentication attempt.
    Rejected(String),
}

/// A transport-level failure: the server could not be reached or the
/// conversation could not be read or written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Duplex channel carrying one SASL conversation.
#[async_trait]
pub trait SaslTransport: Send {
    /// Sends one client frame.
    async fn send(&mut self, frame: ClientFrame<'_>) -> Result<(), TransportError>;

    /// Waits for the server's next reply.
    async fn receive(&mut self) -> Result<ServerReply, TransportError>;
}
