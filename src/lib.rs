#![warn(
    clippy::all,
    clippy::perf,
    clippy::style,
    clippy::correctness,
    clippy::suspicious
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

//! A SASL client negotiation core for database wire-protocol clients.
//!
//! - [`Credential`]: who authenticates, with which mechanism.
//! - [`Registry`]: resolves a mechanism name to a fresh [`Stepper`].
//! - [`Stepper`]: one mechanism's challenge/response state machine.
//! - [`Negotiator`] / [`authenticate`]: drives a stepper over a
//!   [`SaslTransport`] until the server accepts or rejects.
//!
//! # Feature Flags
//!
//! - `scram` (default): SCRAM-SHA-1 and SCRAM-SHA-256.
//! - `gssapi`: the GSSAPI stepper, backed by a caller-supplied
//!   `GssapiProvider`.

pub mod config;
pub mod credential;
pub mod driver;
pub mod error;
pub mod external;
#[cfg(feature = "gssapi")]
pub mod gssapi;
pub mod mechanism;
pub mod plain;
pub mod registry;
pub mod sasl;
#[cfg(feature = "scram")]
pub mod scram;
pub mod transport;

pub use config::NegotiationConfig;
pub use credential::Credential;
pub use driver::{authenticate, Negotiator};
pub use error::{Result, SaslError};
pub use mechanism::Mechanism;
pub use registry::{Registry, StepperFactory};
pub use sasl::{Stepper, StepperState};
pub use transport::{ClientFrame, SaslTransport, ServerReply, TransportError};
