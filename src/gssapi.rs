//! GSSAPI (Kerberos V5) client stepper, as described in RFC 4752.
//!
//! This crate does not talk to a KDC itself. Context establishment and
//! message protection are delegated to a [`SecurityContext`], created by a
//! [`GssapiProvider`] that the application registers at startup with
//! [`Registry::register_gssapi`](crate::registry::Registry::register_gssapi).
//!
//! The stepper drives two phases:
//! 1. context establishment: tokens pass between the security context and
//!    the server until the context reports itself established;
//! 2. security layer negotiation: the server offers layers in a wrapped
//!    4-byte message, and the client picks "no security layer" and names the
//!    authorization identity.

use std::sync::Arc;

use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;
use crate::sasl::{Stepper, StepperState};

/// Service name used when the credential leaves it empty.
pub const DEFAULT_SERVICE: &str = "mongodb";

/// Bit in the server's layer offer meaning "no security layer".
const LAYER_NONE: u8 = 0x01;

/// A GSS-API security context, one per negotiation.
pub trait SecurityContext: Send {
    /// Feeds the server's token (`None` on the first call) and returns the
    /// next token to send, and whether the context is now established.
    fn step(&mut self, input: Option<&[u8]>) -> Result<(Vec<u8>, bool)>;

    /// Protects a message for the server (`gss_wrap`).
    fn wrap(&mut self, message: &[u8]) -> Result<Vec<u8>>;

    /// Unprotects a message from the server (`gss_unwrap`).
    fn unwrap(&mut self, token: &[u8]) -> Result<Vec<u8>>;
}

/// Creates security contexts for a service principal.
pub trait GssapiProvider: Send + Sync {
    /// Acquires client credentials and starts a context targeting
    /// `service_principal` (`service@host`).
    fn init_context(
        &self,
        service_principal: &str,
        credential: &Credential,
    ) -> Result<Box<dyn SecurityContext>>;
}

enum Phase {
    Start {
        provider: Arc<dyn GssapiProvider>,
        credential: Credential,
    },
    Negotiating(Box<dyn SecurityContext>),
    SecurityLayer(Box<dyn SecurityContext>),
    Finished,
}

/// GSSAPI client stepper.
pub struct GssapiClient {
    service_principal: String,
    authzid: String,
    phase: Phase,
    state: StepperState,
}

impl GssapiClient {
    pub fn new(provider: Arc<dyn GssapiProvider>, credential: &Credential, host: &str) -> Self {
        let service = match credential.service() {
            "" => DEFAULT_SERVICE,
            service => service,
        };
        Self {
            service_principal: format!("{service}@{}", host_without_port(host)),
            authzid: credential.username().to_string(),
            phase: Phase::Start {
                provider,
                credential: credential.clone(),
            },
            state: StepperState::NotStarted,
        }
    }

    pub fn service_principal(&self) -> &str {
        &self.service_principal
    }

    fn advance(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        // The credential and context are dropped as soon as they are done with.
        match (std::mem::replace(&mut self.phase, Phase::Finished), challenge) {
            (Phase::Start { provider, credential }, None | Some([])) => {
                let mut ctx = provider.init_context(&self.service_principal, &credential)?;
                drop(credential);
                let (token, established) = ctx.step(None)?;
                self.phase = next_phase(ctx, established);
                Ok((token, false))
            }
            (Phase::Negotiating(mut ctx), Some(token)) => {
                let (token, established) = ctx.step(Some(token))?;
                self.phase = next_phase(ctx, established);
                Ok((token, false))
            }
            (Phase::SecurityLayer(mut ctx), Some(wrapped)) => {
                let offer = ctx.unwrap(wrapped)?;
                if offer.len() != 4 {
                    return Err(SaslError::auth(format!(
                        "GSSAPI security layer offer has {} bytes, expected 4",
                        offer.len()
                    )));
                }
                if offer[0] & LAYER_NONE == 0 {
                    return Err(SaslError::auth(
                        "GSSAPI server requires a security layer, which is not supported",
                    ));
                }

                // No security layer, no maximum buffer size, then the authzid.
                let mut reply = vec![LAYER_NONE, 0, 0, 0];
                reply.extend_from_slice(self.authzid.as_bytes());
                Ok((ctx.wrap(&reply)?, true))
            }
            (Phase::Start { .. }, Some(_)) => Err(SaslError::auth(
                "GSSAPI server sent a challenge before the first token",
            )),
            (Phase::Finished, _) => Err(SaslError::auth("GSSAPI exchange already finished")),
            (_, None) => Err(SaslError::auth("GSSAPI expected a server token")),
        }
    }
}

fn next_phase(ctx: Box<dyn SecurityContext>, established: bool) -> Phase {
    if established {
        Phase::SecurityLayer(ctx)
    } else {
        Phase::Negotiating(ctx)
    }
}

impl Stepper for GssapiClient {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Gssapi
    }

    fn state(&self) -> StepperState {
        self.state
    }

    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        self.state.ensure_steppable(Mechanism::Gssapi)?;
        let outcome = self.advance(challenge);
        if self.state.record(&outcome) {
            self.phase = Phase::Finished;
        }
        outcome
    }
}

/// Strips a trailing `:port` from a host, keeping IPv6 literals intact.
fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(host, |(addr, _)| addr);
    }
    match host.split_once(':') {
        Some((name, port)) if !port.contains(':') => name,
        _ => host,
    }
}
