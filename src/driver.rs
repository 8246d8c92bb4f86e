//! Negotiation driver.
//!
//! Runs one SASL conversation over a [`SaslTransport`]:
//!
//! ```text
//! step(None) ──► Start{mechanism, payload}
//!                    │
//!        ┌──── receive() ◄──────────────────────────┐
//!        │  Rejected  ──► AuthenticationFailed      │
//!        │  Continue/Done(payload)                  │
//!        │     └─ step(payload) unless client done  │
//!        │  client done && server Done ──► Ok       │
//!        └─► Continue{response} ────────────────────┘
//! ```
//!
//! The driver never retries. Transport failures, rejections, cancellation
//! and timeouts all end the attempt and drop the stepper, which wipes any
//! secrets it still holds.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::config::NegotiationConfig;
use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::registry::Registry;
use crate::sasl::{self, Stepper};
use crate::transport::{ClientFrame, SaslTransport, ServerReply};

/// Authenticates with the default registry and configuration.
///
/// `Ok(())` means the server accepted the credential.
pub async fn authenticate<T>(credential: &Credential, host: &str, transport: &mut T) -> Result<()>
where
    T: SaslTransport + ?Sized,
{
    Negotiator::default()
        .authenticate(credential, host, transport)
        .await
}

/// Drives SASL conversations using a fixed registry and configuration.
///
/// A negotiator is shared freely between connections; every call builds its
/// own stepper, so concurrent negotiations share no mutable state.
#[derive(Debug, Clone)]
pub struct Negotiator {
    registry: Arc<Registry>,
    config: NegotiationConfig,
}

impl Negotiator {
    pub fn new(registry: Arc<Registry>, config: NegotiationConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub async fn authenticate<T>(
        &self,
        credential: &Credential,
        host: &str,
        transport: &mut T,
    ) -> Result<()>
    where
        T: SaslTransport + ?Sized,
    {
        let stepper = self.registry.new_stepper(credential, host)?;
        self.run(stepper, transport, None).await
    }

    /// Like [`authenticate`](Self::authenticate), but gives up with
    /// [`SaslError::Cancelled`] as soon as `cancel` reads `true`.
    pub async fn authenticate_with_cancel<T>(
        &self,
        credential: &Credential,
        host: &str,
        transport: &mut T,
        cancel: watch::Receiver<bool>,
    ) -> Result<()>
    where
        T: SaslTransport + ?Sized,
    {
        let stepper = self.registry.new_stepper(credential, host)?;
        self.run(stepper, transport, Some(cancel)).await
    }

    /// Drives an already-built stepper to completion.
    ///
    /// The stepper is consumed: it is dropped on every exit path.
    pub async fn run<T>(
        &self,
        mut stepper: Box<dyn Stepper>,
        transport: &mut T,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<()>
    where
        T: SaslTransport + ?Sized,
    {
        let mechanism = stepper.mechanism();
        let timeout = self.config.timeout;

        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(SaslError::Cancelled("cancelled by caller".into())),
            res = tokio::time::timeout(timeout, self.exchange(stepper.as_mut(), transport)) => {
                res.unwrap_or_else(|_| {
                    Err(SaslError::Cancelled(format!("timed out after {timeout:?}")))
                })
            }
        };

        match &outcome {
            Ok(()) => debug!(%mechanism, "sasl authentication succeeded"),
            Err(err) => debug!(%mechanism, error = %err, "sasl authentication failed"),
        }
        outcome
    }

    async fn exchange<T>(&self, stepper: &mut dyn Stepper, transport: &mut T) -> Result<()>
    where
        T: SaslTransport + ?Sized,
    {
        let mechanism = stepper.mechanism();

        let (initial, mut client_done) = stepper.step(None)?;
        let initial = Zeroizing::new(initial);
        transport
            .send(ClientFrame::Start { mechanism, payload: &initial })
            .await?;
        drop(initial);

        for round in 1..=self.config.max_rounds {
            let (challenge, server_done) = match transport.receive().await? {
                ServerReply::Rejected(reason) => {
                    return Err(SaslError::AuthenticationFailed(reason))
                }
                ServerReply::Continue(payload) => (payload, false),
                ServerReply::Done(payload) => (payload, true),
            };
            trace!(%mechanism, round, server_done, len = challenge.len(), "sasl server reply");

            let response = if client_done {
                // MongoDB sends an empty continue after SCRAM server-final and
                // waits for an empty acknowledgement.
                if !challenge.is_empty() {
                    return Err(SaslError::auth(sasl::ERR_UNEXPECTED_SERVER_CHALLENGE));
                }
                Zeroizing::new(Vec::new())
            } else {
                let (response, done) = stepper.step(Some(&challenge[..]))?;
                client_done = done;
                Zeroizing::new(response)
            };

            if server_done {
                return if client_done {
                    Ok(())
                } else {
                    Err(SaslError::auth(sasl::ERR_SERVER_DONE_EARLY))
                };
            }

            transport
                .send(ClientFrame::Continue { payload: &response })
                .await?;
        }

        Err(SaslError::auth(format!(
            "server did not complete {mechanism} within {} rounds",
            self.config.max_rounds
        )))
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(Arc::new(Registry::default()), NegotiationConfig::default())
    }
}

/// Resolves once `cancel` reads `true`; never resolves without a receiver or
/// after the sender is gone.
async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel {
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if !closed {
            return;
        }
    }
    std::future::pending::<()>().await
}
