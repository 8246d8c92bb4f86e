#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sasl_stepper::{
    ClientFrame, Mechanism, Result, SaslError, SaslTransport, ServerReply, Stepper, StepperState,
    TransportError,
};

pub fn init_tracing() {
    // RUST_LOG=sasl_stepper=trace cargo test ...
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A client frame as the mock server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Start(Mechanism, Vec<u8>),
    Continue(Vec<u8>),
}

/// Mock server that answers from a fixed script of replies.
///
/// Running out of script looks like the server closing the connection.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: VecDeque<std::result::Result<ServerReply, TransportError>>,
    fail_send_at: Option<usize>,
    pub sent: Vec<Sent>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ServerReply>) -> Self {
        Self {
            replies: replies.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Fails the `n`th send (0-based) with a transport error.
    pub fn failing_send_at(mut self, n: usize) -> Self {
        self.fail_send_at = Some(n);
        self
    }

    pub fn then_receive_error(mut self, msg: &str) -> Self {
        self.replies.push_back(Err(TransportError(msg.to_string())));
        self
    }
}

#[async_trait]
impl SaslTransport for ScriptedTransport {
    async fn send(&mut self, frame: ClientFrame<'_>) -> std::result::Result<(), TransportError> {
        if self.fail_send_at == Some(self.sent.len()) {
            return Err(TransportError("broken pipe".into()));
        }
        self.sent.push(match frame {
            ClientFrame::Start { mechanism, payload } => Sent::Start(mechanism, payload.to_vec()),
            ClientFrame::Continue { payload } => Sent::Continue(payload.to_vec()),
        });
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<ServerReply, TransportError> {
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("connection closed by server".into())))
    }
}

/// Transport whose server never answers.
#[derive(Default)]
pub struct SilentTransport {
    pub sent: usize,
}

#[async_trait]
impl SaslTransport for SilentTransport {
    async fn send(&mut self, _frame: ClientFrame<'_>) -> std::result::Result<(), TransportError> {
        self.sent += 1;
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<ServerReply, TransportError> {
        std::future::pending().await
    }
}

/// Stepper that answers `r0`, `r1`, ... and is done after `rounds` steps.
/// Every step call is counted, including rejected ones.
pub struct CountingStepper {
    rounds: usize,
    taken: usize,
    state: StepperState,
    pub calls: Arc<AtomicUsize>,
}

impl CountingStepper {
    pub fn new(rounds: usize) -> (Box<dyn Stepper>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stepper = Self {
            rounds,
            taken: 0,
            state: StepperState::NotStarted,
            calls: calls.clone(),
        };
        (Box::new(stepper), calls)
    }
}

impl Stepper for CountingStepper {
    fn mechanism(&self) -> Mechanism {
        Mechanism::ScramSha256
    }

    fn state(&self) -> StepperState {
        self.state
    }

    fn step(&mut self, _challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.state.is_terminal() {
            return Err(SaslError::InvalidState {
                mechanism: "SCRAM-SHA-256",
                state: self.state,
            });
        }
        let response = format!("r{}", self.taken).into_bytes();
        self.taken += 1;
        let done = self.taken == self.rounds;
        self.state = if done {
            StepperState::Completed
        } else {
            StepperState::AwaitingServerChallenge
        };
        Ok((response, done))
    }
}

pub fn cont(payload: &'static [u8]) -> ServerReply {
    ServerReply::Continue(Bytes::from_static(payload))
}

pub fn done(payload: &'static [u8]) -> ServerReply {
    ServerReply::Done(Bytes::from_static(payload))
}

pub fn rejected(reason: &str) -> ServerReply {
    ServerReply::Rejected(reason.to_string())
}
