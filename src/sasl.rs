use std::fmt;

use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;

pub const ERR_UNEXPECTED_SERVER_CHALLENGE: &str = "sasl: unexpected server challenge";
pub const ERR_SERVER_DONE_EARLY: &str = "sasl: server completed before the mechanism did";

/// Client interface to perform challenge-response authentication.
///
/// One stepper serves exactly one negotiation attempt. It is `Send` so the
/// negotiation can run on any task, but it is never shared or reused.
pub trait Stepper: Send {
    /// The mechanism this stepper implements.
    fn mechanism(&self) -> Mechanism;

    /// Where the stepper currently is in its exchange.
    fn state(&self) -> StepperState;

    /// Advances the exchange by one round.
    ///
    /// The first call receives `None`. Mechanisms that send an initial
    /// response return it from that call; the rest return an empty payload.
    /// Every later call receives the server's most recent challenge.
    ///
    /// Returns the bytes to send and whether the client side is done. The
    /// server may still owe a final confirmation after `done` is returned;
    /// waiting for it is the driver's job.
    ///
    /// A rejected or malformed challenge fails with
    /// [`SaslError::AuthenticationFailed`] and moves the stepper to
    /// [`StepperState::Failed`]. Stepping a completed or failed stepper fails
    /// with [`SaslError::InvalidState`].
    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)>;
}

/// Position of a stepper in its exchange.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperState {
    NotStarted,
    AwaitingServerChallenge,
    Completed,
    Failed,
}

impl StepperState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, StepperState::Completed | StepperState::Failed)
    }

    /// Fails with `InvalidState` if no further step is allowed.
    pub(crate) fn ensure_steppable(self, mechanism: Mechanism) -> Result<()> {
        if self.is_terminal() {
            return Err(SaslError::InvalidState {
                mechanism: mechanism.name(),
                state: self,
            });
        }
        Ok(())
    }

    /// Applies the outcome of one step. Returns `true` when the outcome put
    /// the stepper into a terminal state, so the caller can wipe its secrets.
    pub(crate) fn record(&mut self, outcome: &Result<(Vec<u8>, bool)>) -> bool {
        *self = match outcome {
            Ok((_, true)) => StepperState::Completed,
            Ok((_, false)) => StepperState::AwaitingServerChallenge,
            Err(_) => StepperState::Failed,
        };
        self.is_terminal()
    }
}

impl fmt::Display for StepperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepperState::NotStarted => "not started",
            StepperState::AwaitingServerChallenge => "awaiting server challenge",
            StepperState::Completed => "completed",
            StepperState::Failed => "failed",
        })
    }
}
