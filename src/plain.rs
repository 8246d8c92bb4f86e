use zeroize::Zeroize;

use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;
use crate::sasl::{self, Stepper, StepperState};

/// A client implementation of the PLAIN authentication mechanism, as described
/// in RFC 4616. Authorization identity may be left blank to indicate that it is
/// the same as the username.
///
/// The whole exchange is the initial response; the client is done after the
/// first step.
pub struct PlainClient {
    identity: String,
    username: String,
    password: String,
    state: StepperState,
}

impl PlainClient {
    pub fn new(identity: String, username: String, password: String) -> Self {
        Self {
            identity,
            username,
            password,
            state: StepperState::NotStarted,
        }
    }

    pub(crate) fn from_credential(
        credential: &Credential,
        _host: &str,
    ) -> Result<Box<dyn Stepper>> {
        Ok(Box::new(Self::new(
            String::new(),
            credential.username().to_string(),
            credential.password().to_string(),
        )))
    }

    fn initial_response(&self) -> Result<Vec<u8>> {
        if [&self.identity, &self.username, &self.password]
            .iter()
            .any(|field| field.contains('\x00'))
        {
            return Err(SaslError::InvalidCredential(
                "PLAIN fields cannot contain a NUL character".into(),
            ));
        }
        Ok(format!("{}\x00{}\x00{}", self.identity, self.username, self.password).into_bytes())
    }

    fn wipe(&mut self) {
        self.password.zeroize();
    }
}

impl Stepper for PlainClient {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Plain
    }

    fn state(&self) -> StepperState {
        self.state
    }

    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        self.state.ensure_steppable(Mechanism::Plain)?;

        // A server that does not accept initial responses opens with an
        // empty challenge.
        let outcome = match challenge {
            None | Some([]) => self.initial_response().map(|ir| (ir, true)),
            Some(_) => Err(SaslError::auth(sasl::ERR_UNEXPECTED_SERVER_CHALLENGE)),
        };

        if self.state.record(&outcome) {
            self.wipe();
        }
        outcome
    }
}

impl Drop for PlainClient {
    fn drop(&mut self) {
        self.wipe();
    }
}
