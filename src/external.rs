use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;
use crate::sasl::{self, Stepper, StepperState};

/// An implementation of the EXTERNAL authentication mechanism, as described in
/// RFC 4422. Authorization identity may be left blank to indicate that the
/// client is requesting to act as the identity associated with the
/// authentication credentials, typically a TLS client certificate.
pub struct ExternalClient {
    identity: String,
    state: StepperState,
}

impl ExternalClient {
    pub fn new(identity: String) -> Self {
        Self {
            identity,
            state: StepperState::NotStarted,
        }
    }

    pub(crate) fn from_credential(
        credential: &Credential,
        _host: &str,
    ) -> Result<Box<dyn Stepper>> {
        Ok(Box::new(Self::new(credential.username().to_string())))
    }
}

impl Stepper for ExternalClient {
    fn mechanism(&self) -> Mechanism {
        Mechanism::External
    }

    fn state(&self) -> StepperState {
        self.state
    }

    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        self.state.ensure_steppable(Mechanism::External)?;

        let outcome = match challenge {
            None | Some([]) if self.identity.contains('\x00') => Err(
                SaslError::InvalidCredential("identity contains a NUL character".into()),
            ),
            None | Some([]) => Ok((self.identity.clone().into_bytes(), true)),
            Some(_) => Err(SaslError::auth(sasl::ERR_UNEXPECTED_SERVER_CHALLENGE)),
        };

        self.state.record(&outcome);
        outcome
    }
}
