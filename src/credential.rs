use std::fmt;

use serde::Deserialize;
use zeroize::Zeroize;

use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;

/// Who is authenticating, and how.
///
/// A credential is immutable once built. The password is wiped when the
/// credential is dropped and never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCredential")]
pub struct Credential {
    username: String,
    password: String,
    mechanism: String,
    service: String,
}

impl Credential {
    /// Builds a credential, checking only that it is structurally usable.
    ///
    /// The mechanism name is not validated here; an unknown name is reported
    /// by the registry when a stepper is requested. A known mechanism that
    /// needs a username must be given a non-empty one.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self> {
        let credential = Self {
            username: username.into(),
            password: password.into(),
            mechanism: mechanism.into(),
            service: service.into(),
        };

        if let Ok(mech) = credential.mechanism.parse::<Mechanism>() {
            if mech.requires_username() && credential.username.is_empty() {
                return Err(SaslError::InvalidCredential(format!(
                    "{mech} requires a username"
                )));
            }
        }

        Ok(credential)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Service name, e.g. the Kerberos service for GSSAPI. May be empty.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mechanism", &self.mechanism)
            .field("service", &self.service)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawCredential {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    mechanism: String,
    #[serde(default)]
    service: String,
}

impl TryFrom<RawCredential> for Credential {
    type Error = SaslError;

    fn try_from(raw: RawCredential) -> Result<Self> {
        Credential::new(raw.username, raw.password, raw.mechanism, raw.service)
    }
}
