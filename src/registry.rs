use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "gssapi")]
use std::sync::Arc;

use tracing::debug;

use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::external::ExternalClient;
#[cfg(feature = "gssapi")]
use crate::gssapi::{GssapiClient, GssapiProvider};
use crate::mechanism::Mechanism;
use crate::plain::PlainClient;
use crate::sasl::Stepper;
#[cfg(feature = "scram")]
use crate::scram::ScramClient;

/// Builds a fresh stepper for a credential and target host.
pub type StepperFactory =
    Box<dyn Fn(&Credential, &str) -> Result<Box<dyn Stepper>> + Send + Sync>;

/// Maps mechanism names to stepper constructors.
///
/// A registry is built once at startup and then only read. `Registry::default()`
/// holds every mechanism compiled into this build that needs no outside
/// collaborator; GSSAPI must be added with [`Registry::register_gssapi`].
pub struct Registry {
    factories: BTreeMap<Mechanism, StepperFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Installs or replaces the constructor for `mechanism`.
    pub fn register<F>(&mut self, mechanism: Mechanism, factory: F) -> &mut Self
    where
        F: Fn(&Credential, &str) -> Result<Box<dyn Stepper>> + Send + Sync + 'static,
    {
        self.factories.insert(mechanism, Box::new(factory));
        self
    }

    #[cfg(feature = "gssapi")]
    pub fn register_gssapi(&mut self, provider: Arc<dyn GssapiProvider>) -> &mut Self {
        self.register(Mechanism::Gssapi, move |credential, host| {
            Ok(Box::new(GssapiClient::new(provider.clone(), credential, host)) as Box<dyn Stepper>)
        })
    }

    /// Registered mechanisms, in a stable order.
    pub fn mechanisms(&self) -> impl Iterator<Item = Mechanism> + '_ {
        self.factories.keys().copied()
    }

    pub fn supports(&self, mechanism: &str) -> bool {
        mechanism
            .parse::<Mechanism>()
            .is_ok_and(|mech| self.factories.contains_key(&mech))
    }

    /// Builds a stepper for `mechanism`.
    ///
    /// Fails with [`SaslError::UnsupportedMechanism`] if the name is unknown
    /// or nothing is registered for it. No I/O happens here.
    pub fn resolve(
        &self,
        mechanism: &str,
        credential: &Credential,
        host: &str,
    ) -> Result<Box<dyn Stepper>> {
        let mech = mechanism.parse::<Mechanism>()?;
        let factory = self
            .factories
            .get(&mech)
            .ok_or_else(|| SaslError::UnsupportedMechanism(mechanism.to_string()))?;

        debug!(mechanism = %mech, host, "resolved sasl mechanism");
        factory(credential, host)
    }

    /// Builds a stepper for the credential's own mechanism.
    pub fn new_stepper(&self, credential: &Credential, host: &str) -> Result<Box<dyn Stepper>> {
        self.resolve(credential.mechanism(), credential, host)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(Mechanism::Plain, PlainClient::from_credential)
            .register(Mechanism::External, ExternalClient::from_credential);
        #[cfg(feature = "scram")]
        registry
            .register(Mechanism::ScramSha1, ScramClient::sha1_from_credential)
            .register(Mechanism::ScramSha256, ScramClient::sha256_from_credential);
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
