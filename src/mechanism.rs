use std::fmt;
use std::str::FromStr;

use crate::error::SaslError;

/// The PLAIN mechanism name.
pub const PLAIN: &str = "PLAIN";
/// The EXTERNAL mechanism name.
pub const EXTERNAL: &str = "EXTERNAL";
/// The SCRAM-SHA-1 mechanism name.
pub const SCRAM_SHA_1: &str = "SCRAM-SHA-1";
/// The SCRAM-SHA-256 mechanism name.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
/// The GSSAPI mechanism name.
pub const GSSAPI: &str = "GSSAPI";

/// Every SASL mechanism this crate knows about.
///
/// Knowing a mechanism is not the same as supporting it: SCRAM and GSSAPI
/// are only usable when their cargo features are enabled, and GSSAPI also
/// needs a security-context provider registered at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mechanism {
    Plain,
    External,
    ScramSha1,
    ScramSha256,
    Gssapi,
}

impl Mechanism {
    pub const ALL: [Mechanism; 5] = [
        Mechanism::Plain,
        Mechanism::External,
        Mechanism::ScramSha1,
        Mechanism::ScramSha256,
        Mechanism::Gssapi,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Mechanism::Plain => PLAIN,
            Mechanism::External => EXTERNAL,
            Mechanism::ScramSha1 => SCRAM_SHA_1,
            Mechanism::ScramSha256 => SCRAM_SHA_256,
            Mechanism::Gssapi => GSSAPI,
        }
    }

    /// Whether a credential for this mechanism must carry a username.
    ///
    /// EXTERNAL takes its identity from the transport, so the username is
    /// only an optional authorization identity there.
    pub const fn requires_username(self) -> bool {
        !matches!(self, Mechanism::External)
    }

    /// Whether this build contains an implementation of the mechanism.
    pub const fn is_compiled_in(self) -> bool {
        match self {
            Mechanism::Plain | Mechanism::External => true,
            Mechanism::ScramSha1 | Mechanism::ScramSha256 => cfg!(feature = "scram"),
            Mechanism::Gssapi => cfg!(feature = "gssapi"),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mechanism {
    type Err = SaslError;

    /// Parses an exact, upper-case SASL mechanism name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mechanism::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| SaslError::UnsupportedMechanism(s.to_string()))
    }
}
