use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Limits applied to one negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Upper bound on the whole exchange, from the first step to the server's
    /// final reply. Configured as `timeout_ms`.
    #[serde(rename = "timeout_ms", deserialize_with = "duration_from_millis")]
    pub timeout: Duration,

    /// Upper bound on server replies read during one exchange. SCRAM needs
    /// three; a server that keeps asking past this is treated as hostile.
    pub max_rounds: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_rounds: 10,
        }
    }
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
