use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum session lifetime. Sessions live until logout when unset.
    ///
    /// Default: unset
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,

    /// How often expired sessions are purged. Only used with `ttl`.
    ///
    /// Default: `1m`
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
