//! Instance manager configuration.

use std::time::Duration;

/// Settings for [`InstanceManager`](crate::InstanceManager).
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// How long `create` waits for the first pairing code before giving
    /// up and disconnecting the new session.
    ///
    /// Default: 30 seconds.
    pub pairing_timeout: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(30),
        }
    }
}
