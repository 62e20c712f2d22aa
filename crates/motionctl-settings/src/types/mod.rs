//! Settings types. Every struct deserializes with `default`, so a partial
//! settings file only needs the keys it overrides.

mod connection;

pub use connection::{ConnectionSettings, LoggingSettings, NotificationSettings};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object (`~/.motionctl/settings.json`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionctlSettings {
    /// Endpoints, heartbeat and liveness timing.
    pub connection: ConnectionSettings,
    /// Defaults for notification subscriptions.
    pub notifications: NotificationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl MotionctlSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connection.ping_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.pingDelayMs must be greater than 0".into(),
            ));
        }
        if self.connection.alive_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.aliveTimeoutMs must be greater than 0".into(),
            ));
        }
        if self.notifications.buffer_size == 0 {
            return Err(SettingsError::InvalidValue(
                "notifications.bufferSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
