use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supervisor endpoints and connection timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// WebSocket URL of the command/response channel.
    pub command_url: String,
    /// WebSocket URL of the event channel.
    pub event_url: String,
    /// Heartbeat interval in milliseconds.
    pub ping_delay_ms: u64,
    /// Silence after which the peer is considered dead, in milliseconds.
    pub alive_timeout_ms: u64,
}

impl ConnectionSettings {
    /// Heartbeat interval.
    pub fn ping_delay(&self) -> Duration {
        Duration::from_millis(self.ping_delay_ms)
    }

    /// Liveness timeout.
    pub fn alive_timeout(&self) -> Duration {
        Duration::from_millis(self.alive_timeout_ms)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            command_url: "ws://127.0.0.1:5555/command".to_string(),
            event_url: "ws://127.0.0.1:5556/events".to_string(),
            ping_delay_ms: 1000,
            alive_timeout_ms: 3000,
        }
    }
}

/// Defaults applied to new topic subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Notifications per delivered batch.
    pub buffer_size: usize,
    /// Suppress consecutive identical payloads.
    pub distinct: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            distinct: false,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_follow_millis() {
        let c = ConnectionSettings {
            ping_delay_ms: 250,
            alive_timeout_ms: 1500,
            ..ConnectionSettings::default()
        };
        assert_eq!(c.ping_delay(), Duration::from_millis(250));
        assert_eq!(c.alive_timeout(), Duration::from_millis(1500));
    }
}
