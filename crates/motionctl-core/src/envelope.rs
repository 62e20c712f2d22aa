//! Wire-level message types exchanged with the motion-control supervisor.
//!
//! An [`Envelope`] carries a correlation id and exactly one [`Body`]: either a
//! [`Request`] (client → supervisor) or a [`Status`] (supervisor → client).
//! Both unions are internally tagged on `type`, so dispatch is an exhaustive
//! `match` rather than probing which optional field happens to be set.
//!
//! ```json
//! {"id": "0190…", "request": {"type": "getParameters", "device": {"position": 2}, "names": ["speed"]}}
//! {"id": "0190…", "status": {"type": "parameters", "values": [{"name": "speed", "floatValue": 1.5}]}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;

/// One complete message exchanged with the remote supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation token echoed by the supervisor on every reply.
    pub id: CorrelationId,
    /// Request or status payload.
    #[serde(flatten)]
    pub body: Body,
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(id: CorrelationId, request: Request) -> Self {
        Self {
            id,
            body: Body::Request(request),
        }
    }

    /// Build a status envelope.
    pub fn status(id: CorrelationId, status: Status) -> Self {
        Self {
            id,
            body: Body::Status(status),
        }
    }

    /// Whether this is a heartbeat reply.
    pub fn is_pong(&self) -> bool {
        matches!(self.body, Body::Status(Status::Pong))
    }
}

/// Exactly one of request or status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Body {
    /// Client → supervisor.
    Request(Request),
    /// Supervisor → client.
    Status(Status),
}

/// Request variants understood by the supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    /// Heartbeat. Carries no payload; answered with [`Status::Pong`].
    Ping,
    /// Enumerate the devices attached to the supervisor.
    ListDevices,
    /// Read parameter values from a device.
    GetParameters {
        /// Target device.
        device: DeviceSelector,
        /// Parameter names to read.
        names: Vec<String>,
    },
    /// Write parameter values to a device.
    SetParameters {
        /// Target device.
        device: DeviceSelector,
        /// Values to write; only the field matching the parameter type matters.
        values: Vec<ParameterValue>,
    },
    /// Run a device command. Replies arrive in phases: started, progress…, done.
    Execute {
        /// Target device.
        device: DeviceSelector,
        /// Command name.
        command: String,
    },
    /// Ask the supervisor to publish parameter snapshots on the event channel.
    Monitor {
        /// Target device.
        device: DeviceSelector,
        /// Parameter names to publish.
        names: Vec<String>,
        /// Topic the snapshots are published under.
        topic: String,
    },
}

/// Response variants sent by the supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Status {
    /// Heartbeat reply.
    Pong,
    /// Request accepted with no further payload.
    Ack,
    /// Request rejected.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Reply to [`Request::ListDevices`].
    Devices {
        /// Attached devices.
        devices: Vec<DeviceInfo>,
    },
    /// Parameter values.
    Parameters(ParameterSet),
    /// A command began executing.
    Started,
    /// A command made progress.
    Progress {
        /// Completion fraction in `0.0..=1.0`.
        fraction: f64,
    },
    /// A command finished.
    Done,
}

/// Payload-less discriminant of [`Status`], used to filter observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    /// [`Status::Pong`]
    Pong,
    /// [`Status::Ack`]
    Ack,
    /// [`Status::Error`]
    Error,
    /// [`Status::Devices`]
    Devices,
    /// [`Status::Parameters`]
    Parameters,
    /// [`Status::Started`]
    Started,
    /// [`Status::Progress`]
    Progress,
    /// [`Status::Done`]
    Done,
}

impl Status {
    /// The discriminant of this status.
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pong => StatusKind::Pong,
            Self::Ack => StatusKind::Ack,
            Self::Error { .. } => StatusKind::Error,
            Self::Devices { .. } => StatusKind::Devices,
            Self::Parameters(_) => StatusKind::Parameters,
            Self::Started => StatusKind::Started,
            Self::Progress { .. } => StatusKind::Progress,
            Self::Done => StatusKind::Done,
        }
    }

    /// Whether no further phases follow this status for the same request.
    ///
    /// Purely informational: observations never end on their own.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started | Self::Progress { .. })
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pong => "pong",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::Devices => "devices",
            Self::Parameters => "parameters",
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Identifies a device either by bus address or by its position in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceSelector {
    /// Bus address, e.g. `"10.0.0.7"` or `"axis-x"`.
    Address(String),
    /// Zero-based position in the device chain.
    Position(u32),
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    /// `@<n>` selects by position; anything else is an address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(position) = s.strip_prefix('@').and_then(|p| p.parse().ok()) {
            return Ok(Self::Position(position));
        }
        Ok(Self::Address(s.to_owned()))
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => f.write_str(address),
            Self::Position(position) => write!(f, "@{position}"),
        }
    }
}

/// A device attached to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bus address.
    pub address: String,
    /// Position in the chain.
    pub position: u32,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// One named parameter value.
///
/// Every value field is always present on the wire (absent fields decode as
/// zero/empty); the parameter's type decides which one is meaningful.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterValue {
    /// Parameter name.
    pub name: String,
    /// Signed integer value.
    pub int_value: i64,
    /// Unsigned integer value.
    pub uint_value: u64,
    /// Floating point value.
    pub float_value: f64,
    /// String value.
    pub string_value: String,
}

impl ParameterValue {
    /// A signed integer parameter.
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            int_value: value,
            ..Self::default()
        }
    }

    /// An unsigned integer parameter.
    pub fn uint(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            uint_value: value,
            ..Self::default()
        }
    }

    /// A floating point parameter.
    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            float_value: value,
            ..Self::default()
        }
    }

    /// A string parameter.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            string_value: value.into(),
            ..Self::default()
        }
    }
}

/// Snapshot of parameter values; the payload of every notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Values in the order the supervisor reported them.
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

impl ParameterSet {
    /// Wrap a list of values.
    pub fn new(values: Vec<ParameterValue>) -> Self {
        Self { values }
    }
}
