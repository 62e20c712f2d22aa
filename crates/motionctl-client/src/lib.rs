//! # motionctl-client
//!
//! Client-side engine for a remote motion-control supervisor:
//!
//! - **Correlator**: sends requests and routes replies by correlation id
//! - **Notification hub**: demultiplexes the event channel by topic, with
//!   batching and optional deduplication
//! - **Connection supervisor**: wires the correlator to a transport, sends
//!   heartbeats and tracks peer liveness
//! - **Transport**: the seam to the sockets, plus a WebSocket implementation

#![deny(unsafe_code)]

pub mod correlator;
pub mod hub;
pub mod registry;
pub mod supervisor;
pub mod transport;

pub use correlator::{Correlator, Observation, OutboundQueue};
pub use hub::{Batch, HubError, NotificationHub, SubscribeOptions, TopicSubscription};
pub use registry::SubscriptionHandle;
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorConfig};
pub use transport::{Transport, TransportError, TransportEvent};
