//! # motionctl-core
//!
//! Shared vocabulary for the motionctl client:
//!
//! - **Envelopes**: [`Envelope`] with a closed [`Request`] / [`Status`] body
//! - **Correlation ids**: [`CorrelationId`], UUID v7 by default
//! - **Codec**: the [`Codec`] seam and the bundled [`JsonCodec`]
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod codec;
pub mod envelope;
pub mod ids;
pub mod logging;

pub use codec::{Codec, CodecError, JsonCodec};
pub use envelope::{
    Body, DeviceInfo, DeviceSelector, Envelope, ParameterSet, ParameterValue, Request, Status,
    StatusKind,
};
pub use ids::CorrelationId;
