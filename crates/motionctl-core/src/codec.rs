//! Encoding of envelopes and notification payloads to byte frames.
//!
//! The supervisor's schema module is a collaborator; [`Codec`] is the seam
//! it plugs into. [`JsonCodec`] is the implementation shipped with the
//! client. Decode failures are returned to whoever called `decode` and are
//! never swallowed here.

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::{Envelope, ParameterSet};

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A value could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    /// A frame was malformed.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Opaque encode/decode of wire messages.
pub trait Codec: Send + Sync + 'static {
    /// Encode one envelope into one frame.
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError>;

    /// Decode one frame into one envelope.
    fn decode(&self, frame: &[u8]) -> Result<Envelope, CodecError>;

    /// Encode a notification payload.
    fn encode_parameters(&self, parameters: &ParameterSet) -> Result<Bytes, CodecError>;

    /// Decode a notification payload.
    fn decode_parameters(&self, frame: &[u8]) -> Result<ParameterSet, CodecError>;
}

/// JSON codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError> {
        serde_json::to_vec(envelope)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode(&self, frame: &[u8]) -> Result<Envelope, CodecError> {
        serde_json::from_slice(frame).map_err(CodecError::Decode)
    }

    fn encode_parameters(&self, parameters: &ParameterSet) -> Result<Bytes, CodecError> {
        serde_json::to_vec(parameters)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode_parameters(&self, frame: &[u8]) -> Result<ParameterSet, CodecError> {
        serde_json::from_slice(frame).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{DeviceSelector, ParameterValue, Request, Status};
    use crate::ids::CorrelationId;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn malformed_frame_is_a_decode_error() {
        let err = JsonCodec.decode(b"not json").unwrap_err();
        assert_matches!(err, CodecError::Decode(_));
        assert!(err.to_string().contains("failed to decode frame"));
    }

    #[test]
    fn envelope_without_body_is_a_decode_error() {
        assert_matches!(
            JsonCodec.decode(br#"{"id":"x"}"#),
            Err(CodecError::Decode(_))
        );
    }

    #[test]
    fn parameter_payload_roundtrip() {
        let set = ParameterSet::new(vec![
            ParameterValue::float("speed", 2.5),
            ParameterValue::string("mode", "jog"),
        ]);
        let frame = JsonCodec.encode_parameters(&set).unwrap();
        assert_eq!(JsonCodec.decode_parameters(&frame).unwrap(), set);
    }

    fn arb_value() -> impl Strategy<Value = ParameterValue> {
        (
            "[a-z]{1,8}",
            any::<i64>(),
            any::<u64>(),
            // Quarter steps are exactly representable in decimal.
            (-4000i32..4000).prop_map(|n| f64::from(n) / 4.0),
            "[ -~]{0,12}",
        )
            .prop_map(|(name, i, u, f, s)| ParameterValue {
                name,
                int_value: i,
                uint_value: u,
                float_value: f,
                string_value: s,
            })
    }

    fn arb_envelope() -> impl Strategy<Value = Envelope> {
        let request = prop_oneof![
            Just(Request::Ping),
            Just(Request::ListDevices),
            ("[a-z]{1,6}", 0u32..64).prop_map(|(command, pos)| Request::Execute {
                device: DeviceSelector::Position(pos),
                command,
            }),
            prop::collection::vec(arb_value(), 0..4).prop_map(|values| {
                Request::SetParameters {
                    device: DeviceSelector::Address("axis".into()),
                    values,
                }
            }),
        ]
        .prop_map(crate::envelope::Body::Request);
        let status = prop_oneof![
            Just(Status::Pong),
            Just(Status::Done),
            (0u8..=4).prop_map(|p| Status::Progress {
                fraction: f64::from(p) / 4.0
            }),
            ("[A-Z_]{1,8}", "[ -~]{0,16}")
                .prop_map(|(code, message)| Status::Error { code, message }),
            prop::collection::vec(arb_value(), 0..4)
                .prop_map(|values| Status::Parameters(ParameterSet::new(values))),
        ]
        .prop_map(crate::envelope::Body::Status);
        ("[a-zA-Z0-9-]{1,36}", prop_oneof![request, status]).prop_map(|(id, body)| Envelope {
            id: CorrelationId::from(id),
            body,
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(env in arb_envelope()) {
            let frame = JsonCodec.encode(&env).unwrap();
            prop_assert_eq!(JsonCodec.decode(&frame).unwrap(), env);
        }
    }
}
