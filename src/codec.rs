//! Envelope codec for the port layer.
//!
//! Frames travel between the port and the transport as
//! `[payload, {"trace": "<48 hex>", "mtid": "<kind>"}]`. Encoding stamps a
//! fresh trace on requests that do not carry one yet; decoding restores the
//! interaction metadata and labels the message for dispatch.

use crate::ipc::{EnvelopeMeta, MessageEnvelope, Mtid, Payload};
use crate::trace::TraceId;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Interaction fields of a wire frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMeta {
    pub trace: TraceId,
    pub mtid: Mtid,
}

/// Two-element wire frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope(pub Payload, pub WireMeta);

impl From<WireEnvelope> for MessageEnvelope {
    fn from(WireEnvelope(payload, meta): WireEnvelope) -> Self {
        MessageEnvelope {
            payload,
            meta: EnvelopeMeta {
                id: None,
                trace: meta.trace,
                mtid: meta.mtid,
            },
        }
    }
}

impl From<MessageEnvelope> for WireEnvelope {
    fn from(envelope: MessageEnvelope) -> Self {
        WireEnvelope(
            envelope.payload,
            WireMeta {
                trace: envelope.meta.trace,
                mtid: envelope.meta.mtid,
            },
        )
    }
}

/// Metadata the port layer tracks for each message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMeta {
    pub mtid: Mtid,
    /// Zero until the message joins an interaction
    pub trace: TraceId,
    /// Message id of an inbound message
    pub id: Option<String>,
    /// Dispatch label set on decode
    pub method: Option<String>,
}

impl PortMeta {
    pub fn new(mtid: Mtid) -> Self {
        Self {
            mtid,
            trace: TraceId::ZERO,
            id: None,
            method: None,
        }
    }

    /// Metadata continuing an existing interaction
    pub fn with_trace(mtid: Mtid, trace: TraceId) -> Self {
        Self {
            trace,
            ..Self::new(mtid)
        }
    }
}

/// Encoder/decoder bound to one port
#[derive(Debug, Clone)]
pub struct MqCodec {
    prefix: String,
    port_id: String,
}

impl MqCodec {
    pub fn new(prefix: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            port_id: port_id.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Label attached to every decoded message
    pub fn method(&self) -> String {
        format!("{}In.message", self.port_id)
    }

    /// Build a wire frame. Requests without a trace get a fresh one, which is
    /// also written back into `meta` so the caller can match the reply.
    pub fn encode(&self, payload: Payload, meta: &mut PortMeta) -> WireEnvelope {
        if meta.mtid == Mtid::Request && meta.trace.is_zero() {
            meta.trace = TraceId::generate(&self.prefix);
        }
        let frame = WireEnvelope(
            payload,
            WireMeta {
                trace: meta.trace,
                mtid: meta.mtid,
            },
        );
        trace!(
            method = "ibmmq.encode",
            port = %self.port_id,
            mtid = %meta.mtid,
            trace = %meta.trace,
            "encoded {} byte frame",
            frame.0.len()
        );
        frame
    }

    /// Unpack a wire frame into `meta` and return the payload
    pub fn decode(&self, frame: WireEnvelope, meta: &mut PortMeta) -> Payload {
        let WireEnvelope(payload, wire) = frame;
        trace!(
            method = "ibmmq.decode",
            port = %self.port_id,
            mtid = %wire.mtid,
            trace = %wire.trace,
            "decoded {} byte frame",
            payload.len()
        );
        meta.mtid = wire.mtid;
        meta.trace = wire.trace;
        meta.method = Some(self.method());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MqCodec {
        MqCodec::new("ut", "mq")
    }

    #[test]
    fn test_request_gets_fresh_trace() {
        let mut meta = PortMeta::new(Mtid::Request);
        let frame = codec().encode(Payload::from("ping"), &mut meta);

        assert!(!meta.trace.is_zero());
        assert_eq!(meta.trace.prefix(), b"ut      ");
        assert_eq!(frame.1.trace, meta.trace);
        assert_eq!(frame.1.mtid, Mtid::Request);
    }

    #[test]
    fn test_request_with_trace_is_left_alone() {
        let trace = TraceId::generate("other");
        let mut meta = PortMeta::with_trace(Mtid::Request, trace);
        let frame = codec().encode(Payload::from("ping"), &mut meta);

        assert_eq!(meta.trace, trace);
        assert_eq!(frame.1.trace, trace);
    }

    #[test]
    fn test_other_kinds_pass_trace_through() {
        let mut notification = PortMeta::new(Mtid::Notification);
        let frame = codec().encode(Payload::from("hi"), &mut notification);
        assert!(frame.1.trace.is_zero());

        let trace = TraceId::generate("ut");
        let mut response = PortMeta::with_trace(Mtid::Response, trace);
        let frame = codec().encode(Payload::from("pong"), &mut response);
        assert_eq!(frame.1.trace, trace);
    }

    #[test]
    fn test_decode_reverses_encode() {
        let codec = codec();
        for (payload, mtid) in [
            (Payload::from("ping"), Mtid::Request),
            (Payload::from(vec![0u8, 1, 2, 255]), Mtid::Notification),
            (Payload::from(""), Mtid::Response),
        ] {
            let mut sent = PortMeta::new(mtid);
            let frame = codec.encode(payload.clone(), &mut sent);

            let mut received = PortMeta::new(Mtid::Error);
            let decoded = codec.decode(frame, &mut received);

            assert_eq!(decoded, payload);
            assert_eq!(received.mtid, mtid);
            assert_eq!(received.trace, sent.trace);
            assert_eq!(received.method.as_deref(), Some("mqIn.message"));
        }
    }

    #[test]
    fn test_wire_envelope_json_shape() {
        let trace = TraceId::generate("ut");
        let frame = WireEnvelope(
            Payload::from("ping"),
            WireMeta {
                trace,
                mtid: Mtid::Request,
            },
        );
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(
            json,
            serde_json::json!(["ping", {"trace": trace.to_hex(), "mtid": "request"}])
        );
        let back: WireEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_wire_envelope_rejects_short_trace() {
        let result: Result<WireEnvelope, _> =
            serde_json::from_str(r#"["ping", {"trace": "abcd", "mtid": "request"}]"#);
        assert!(result.is_err());
    }
}
