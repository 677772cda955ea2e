//! Translation between envelopes and MQI descriptors.
//!
//! Only two descriptor fields carry interaction semantics: the message type
//! and the correlation id. Everything the transport knows about a message's
//! role is derived from those two.

use super::{EnvelopeMeta, MessageEnvelope, Mtid, Payload};
use crate::mqi::{mqc, GetOptions, MessageDescriptor, MqMessage, PutOptions};
use crate::trace::TraceId;

/// Build the descriptor and options for putting `envelope`.
///
/// An explicit trace is written verbatim as the correlation id; without one
/// the queue manager is asked for a fresh correlation id. Requests name
/// `reply_to` as the queue replies should be sent to.
pub fn put_descriptor(envelope: &MessageEnvelope, reply_to: &str) -> (MessageDescriptor, PutOptions) {
    let meta = &envelope.meta;
    let mut descriptor = MessageDescriptor::default();
    let mut options = mqc::MQPMO_NO_SYNCPOINT | mqc::MQPMO_NEW_MSG_ID;

    if meta.trace.is_zero() {
        options |= mqc::MQPMO_NEW_CORREL_ID;
    } else {
        descriptor.correl_id = *meta.trace.as_bytes();
    }

    // `Error` has no code; it goes out with the descriptor default (datagram).
    if let Some(msg_type) = meta.mtid.msg_type() {
        descriptor.msg_type = msg_type;
    }
    if meta.mtid == Mtid::Request {
        descriptor.reply_to_q = reply_to.to_string();
    }
    if envelope.payload.is_text() {
        descriptor.format = mqc::MQFMT_STRING.to_string();
    }

    (descriptor, PutOptions { options })
}

/// Options for a single non-blocking poll of the inbound queue
pub fn get_options() -> GetOptions {
    GetOptions {
        options: mqc::MQGMO_NO_SYNCPOINT
            | mqc::MQGMO_NO_WAIT
            | mqc::MQGMO_CONVERT
            | mqc::MQGMO_FAIL_IF_QUIESCING,
        match_options: mqc::MQMO_NONE,
        wait_interval: mqc::MQWI_UNLIMITED,
    }
}

/// Turn a retrieved message into an envelope, classifying its interaction
/// kind. String-format payloads become text when they are valid UTF-8.
pub fn envelope_from(message: MqMessage) -> MessageEnvelope {
    let MqMessage {
        descriptor,
        payload,
    } = message;
    let trace = TraceId::from_bytes(descriptor.correl_id);
    let mtid = Mtid::classify(descriptor.msg_type, &trace);

    let payload = if descriptor.is_string_format() {
        match String::from_utf8(payload) {
            Ok(text) => Payload::Text(text),
            Err(err) => Payload::Bytes(err.into_bytes()),
        }
    } else {
        Payload::Bytes(payload)
    };

    MessageEnvelope {
        payload,
        meta: EnvelopeMeta {
            id: Some(hex::encode(descriptor.msg_id)),
            trace,
            mtid,
        },
    }
}
