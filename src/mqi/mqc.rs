//! MQI constants used by the transport.
//!
//! Values match the queue manager's C headers so that a binding to a real
//! client library can pass them through untouched.

/// Completion codes
pub const MQCC_FAILED: i32 = 2;

/// Reason codes
pub const MQRC_NONE: i32 = 0;
pub const MQRC_CONNECTION_BROKEN: i32 = 2009;
pub const MQRC_HCONN_ERROR: i32 = 2018;
pub const MQRC_HOBJ_ERROR: i32 = 2019;
pub const MQRC_NO_MSG_AVAILABLE: i32 = 2033;
pub const MQRC_NOT_OPEN_FOR_INPUT: i32 = 2037;
pub const MQRC_NOT_OPEN_FOR_OUTPUT: i32 = 2039;
pub const MQRC_OBJECT_IN_USE: i32 = 2042;
pub const MQRC_OPTIONS_ERROR: i32 = 2046;
pub const MQRC_Q_MGR_NAME_ERROR: i32 = 2058;
pub const MQRC_Q_MGR_NOT_AVAILABLE: i32 = 2059;
pub const MQRC_UNKNOWN_OBJECT_NAME: i32 = 2085;
pub const MQRC_NOT_AUTHORIZED: i32 = 2035;
pub const MQRC_HOST_NOT_AVAILABLE: i32 = 2538;

/// Message types
pub const MQMT_REQUEST: i32 = 1;
pub const MQMT_REPLY: i32 = 2;
pub const MQMT_REPORT: i32 = 4;
pub const MQMT_DATAGRAM: i32 = 8;

/// Connect options
pub const MQCNO_CLIENT_BINDING: i32 = 0x0000_0800;

/// Object types
pub const MQOT_Q: i32 = 1;

/// Open options
pub const MQOO_INPUT_AS_Q_DEF: i32 = 0x0000_0001;
pub const MQOO_INPUT_SHARED: i32 = 0x0000_0002;
pub const MQOO_INPUT_EXCLUSIVE: i32 = 0x0000_0004;
pub const MQOO_OUTPUT: i32 = 0x0000_0010;

/// Mask of every open option that grants input access.
pub const MQOO_INPUT_ANY: i32 = MQOO_INPUT_AS_Q_DEF | MQOO_INPUT_SHARED | MQOO_INPUT_EXCLUSIVE;

/// Close options
pub const MQCO_NONE: i32 = 0x0000_0000;

/// Put message options
pub const MQPMO_NO_SYNCPOINT: i32 = 0x0000_0004;
pub const MQPMO_NEW_MSG_ID: i32 = 0x0000_0040;
pub const MQPMO_NEW_CORREL_ID: i32 = 0x0000_0080;

/// Get message options
pub const MQGMO_NO_WAIT: i32 = 0x0000_0000;
pub const MQGMO_NO_SYNCPOINT: i32 = 0x0000_0004;
pub const MQGMO_FAIL_IF_QUIESCING: i32 = 0x0000_2000;
pub const MQGMO_CONVERT: i32 = 0x0000_4000;

/// Match options
pub const MQMO_NONE: i32 = 0x0000_0000;

/// Wait interval
pub const MQWI_UNLIMITED: i32 = -1;

/// Formats (always 8 characters, blank padded)
pub const MQFMT_NONE: &str = "        ";
pub const MQFMT_STRING: &str = "MQSTR   ";

/// Length of message and correlation identifiers
pub const MQ_MSG_ID_LENGTH: usize = 24;
pub const MQ_CORREL_ID_LENGTH: usize = 24;

/// Human readable name for a reason code, for logs.
pub fn reason_name(reason: i32) -> &'static str {
    match reason {
        MQRC_NONE => "MQRC_NONE",
        MQRC_CONNECTION_BROKEN => "MQRC_CONNECTION_BROKEN",
        MQRC_HCONN_ERROR => "MQRC_HCONN_ERROR",
        MQRC_HOBJ_ERROR => "MQRC_HOBJ_ERROR",
        MQRC_NO_MSG_AVAILABLE => "MQRC_NO_MSG_AVAILABLE",
        MQRC_NOT_AUTHORIZED => "MQRC_NOT_AUTHORIZED",
        MQRC_NOT_OPEN_FOR_INPUT => "MQRC_NOT_OPEN_FOR_INPUT",
        MQRC_NOT_OPEN_FOR_OUTPUT => "MQRC_NOT_OPEN_FOR_OUTPUT",
        MQRC_OBJECT_IN_USE => "MQRC_OBJECT_IN_USE",
        MQRC_OPTIONS_ERROR => "MQRC_OPTIONS_ERROR",
        MQRC_Q_MGR_NAME_ERROR => "MQRC_Q_MGR_NAME_ERROR",
        MQRC_Q_MGR_NOT_AVAILABLE => "MQRC_Q_MGR_NOT_AVAILABLE",
        MQRC_UNKNOWN_OBJECT_NAME => "MQRC_UNKNOWN_OBJECT_NAME",
        MQRC_HOST_NOT_AVAILABLE => "MQRC_HOST_NOT_AVAILABLE",
        _ => "MQRC_UNKNOWN",
    }
}
