use serde::{Deserialize, Serialize};
use std::fmt;

/// OPC UA status code. The top two bits carry the severity (00 good, 01 uncertain, 10 bad).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0);
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    pub const BAD_MONITORED_ITEM_ID_INVALID: StatusCode = StatusCode(0x8042_0000);
    pub const BAD_MONITORED_ITEM_FILTER_UNSUPPORTED: StatusCode = StatusCode(0x8044_0000);
    pub const BAD_REFERENCE_TYPE_ID_INVALID: StatusCode = StatusCode(0x804C_0000);
    pub const BAD_PARENT_NODE_ID_INVALID: StatusCode = StatusCode(0x805B_0000);
    pub const BAD_NODE_ID_EXISTS: StatusCode = StatusCode(0x805E_0000);
    pub const BAD_NODE_CLASS_INVALID: StatusCode = StatusCode(0x805F_0000);
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    pub const BAD_METHOD_INVALID: StatusCode = StatusCode(0x8075_0000);
    pub const BAD_ARGUMENTS_MISSING: StatusCode = StatusCode(0x8076_0000);
    pub const BAD_NO_SUBSCRIPTION: StatusCode = StatusCode(0x8079_0000);
    pub const BAD_SEQUENCE_NUMBER_UNKNOWN: StatusCode = StatusCode(0x807A_0000);
    pub const BAD_MESSAGE_NOT_AVAILABLE: StatusCode = StatusCode(0x807B_0000);
    pub const BAD_INVALID_ARGUMENT: StatusCode = StatusCode(0x80AB_0000);
    pub const BAD_INVALID_STATE: StatusCode = StatusCode(0x80AF_0000);
    pub const BAD_TOO_MANY_ARGUMENTS: StatusCode = StatusCode(0x80E5_0000);

    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_MONITORED_ITEM_ID_INVALID => "BadMonitoredItemIdInvalid",
            Self::BAD_MONITORED_ITEM_FILTER_UNSUPPORTED => "BadMonitoredItemFilterUnsupported",
            Self::BAD_REFERENCE_TYPE_ID_INVALID => "BadReferenceTypeIdInvalid",
            Self::BAD_PARENT_NODE_ID_INVALID => "BadParentNodeIdInvalid",
            Self::BAD_NODE_ID_EXISTS => "BadNodeIdExists",
            Self::BAD_NODE_CLASS_INVALID => "BadNodeClassInvalid",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_METHOD_INVALID => "BadMethodInvalid",
            Self::BAD_ARGUMENTS_MISSING => "BadArgumentsMissing",
            Self::BAD_NO_SUBSCRIPTION => "BadNoSubscription",
            Self::BAD_SEQUENCE_NUMBER_UNKNOWN => "BadSequenceNumberUnknown",
            Self::BAD_MESSAGE_NOT_AVAILABLE => "BadMessageNotAvailable",
            Self::BAD_INVALID_ARGUMENT => "BadInvalidArgument",
            Self::BAD_INVALID_STATE => "BadInvalidState",
            Self::BAD_TOO_MANY_ARGUMENTS => "BadTooManyArguments",
            _ if self.is_good() => "Good",
            _ if self.is_bad() => "Bad",
            _ => "Uncertain",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::GOOD
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}
