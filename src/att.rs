//! Attribute Protocol result codes ([Vol 3] Part F).

use std::fmt::{Debug, Display};

/// Error codes that a characteristic handler can return to a client
/// ([Vol 3] Part F, Section 3.4.1.1 and \[CSS\] Part B, Section 1.2).
/// Codes that only the ATT server itself can produce, such as invalid
/// handles or malformed PDUs, are omitted.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    /// Value is not readable.
    ReadNotPermitted = 0x02,
    /// Value is not writable.
    WriteNotPermitted = 0x03,
    /// Client must pair with authentication first.
    InsufficientAuthentication = 0x05,
    /// Operation is not supported by the characteristic.
    RequestNotSupported = 0x06,
    /// Read or write offset is past the end of the value.
    InvalidOffset = 0x07,
    /// Client is not authorized for the operation.
    InsufficientAuthorization = 0x08,
    /// Attribute does not exist.
    AttributeNotFound = 0x0A,
    /// Value is too short for a blob read.
    AttributeNotLong = 0x0B,
    /// Written value has the wrong length.
    InvalidAttributeValueLength = 0x0D,
    /// Catch-all failure.
    UnlikelyError = 0x0E,
    /// Link must be encrypted first.
    InsufficientEncryption = 0x0F,
    /// Server ran out of resources.
    InsufficientResources = 0x11,
    /// Written value is not allowed.
    ValueNotAllowed = 0x13,
    /// Write was rejected by the application.
    WriteRequestRejected = 0xFC,
    /// Notifications or indications are not enabled as the profile requires.
    CccdImproperlyConfigured = 0xFD,
    /// An earlier operation has not finished.
    ProcedureAlreadyInProgress = 0xFE,
    /// Value is out of range.
    OutOfRange = 0xFF,
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
