// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::types::ElemType;
use std::{error::Error as StdError, fmt};

/// errors raised by the registry and the protocol codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// unparsable bytes on the wire; fatal to the connection
    MalformedFrame(&'static str),
    /// stale or unknown session handle / connection id
    InvalidSession,
    /// no tag with that name
    UnknownTag(String),
    /// offset + length beyond the tag buffer
    OutOfRange {
        /// tag name
        name: String,
        /// requested end, in bytes
        end: usize,
        /// tag buffer size, in bytes
        size: usize,
    },
    /// wire type differs from the declared tag type
    TypeMismatch {
        /// declared type
        expected: ElemType,
        /// type code found in the request
        found: u16,
    },
    /// a tag with that name already exists
    DuplicateTag(String),
    /// type code not in the supported set
    UnknownType(u16),
    /// service code not in the supported set
    UnknownService(u8),
    /// session or connection table full
    ResourceExhausted(&'static str),
    /// tag definition rejected
    InvalidTag(&'static str),
    /// request path can not be decoded or resolved
    InvalidPath(&'static str),
    /// tags can not be added once serving started
    RegistryFrozen,
    /// request body shorter than its declared content
    NotEnoughData,
    /// request body longer than its declared content
    TooMuchData,
}

impl Error {
    /// is this error fatal to the transport connection?
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MalformedFrame(_))
    }
}

impl StdError for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedFrame(e) => write!(f, "malformed frame: {}", e),
            Error::InvalidSession => write!(f, "invalid session"),
            Error::UnknownTag(name) => write!(f, "unknown tag: {}", name),
            Error::OutOfRange { name, end, size } => write!(
                f,
                "out of range: tag {} has {} bytes, requested up to {}",
                name, size, end
            ),
            Error::TypeMismatch { expected, found } => write!(
                f,
                "type mismatch: expected {}, found {:#06x}",
                expected, found
            ),
            Error::DuplicateTag(name) => write!(f, "duplicate tag: {}", name),
            Error::UnknownType(code) => write!(f, "unknown type: {:#06x}", code),
            Error::UnknownService(code) => write!(f, "unknown service: {:#04x}", code),
            Error::ResourceExhausted(e) => write!(f, "resource exhausted: {}", e),
            Error::InvalidTag(e) => write!(f, "invalid tag: {}", e),
            Error::InvalidPath(e) => write!(f, "invalid path: {}", e),
            Error::RegistryFrozen => write!(f, "tags can not be added after serving started"),
            Error::NotEnoughData => write!(f, "not enough data"),
            Error::TooMuchData => write!(f, "too much data"),
        }
    }
}
