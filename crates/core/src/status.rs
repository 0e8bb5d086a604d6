// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::{service::Service, Error};
use std::fmt;

/// extended status: connection in use or not found
pub const EXT_CONNECTION_NOT_FOUND: u16 = 0x0107;
/// extended status: out of connections
pub const EXT_OUT_OF_CONNECTIONS: u16 = 0x0113;
/// extended status: data type mismatch
pub const EXT_TYPE_MISMATCH: u16 = 0x2107;

/// CIP general status
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Status {
    /// 0x00
    Success = 0x00,
    /// 0x01, see extended status
    ConnectionFailure = 0x01,
    /// 0x04
    PathSegmentError = 0x04,
    /// 0x05
    PathDestinationUnknown = 0x05,
    /// 0x06, more data available
    PartialTransfer = 0x06,
    /// 0x08
    ServiceNotSupported = 0x08,
    /// 0x13
    NotEnoughData = 0x13,
    /// 0x15
    TooMuchData = 0x15,
    /// 0x20
    InvalidParameter = 0x20,
    /// 0xFF, see extended status
    GeneralError = 0xFF,
}

impl Status {
    /// wire code
    #[inline(always)]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// success or not?
    #[inline(always)]
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// has error?
    ///
    /// partial transfer is not an error
    #[inline(always)]
    pub fn is_err(&self) -> bool {
        !matches!(self, Status::Success | Status::PartialTransfer)
    }

    /// decode general status code; unknown codes give `None`
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        let v = match code {
            0x00 => Status::Success,
            0x01 => Status::ConnectionFailure,
            0x04 => Status::PathSegmentError,
            0x05 => Status::PathDestinationUnknown,
            0x06 => Status::PartialTransfer,
            0x08 => Status::ServiceNotSupported,
            0x13 => Status::NotEnoughData,
            0x15 => Status::TooMuchData,
            0x20 => Status::InvalidParameter,
            0xFF => Status::GeneralError,
            _ => return None,
        };
        Some(v)
    }

    /// short human readable text
    pub fn text(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::ConnectionFailure => "connection failure",
            Status::PathSegmentError => "path segment error",
            Status::PathDestinationUnknown => "path destination unknown",
            Status::PartialTransfer => "partial transfer",
            Status::ServiceNotSupported => "service not supported",
            Status::NotEnoughData => "not enough data",
            Status::TooMuchData => "too much data",
            Status::InvalidParameter => "invalid parameter",
            Status::GeneralError => "general error",
        }
    }
}

impl From<Status> for u8 {
    #[inline(always)]
    fn from(status: Status) -> u8 {
        status.code()
    }
}

impl fmt::Display for Status {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} {}", self.code(), self.text())
    }
}

/// general status plus optional extended status word
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ReplyStatus {
    /// general status
    pub general: Status,
    /// extended status, if any
    pub extended: Option<u16>,
}

impl ReplyStatus {
    /// success
    pub const OK: ReplyStatus = ReplyStatus {
        general: Status::Success,
        extended: None,
    };

    /// general status only
    #[inline(always)]
    pub const fn new(general: Status) -> Self {
        Self {
            general,
            extended: None,
        }
    }

    /// general status with one extended status word
    #[inline(always)]
    pub const fn with_extended(general: Status, extended: u16) -> Self {
        Self {
            general,
            extended: Some(extended),
        }
    }

    /// map a registry/codec error to the reply status for `service`.
    ///
    /// out of range reads address a non existent element and report a path
    /// error; out of range writes carry too much data.
    pub fn from_error(service: Service, err: &Error) -> Self {
        match err {
            Error::UnknownTag(_) | Error::InvalidTag(_) | Error::InvalidPath(_) => {
                Self::with_extended(Status::PathSegmentError, 0)
            }
            Error::OutOfRange { .. } => {
                if service.is_write() {
                    Self::new(Status::TooMuchData)
                } else {
                    Self::with_extended(Status::PathSegmentError, 0)
                }
            }
            Error::TypeMismatch { .. } => {
                Self::with_extended(Status::GeneralError, EXT_TYPE_MISMATCH)
            }
            Error::UnknownType(_) => Self::new(Status::InvalidParameter),
            Error::UnknownService(_) => Self::new(Status::ServiceNotSupported),
            Error::NotEnoughData => Self::new(Status::NotEnoughData),
            Error::TooMuchData => Self::new(Status::TooMuchData),
            Error::ResourceExhausted(_) => {
                Self::with_extended(Status::ConnectionFailure, EXT_OUT_OF_CONNECTIONS)
            }
            Error::InvalidSession => {
                Self::with_extended(Status::ConnectionFailure, EXT_CONNECTION_NOT_FOUND)
            }
            Error::MalformedFrame(_) | Error::DuplicateTag(_) | Error::RegistryFrozen => {
                Self::new(Status::GeneralError)
            }
        }
    }
}

impl From<Status> for ReplyStatus {
    #[inline(always)]
    fn from(general: Status) -> Self {
        Self::new(general)
    }
}

/// encapsulation layer status
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum EncapStatus {
    /// 0x0000
    Success = 0x0000,
    /// 0x0001, invalid or unsupported command
    InvalidCommand = 0x0001,
    /// 0x0002, insufficient memory
    InsufficientMemory = 0x0002,
    /// 0x0003, poorly formed or incorrect data
    IncorrectData = 0x0003,
    /// 0x0064, invalid session handle
    InvalidSessionHandle = 0x0064,
    /// 0x0065, invalid length
    InvalidLength = 0x0065,
    /// 0x0069, unsupported protocol revision
    UnsupportedProtocol = 0x0069,
}

impl EncapStatus {
    /// wire code
    #[inline(always)]
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for EncapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EncapStatus::Success => "success",
            EncapStatus::InvalidCommand => "invalid command",
            EncapStatus::InsufficientMemory => "insufficient memory",
            EncapStatus::IncorrectData => "incorrect data",
            EncapStatus::InvalidSessionHandle => "invalid session handle",
            EncapStatus::InvalidLength => "invalid length",
            EncapStatus::UnsupportedProtocol => "unsupported protocol",
        };
        write!(f, "{:#06x} {}", self.code(), text)
    }
}
