// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::{path::class, Error, Result};
use std::fmt;

/// CIP services understood by the server
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Service {
    /// 0x05
    Reset,
    /// 0x4C
    ReadTag,
    /// 0x4D
    WriteTag,
    /// 0x4E, addressed to the connection manager
    ForwardClose,
    /// 0x52
    ReadTagFragmented,
    /// 0x53
    WriteTagFragmented,
    /// 0x54, addressed to the connection manager
    ForwardOpen,
    /// 0x52 addressed to the connection manager
    UnconnectedSend,
    /// any other service code; answered with ServiceNotSupported
    Unknown(u8),
}

impl Service {
    /// wire code
    #[inline]
    pub fn code(&self) -> u8 {
        match self {
            Service::Reset => 0x05,
            Service::ReadTag => 0x4C,
            Service::WriteTag => 0x4D,
            Service::ForwardClose => 0x4E,
            Service::ReadTagFragmented | Service::UnconnectedSend => 0x52,
            Service::WriteTagFragmented => 0x53,
            Service::ForwardOpen => 0x54,
            Service::Unknown(code) => *code,
        }
    }

    /// resolve a service code against the class addressed by the request path
    pub fn decode(code: u8, class: Option<u32>) -> Result<Self> {
        let to_cm = class == Some(class::CONNECTION_MANAGER);
        let v = match code {
            0x05 => Service::Reset,
            0x4C => Service::ReadTag,
            0x4D => Service::WriteTag,
            0x4E if to_cm => Service::ForwardClose,
            0x52 if to_cm => Service::UnconnectedSend,
            0x52 => Service::ReadTagFragmented,
            0x53 => Service::WriteTagFragmented,
            0x54 if to_cm => Service::ForwardOpen,
            _ => return Err(Error::UnknownService(code)),
        };
        Ok(v)
    }

    /// like [`Service::decode`], unsupported codes become [`Service::Unknown`]
    #[inline]
    pub fn from_code(code: u8, class: Option<u32>) -> Self {
        Self::decode(code, class).unwrap_or(Service::Unknown(code))
    }

    /// does this service modify tag data?
    #[inline(always)]
    pub fn is_write(&self) -> bool {
        matches!(self, Service::WriteTag | Service::WriteTagFragmented)
    }

    /// does this service address tag data?
    #[inline(always)]
    pub fn is_tag_service(&self) -> bool {
        matches!(
            self,
            Service::ReadTag
                | Service::WriteTag
                | Service::ReadTagFragmented
                | Service::WriteTagFragmented
        )
    }

    /// reply service code
    #[inline(always)]
    pub fn reply_code(&self) -> u8 {
        self.code() | 0x80
    }

    /// service name
    pub fn name(&self) -> &'static str {
        match self {
            Service::Reset => "Reset",
            Service::ReadTag => "ReadTag",
            Service::WriteTag => "WriteTag",
            Service::ForwardClose => "ForwardClose",
            Service::ReadTagFragmented => "ReadTagFragmented",
            Service::WriteTagFragmented => "WriteTagFragmented",
            Service::ForwardOpen => "ForwardOpen",
            Service::UnconnectedSend => "UnconnectedSend",
            Service::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Unknown(code) => write!(f, "Unknown({:#04x})", code),
            _ => write!(f, "{}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_class() {
        let cm = Some(class::CONNECTION_MANAGER);
        assert_eq!(Service::decode(0x54, cm), Ok(Service::ForwardOpen));
        assert_eq!(Service::decode(0x4E, cm), Ok(Service::ForwardClose));
        assert_eq!(Service::decode(0x52, cm), Ok(Service::UnconnectedSend));
        assert_eq!(Service::decode(0x52, None), Ok(Service::ReadTagFragmented));
        assert_eq!(
            Service::decode(0x52, Some(class::SYMBOL)),
            Ok(Service::ReadTagFragmented)
        );
        assert_eq!(Service::decode(0x54, None), Err(Error::UnknownService(0x54)));
        assert_eq!(Service::decode(0x01, None), Err(Error::UnknownService(0x01)));
    }

    #[test]
    fn test_reply_code() {
        assert_eq!(Service::ReadTag.reply_code(), 0xCC);
        assert_eq!(Service::UnconnectedSend.code(), 0x52);
        assert_eq!(Service::ForwardOpen.reply_code(), 0xD4);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Service::from_code(0x0E, None), Service::Unknown(0x0E));
        assert_eq!(Service::from_code(0x54, None), Service::Unknown(0x54));
        assert_eq!(
            Service::from_code(0x54, Some(class::CONNECTION_MANAGER)),
            Service::ForwardOpen
        );
        let unknown = Service::Unknown(0x0E);
        assert_eq!(unknown.reply_code(), 0x8E);
        assert!(!unknown.is_tag_service());
        assert_eq!(unknown.to_string(), "Unknown(0x0e)");
    }
}
