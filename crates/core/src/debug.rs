// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use core::convert::From;

/// diagnostic output of the server
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DebugLevel {
    /// 0 - disables debugging output
    None,
    /// 1 - only errors, e.g. a listener that failed
    Error,
    /// 2 - warnings such as malformed frames from a peer or a failed UDP bind
    Warn,
    /// 3 - session and connection lifecycle
    Info,
    /// 4 - every request with its reply status
    Detail,
    /// 5 - hex dumps of every frame in both directions
    Spew,
}

impl Default for DebugLevel {
    #[inline]
    fn default() -> Self {
        DebugLevel::Warn
    }
}

impl From<u8> for DebugLevel {
    #[inline]
    fn from(val: u8) -> DebugLevel {
        match val {
            0 => DebugLevel::None,
            1 => DebugLevel::Error,
            2 => DebugLevel::Warn,
            3 => DebugLevel::Info,
            4 => DebugLevel::Detail,
            5 => DebugLevel::Spew,
            _ => DebugLevel::None,
        }
    }
}

impl From<DebugLevel> for u8 {
    #[inline(always)]
    fn from(level: DebugLevel) -> u8 {
        level as u8
    }
}

/// format bytes as space separated hex, for frame dumps
pub fn hex_dump(buf: &[u8]) -> String {
    let mut s = String::with_capacity(buf.len() * 3);
    for (i, b) in buf.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        s.push_str(&format!("{:02X}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(DebugLevel::from(4), DebugLevel::Detail);
        assert_eq!(DebugLevel::from(9), DebugLevel::None);
        assert_eq!(u8::from(DebugLevel::Spew), 5);
        assert!(DebugLevel::Spew > DebugLevel::Warn);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x65, 0, 4]), "65 00 04");
        assert_eq!(hex_dump(&[]), "");
    }
}
