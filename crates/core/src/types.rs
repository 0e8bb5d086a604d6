// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! element types and their byte layout

use crate::{value::Decode, Error, Result};
use std::{convert::TryFrom, fmt, str::FromStr};

/// CIP elementary data types served by the registry
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum ElemType {
    /// 0xC1, 1 byte, nonzero = true
    Bool = 0xC1,
    /// 0xC2, 1 byte signed
    Sint = 0xC2,
    /// 0xC3, 2 bytes signed
    Int = 0xC3,
    /// 0xC4, 4 bytes signed
    Dint = 0xC4,
    /// 0xC5, 8 bytes signed
    Lint = 0xC5,
    /// 0xCA, IEEE-754 single precision
    Real = 0xCA,
    /// 0xD3, 32 bit string
    Dword = 0xD3,
}

impl ElemType {
    /// all supported types
    pub const ALL: [ElemType; 7] = [
        ElemType::Bool,
        ElemType::Sint,
        ElemType::Int,
        ElemType::Dint,
        ElemType::Lint,
        ElemType::Real,
        ElemType::Dword,
    ];

    /// wire code
    #[inline(always)]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// size of one element in bytes
    #[inline]
    pub fn width(&self) -> usize {
        match self {
            ElemType::Bool | ElemType::Sint => 1,
            ElemType::Int => 2,
            ElemType::Dint | ElemType::Real | ElemType::Dword => 4,
            ElemType::Lint => 8,
        }
    }

    /// type name as used by Logix tools
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            ElemType::Bool => "BOOL",
            ElemType::Sint => "SINT",
            ElemType::Int => "INT",
            ElemType::Dint => "DINT",
            ElemType::Lint => "LINT",
            ElemType::Real => "REAL",
            ElemType::Dword => "DWORD",
        }
    }

    /// decode one element at byte offset
    pub fn decode_at(&self, buf: &[u8], offset: usize) -> Result<Value> {
        let v = match self {
            ElemType::Bool => Value::Bool(bool::decode(buf, offset)?),
            ElemType::Sint => Value::Sint(i8::decode(buf, offset)?),
            ElemType::Int => Value::Int(i16::decode(buf, offset)?),
            ElemType::Dint => Value::Dint(i32::decode(buf, offset)?),
            ElemType::Lint => Value::Lint(i64::decode(buf, offset)?),
            ElemType::Real => Value::Real(f32::decode(buf, offset)?),
            ElemType::Dword => Value::Dword(u32::decode(buf, offset)?),
        };
        Ok(v)
    }

    /// decode every whole element in `buf`; a trailing partial element is ignored
    pub fn decode_all(&self, buf: &[u8]) -> Vec<Value> {
        let width = self.width();
        (0..buf.len() / width)
            .filter_map(|i| self.decode_at(buf, i * width).ok())
            .collect()
    }
}

impl TryFrom<u16> for ElemType {
    type Error = Error;

    #[inline]
    fn try_from(code: u16) -> Result<Self> {
        match code {
            0xC1 => Ok(ElemType::Bool),
            0xC2 => Ok(ElemType::Sint),
            0xC3 => Ok(ElemType::Int),
            0xC4 => Ok(ElemType::Dint),
            0xC5 => Ok(ElemType::Lint),
            0xCA => Ok(ElemType::Real),
            0xD3 => Ok(ElemType::Dword),
            _ => Err(Error::UnknownType(code)),
        }
    }
}

impl From<ElemType> for u16 {
    #[inline(always)]
    fn from(t: ElemType) -> u16 {
        t.code()
    }
}

impl FromStr for ElemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ElemType::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or(Error::InvalidTag("unknown type name"))
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// one decoded element
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// BOOL
    Bool(bool),
    /// SINT
    Sint(i8),
    /// INT
    Int(i16),
    /// DINT
    Dint(i32),
    /// LINT
    Lint(i64),
    /// REAL
    Real(f32),
    /// DWORD
    Dword(u32),
}

impl Value {
    /// type of this value
    #[inline]
    pub fn elem_type(&self) -> ElemType {
        match self {
            Value::Bool(_) => ElemType::Bool,
            Value::Sint(_) => ElemType::Sint,
            Value::Int(_) => ElemType::Int,
            Value::Dint(_) => ElemType::Dint,
            Value::Lint(_) => ElemType::Lint,
            Value::Real(_) => ElemType::Real,
            Value::Dword(_) => ElemType::Dword,
        }
    }

    /// little endian bytes of this value
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bool(v) => vec![if *v { 0xFF } else { 0 }],
            Value::Sint(v) => v.to_le_bytes().to_vec(),
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Dint(v) => v.to_le_bytes().to_vec(),
            Value::Lint(v) => v.to_le_bytes().to_vec(),
            Value::Real(v) => v.to_le_bytes().to_vec(),
            Value::Dword(v) => v.to_le_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Sint(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Dint(v) => write!(f, "{}", v),
            Value::Lint(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Dword(v) => write!(f, "{:#010x}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(ElemType::Bool.width(), 1);
        assert_eq!(ElemType::Sint.width(), 1);
        assert_eq!(ElemType::Int.width(), 2);
        assert_eq!(ElemType::Dint.width(), 4);
        assert_eq!(ElemType::Real.width(), 4);
        assert_eq!(ElemType::Dword.width(), 4);
        assert_eq!(ElemType::Lint.width(), 8);
    }

    #[test]
    fn test_codes() {
        for t in ElemType::ALL.iter() {
            assert_eq!(ElemType::try_from(t.code()), Ok(*t));
        }
        assert_eq!(ElemType::try_from(0xC6), Err(Error::UnknownType(0xC6)));
        assert_eq!(ElemType::try_from(0x02A0), Err(Error::UnknownType(0x02A0)));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("dint".parse::<ElemType>(), Ok(ElemType::Dint));
        assert_eq!(" REAL ".parse::<ElemType>(), Ok(ElemType::Real));
        assert!("UDINT".parse::<ElemType>().is_err());
    }

    #[test]
    fn test_decode_all() {
        let buf = [1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 9];
        let values = ElemType::Dint.decode_all(&buf);
        assert_eq!(values, vec![Value::Dint(1), Value::Dint(-1)]);

        let values = ElemType::Bool.decode_all(&[0, 1, 0xFF]);
        assert_eq!(
            values,
            vec![Value::Bool(false), Value::Bool(true), Value::Bool(true)]
        );
    }

    #[test]
    fn test_real_is_exact() {
        let bits = 0x3F9D_F3B6_u32; // 1.234
        let values = ElemType::Real.decode_all(&bits.to_le_bytes());
        match values[0] {
            Value::Real(v) => assert_eq!(v.to_bits(), bits),
            _ => panic!("expected REAL"),
        }
        assert_eq!(values[0].to_bytes(), bits.to_le_bytes().to_vec());
    }
}
