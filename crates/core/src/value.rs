// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::{types::ElemType, Error, Result};
use paste::paste;

macro_rules! value_impl {
    ($type: ident, $size: expr) => {
        paste! {
            /// read a little endian value at byte offset
            #[inline]
            pub fn [<get_ $type>](buf: &[u8], offset: usize) -> Result<$type> {
                let end = offset.checked_add($size).ok_or(Error::NotEnoughData)?;
                let src = buf.get(offset..end).ok_or(Error::NotEnoughData)?;
                let mut bytes = [0_u8; $size];
                bytes.copy_from_slice(src);
                Ok($type::from_le_bytes(bytes))
            }

            /// write a little endian value at byte offset
            #[inline]
            pub fn [<set_ $type>](buf: &mut [u8], offset: usize, value: $type) -> Result<()> {
                let end = offset.checked_add($size).ok_or(Error::TooMuchData)?;
                let dst = buf.get_mut(offset..end).ok_or(Error::TooMuchData)?;
                dst.copy_from_slice(&value.to_le_bytes());
                Ok(())
            }

            impl Decode for $type {
                #[inline]
                fn decode(buf: &[u8], offset: usize) -> Result<Self> {
                    [<get_ $type>](buf, offset)
                }
            }

            impl Encode for $type {
                #[inline]
                fn encode(&self, buf: &mut [u8], offset: usize) -> Result<()> {
                    [<set_ $type>](buf, offset, *self)
                }
            }
        }
    };
}

/// this trait abstracts decoding a value out of a tag buffer.
///
/// # Examples
/// ```rust
/// use plcconnector_core::{Decode, ValueExt};
///
/// let buf = [1, 0, 0, 0, 99, 0, 0, 0];
/// let v: i32 = buf.get_value(4).unwrap();
/// assert_eq!(v, 99);
/// ```
pub trait Decode: Sized {
    /// get value at specified byte offset
    fn decode(buf: &[u8], offset: usize) -> Result<Self>;
}

/// see [`Decode`]
pub trait Encode {
    /// set value at specified byte offset
    fn encode(&self, buf: &mut [u8], offset: usize) -> Result<()>;
}

/// native types with a matching CIP element type
pub trait Element: Encode + Decode + Copy {
    /// CIP type of this element
    const TYPE: ElemType;
}

value_impl!(u8, 1);
value_impl!(i8, 1);
value_impl!(i16, 2);
value_impl!(u16, 2);
value_impl!(i32, 4);
value_impl!(u32, 4);
value_impl!(i64, 8);
value_impl!(u64, 8);
value_impl!(f32, 4);

impl Decode for bool {
    #[inline]
    fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        Ok(get_u8(buf, offset)? != 0)
    }
}

impl Encode for bool {
    #[inline]
    fn encode(&self, buf: &mut [u8], offset: usize) -> Result<()> {
        set_u8(buf, offset, if *self { 0xFF } else { 0 })
    }
}

impl<T: Encode> Encode for &T {
    #[inline]
    fn encode(&self, buf: &mut [u8], offset: usize) -> Result<()> {
        T::encode(self, buf, offset)
    }
}

impl Element for bool {
    const TYPE: ElemType = ElemType::Bool;
}
impl Element for i8 {
    const TYPE: ElemType = ElemType::Sint;
}
impl Element for i16 {
    const TYPE: ElemType = ElemType::Int;
}
impl Element for i32 {
    const TYPE: ElemType = ElemType::Dint;
}
impl Element for i64 {
    const TYPE: ElemType = ElemType::Lint;
}
impl Element for f32 {
    const TYPE: ElemType = ElemType::Real;
}
impl Element for u32 {
    const TYPE: ElemType = ElemType::Dword;
}

/// encode a slice of elements into a fresh little endian buffer
pub fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let width = T::TYPE.width();
    let mut buf = vec![0_u8; values.len() * width];
    for (i, v) in values.iter().enumerate() {
        // buffer is sized for every element
        let _ = v.encode(&mut buf, i * width);
    }
    buf
}

/// decode every whole element of `buf`
pub fn decode_elements<T: Element>(buf: &[u8]) -> Result<Vec<T>> {
    let width = T::TYPE.width();
    (0..buf.len() / width)
        .map(|i| T::decode(buf, i * width))
        .collect()
}

/// get/set values on byte buffers
pub trait ValueExt {
    /// get value at byte offset
    fn get_value<T: Decode>(&self, byte_offset: usize) -> Result<T>;
    /// set value at byte offset
    fn set_value<T: Encode>(&mut self, byte_offset: usize, value: T) -> Result<()>;
}

impl ValueExt for [u8] {
    #[inline]
    fn get_value<T: Decode>(&self, byte_offset: usize) -> Result<T> {
        T::decode(self, byte_offset)
    }

    #[inline]
    fn set_value<T: Encode>(&mut self, byte_offset: usize, value: T) -> Result<()> {
        value.encode(self, byte_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_layout() {
        let mut buf = [0_u8; 8];
        buf.set_value(0, 0x0102_0304_i32).unwrap();
        assert_eq!(&buf[..4], &[4, 3, 2, 1]);
        buf.set_value(4, -2_i16).unwrap();
        assert_eq!(&buf[4..6], &[0xFE, 0xFF]);
        let v: i16 = buf.get_value(4).unwrap();
        assert_eq!(v, -2);
    }

    #[test]
    fn test_bounds() {
        let mut buf = [0_u8; 3];
        assert_eq!(buf.get_value::<i32>(0), Err(Error::NotEnoughData));
        assert_eq!(buf.set_value(2, 1_i16), Err(Error::TooMuchData));
        assert_eq!(buf.get_value::<u8>(usize::MAX), Err(Error::NotEnoughData));
    }

    #[test]
    fn test_bool() {
        let mut buf = [0_u8, 7];
        assert!(!buf.get_value::<bool>(0).unwrap());
        assert!(buf.get_value::<bool>(1).unwrap());
        buf.set_value(0, true).unwrap();
        assert_eq!(buf[0], 0xFF);
    }

    #[test]
    fn test_elements() {
        let buf = encode_elements(&[1_i64, i64::MIN, i64::MAX]);
        assert_eq!(buf.len(), 24);
        let values: Vec<i64> = decode_elements(&buf).unwrap();
        assert_eq!(values, vec![1, i64::MIN, i64::MAX]);

        let buf = encode_elements(&[f32::NEG_INFINITY, -0.0_f32]);
        let values: Vec<f32> = decode_elements(&buf).unwrap();
        assert_eq!(values[0], f32::NEG_INFINITY);
        assert_eq!(values[1].to_bits(), (-0.0_f32).to_bits());
    }
}
