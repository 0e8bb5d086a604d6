// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! encapsulation framing for [`tokio_util::codec::Framed`]

use crate::Error;
use bytes::BytesMut;
use log::Level;
use plcconnector_core::{
    encap::{Frame, HEADER_LEN, MAX_BODY_LEN},
    hex_dump, Error as CoreError,
};
use tokio_util::codec::{Decoder, Encoder};

/// splits a byte stream into encapsulation frames
#[derive(Debug, Default, Clone, Copy)]
pub struct EncapCodec;

impl Decoder for EncapCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }
        let len = u16::from_le_bytes([src[2], src[3]]) as usize;
        if len > MAX_BODY_LEN {
            return Err(CoreError::MalformedFrame("declared length too large").into());
        }
        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let buf = src.split_to(total).freeze();
        if log_enabled!(Level::Trace) {
            trace!("recv: {}", hex_dump(&buf));
        }
        Ok(Some(Frame::decode(buf)?))
    }
}

impl Encoder<Frame> for EncapCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let start = dst.len();
        frame.encode(dst)?;
        if log_enabled!(Level::Trace) {
            trace!("send: {}", hex_dump(&dst[start..]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BufMut;
    use plcconnector_core::encap::{Command, EncapHeader};

    #[test]
    fn test_partial_frames() -> anyhow::Result<()> {
        let mut codec = EncapCodec;
        let frame = Frame::new(EncapHeader::new(Command::RegisterSession, 0), vec![1, 0, 0, 0]);
        let mut wire = BytesMut::new();
        codec.encode(frame.clone(), &mut wire)?;
        codec.encode(frame.clone(), &mut wire)?;

        let mut src = BytesMut::new();
        src.put_slice(&wire[..10]);
        assert!(codec.decode(&mut src)?.is_none());
        src.put_slice(&wire[10..30]);
        let first = codec.decode(&mut src)?.unwrap();
        assert_eq!(first.header.length, 4);
        assert_eq!(&first.body[..], &[1, 0, 0, 0]);
        assert!(codec.decode(&mut src)?.is_none());
        src.put_slice(&wire[30..]);
        assert!(codec.decode(&mut src)?.is_some());
        assert!(src.is_empty());
        Ok(())
    }

    #[test]
    fn test_declared_length_too_large() {
        let mut codec = EncapCodec;
        let mut header = EncapHeader::new(Command::SendRRData, 1);
        header.length = 65535;
        let mut src = BytesMut::new();
        header.encode(&mut src);
        match codec.decode(&mut src) {
            Err(Error::Core(e)) => assert!(e.is_fatal()),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
