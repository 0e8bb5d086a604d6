// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! message router requests/replies and service bodies

use crate::{path::EPath, status::ReplyStatus, Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// structure type prefix of WriteTag; structures are not served
pub const STRUCT_TYPE_PREFIX: u16 = 0x02A0;

#[inline]
fn need(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        Err(Error::NotEnoughData)
    } else {
        Ok(())
    }
}

/// message router request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    /// service code
    pub service: u8,
    /// raw EPATH
    pub path: Bytes,
    /// service data
    pub data: Bytes,
}

impl MessageRequest {
    /// new request; `path` must have an even length
    pub fn new(service: u8, path: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self {
            service,
            path: path.into(),
            data: data.into(),
        }
    }

    /// decode; a request too short to carry its service code is malformed
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::MalformedFrame("message router request too short"));
        }
        let service = buf.get_u8();
        let words = buf.get_u8() as usize;
        let path_len = words * 2;
        if buf.len() < path_len {
            return Err(Error::NotEnoughData);
        }
        let path = buf.split_to(path_len);
        Ok(Self {
            service,
            path,
            data: buf,
        })
    }

    /// decoded path
    #[inline]
    pub fn epath(&self) -> Result<EPath> {
        EPath::decode(&self.path)
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.service);
        buf.put_u8((self.path.len() / 2) as u8);
        buf.put_slice(&self.path);
        buf.put_slice(&self.data);
    }

    /// encoded bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.path.len() + self.data.len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// message router reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReply {
    /// reply service code, request service | 0x80
    pub service: u8,
    /// general and extended status
    pub status: ReplyStatus,
    /// reply data
    pub data: Bytes,
}

impl MessageReply {
    /// reply to `request_service`
    pub fn new(request_service: u8, status: impl Into<ReplyStatus>, data: impl Into<Bytes>) -> Self {
        Self {
            service: request_service | 0x80,
            status: status.into(),
            data: data.into(),
        }
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.service);
        buf.put_u8(0);
        buf.put_u8(self.status.general.code());
        match self.status.extended {
            Some(ext) => {
                buf.put_u8(1);
                buf.put_u16_le(ext);
            }
            None => buf.put_u8(0),
        }
        buf.put_slice(&self.data);
    }

    /// encoded bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.data.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// decode; unknown general status codes are reported as `GeneralError`
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 4)?;
        let service = buf.get_u8();
        buf.get_u8();
        let code = buf.get_u8();
        let words = buf.get_u8() as usize;
        need(&buf, words * 2)?;
        let extended = if words > 0 {
            let ext = buf.get_u16_le();
            buf.advance((words - 1) * 2);
            Some(ext)
        } else {
            None
        };
        let general = crate::Status::from_code(code).unwrap_or(crate::Status::GeneralError);
        Ok(Self {
            service,
            status: ReplyStatus { general, extended },
            data: buf,
        })
    }
}

/// ForwardOpen request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardOpenRequest {
    /// priority / time tick
    pub priority_tick: u8,
    /// timeout ticks
    pub timeout_ticks: u8,
    /// proposed O->T id; the server allocates its own
    pub ot_conn_id: u32,
    /// T->O id chosen by the client
    pub to_conn_id: u32,
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
    /// timeout multiplier
    pub timeout_multiplier: u8,
    /// O->T requested packet interval, microseconds
    pub ot_rpi: u32,
    /// O->T network connection parameters
    pub ot_params: u16,
    /// T->O requested packet interval, microseconds
    pub to_rpi: u32,
    /// T->O network connection parameters
    pub to_params: u16,
    /// transport type/trigger
    pub transport: u8,
    /// connection path
    pub path: Bytes,
}

impl ForwardOpenRequest {
    /// T->O connection size from the connection parameters
    #[inline]
    pub fn to_packet_size(&self) -> u16 {
        self.to_params & 0x1FF
    }

    /// decode
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 36)?;
        let priority_tick = buf.get_u8();
        let timeout_ticks = buf.get_u8();
        let ot_conn_id = buf.get_u32_le();
        let to_conn_id = buf.get_u32_le();
        let conn_serial = buf.get_u16_le();
        let vendor_id = buf.get_u16_le();
        let orig_serial = buf.get_u32_le();
        let timeout_multiplier = buf.get_u8();
        buf.advance(3);
        let ot_rpi = buf.get_u32_le();
        let ot_params = buf.get_u16_le();
        let to_rpi = buf.get_u32_le();
        let to_params = buf.get_u16_le();
        let transport = buf.get_u8();
        let words = buf.get_u8() as usize;
        need(&buf, words * 2)?;
        let path = buf.split_to(words * 2);
        Ok(Self {
            priority_tick,
            timeout_ticks,
            ot_conn_id,
            to_conn_id,
            conn_serial,
            vendor_id,
            orig_serial,
            timeout_multiplier,
            ot_rpi,
            ot_params,
            to_rpi,
            to_params,
            transport,
            path,
        })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.priority_tick);
        buf.put_u8(self.timeout_ticks);
        buf.put_u32_le(self.ot_conn_id);
        buf.put_u32_le(self.to_conn_id);
        buf.put_u16_le(self.conn_serial);
        buf.put_u16_le(self.vendor_id);
        buf.put_u32_le(self.orig_serial);
        buf.put_u8(self.timeout_multiplier);
        buf.put_slice(&[0, 0, 0]);
        buf.put_u32_le(self.ot_rpi);
        buf.put_u16_le(self.ot_params);
        buf.put_u32_le(self.to_rpi);
        buf.put_u16_le(self.to_params);
        buf.put_u8(self.transport);
        buf.put_u8((self.path.len() / 2) as u8);
        buf.put_slice(&self.path);
    }
}

/// ForwardOpen success reply body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardOpenReply {
    /// O->T id allocated by the server
    pub ot_conn_id: u32,
    /// T->O id echoed
    pub to_conn_id: u32,
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
    /// O->T actual packet interval
    pub ot_api: u32,
    /// T->O actual packet interval
    pub to_api: u32,
}

impl ForwardOpenReply {
    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.ot_conn_id);
        buf.put_u32_le(self.to_conn_id);
        buf.put_u16_le(self.conn_serial);
        buf.put_u16_le(self.vendor_id);
        buf.put_u32_le(self.orig_serial);
        buf.put_u32_le(self.ot_api);
        buf.put_u32_le(self.to_api);
        // application reply size, reserved
        buf.put_u8(0);
        buf.put_u8(0);
    }

    /// decode
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 26)?;
        Ok(Self {
            ot_conn_id: buf.get_u32_le(),
            to_conn_id: buf.get_u32_le(),
            conn_serial: buf.get_u16_le(),
            vendor_id: buf.get_u16_le(),
            orig_serial: buf.get_u32_le(),
            ot_api: buf.get_u32_le(),
            to_api: buf.get_u32_le(),
        })
    }
}

/// ForwardClose request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardCloseRequest {
    /// priority / time tick
    pub priority_tick: u8,
    /// timeout ticks
    pub timeout_ticks: u8,
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
    /// connection path
    pub path: Bytes,
}

impl ForwardCloseRequest {
    /// decode
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 12)?;
        let priority_tick = buf.get_u8();
        let timeout_ticks = buf.get_u8();
        let conn_serial = buf.get_u16_le();
        let vendor_id = buf.get_u16_le();
        let orig_serial = buf.get_u32_le();
        let words = buf.get_u8() as usize;
        buf.get_u8();
        need(&buf, words * 2)?;
        let path = buf.split_to(words * 2);
        Ok(Self {
            priority_tick,
            timeout_ticks,
            conn_serial,
            vendor_id,
            orig_serial,
            path,
        })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.priority_tick);
        buf.put_u8(self.timeout_ticks);
        buf.put_u16_le(self.conn_serial);
        buf.put_u16_le(self.vendor_id);
        buf.put_u32_le(self.orig_serial);
        buf.put_u8((self.path.len() / 2) as u8);
        buf.put_u8(0);
        buf.put_slice(&self.path);
    }
}

/// ForwardClose success reply body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardCloseReply {
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
}

impl ForwardCloseReply {
    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.conn_serial);
        buf.put_u16_le(self.vendor_id);
        buf.put_u32_le(self.orig_serial);
        buf.put_u8(0);
        buf.put_u8(0);
    }
}

/// ForwardOpen / ForwardClose failure reply body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardFailure {
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
    /// words of the connection path not processed
    pub remaining_path: u8,
}

impl ForwardFailure {
    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.conn_serial);
        buf.put_u16_le(self.vendor_id);
        buf.put_u32_le(self.orig_serial);
        buf.put_u8(self.remaining_path);
        // reserved
        buf.put_u8(0);
    }

    /// decode
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 10)?;
        Ok(Self {
            conn_serial: buf.get_u16_le(),
            vendor_id: buf.get_u16_le(),
            orig_serial: buf.get_u32_le(),
            remaining_path: buf.get_u8(),
        })
    }
}

/// ReadTag / ReadTagFragmented request body
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadTagRequest {
    /// number of elements
    pub count: u16,
    /// byte offset, fragmented only
    pub offset: Option<u32>,
}

impl ReadTagRequest {
    /// decode; `fragmented` selects the byte offset field
    pub fn decode(mut buf: Bytes, fragmented: bool) -> Result<Self> {
        need(&buf, if fragmented { 6 } else { 2 })?;
        let count = buf.get_u16_le();
        let offset = if fragmented {
            Some(buf.get_u32_le())
        } else {
            None
        };
        Ok(Self { count, offset })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.count);
        if let Some(offset) = self.offset {
            buf.put_u32_le(offset);
        }
    }
}

/// WriteTag / WriteTagFragmented request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTagRequest {
    /// type code on the wire
    pub type_code: u16,
    /// number of elements
    pub count: u16,
    /// byte offset, fragmented only
    pub offset: Option<u32>,
    /// element data
    pub data: Bytes,
}

impl WriteTagRequest {
    /// decode; `fragmented` selects the byte offset field
    pub fn decode(mut buf: Bytes, fragmented: bool) -> Result<Self> {
        need(&buf, 2)?;
        let type_code = buf.get_u16_le();
        if type_code == STRUCT_TYPE_PREFIX {
            // structure handle
            need(&buf, 2)?;
            buf.get_u16_le();
        }
        need(&buf, if fragmented { 6 } else { 2 })?;
        let count = buf.get_u16_le();
        let offset = if fragmented {
            Some(buf.get_u32_le())
        } else {
            None
        };
        Ok(Self {
            type_code,
            count,
            offset,
            data: buf,
        })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.type_code);
        buf.put_u16_le(self.count);
        if let Some(offset) = self.offset {
            buf.put_u32_le(offset);
        }
        buf.put_slice(&self.data);
    }
}

/// UnconnectedSend body; the route path is not interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconnectedSend {
    /// priority / time tick
    pub priority_tick: u8,
    /// timeout ticks
    pub timeout_ticks: u8,
    /// embedded request
    pub request: MessageRequest,
    /// route path
    pub route: Bytes,
}

impl UnconnectedSend {
    /// decode
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        need(&buf, 4)?;
        let priority_tick = buf.get_u8();
        let timeout_ticks = buf.get_u8();
        let len = buf.get_u16_le() as usize;
        need(&buf, len)?;
        let embedded = buf.split_to(len);
        if len & 1 == 1 && buf.has_remaining() {
            buf.advance(1);
        }
        let route = if buf.remaining() >= 2 {
            let words = buf.get_u8() as usize;
            buf.get_u8();
            need(&buf, words * 2)?;
            buf.split_to(words * 2)
        } else {
            Bytes::new()
        };
        let request = match MessageRequest::decode(embedded) {
            Err(Error::MalformedFrame(_)) => return Err(Error::NotEnoughData),
            res => res?,
        };
        Ok(Self {
            priority_tick,
            timeout_ticks,
            request,
            route,
        })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let embedded = self.request.to_bytes();
        buf.put_u8(self.priority_tick);
        buf.put_u8(self.timeout_ticks);
        buf.put_u16_le(embedded.len() as u16);
        buf.put_slice(&embedded);
        if embedded.len() & 1 == 1 {
            buf.put_u8(0);
        }
        buf.put_u8((self.route.len() / 2) as u8);
        buf.put_u8(0);
        buf.put_slice(&self.route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;

    #[test]
    fn test_message_request() {
        let req = MessageRequest::decode(Bytes::from_static(&[
            0x4C, 0x02, 0x91, 0x02, b'T', b'1', 0x03, 0x00,
        ]))
        .unwrap();
        assert_eq!(req.service, 0x4C);
        assert_eq!(req.epath().unwrap().symbol(), Some("T1"));
        assert_eq!(&req.data[..], &[3, 0]);

        let err = MessageRequest::decode(Bytes::from_static(&[0x4C, 0x03, 0x91])).unwrap_err();
        assert_eq!(err, Error::NotEnoughData);
        assert!(MessageRequest::decode(Bytes::from_static(&[0x4C]))
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn test_message_reply() {
        let reply = MessageReply::new(
            0x54,
            ReplyStatus::with_extended(Status::ConnectionFailure, 0x0113),
            Bytes::new(),
        );
        let bytes = reply.to_bytes();
        assert_eq!(&bytes[..], &[0xD4, 0, 0x01, 1, 0x13, 0x01]);
        assert_eq!(MessageReply::decode(bytes).unwrap(), reply);

        let ok = MessageReply::new(0x4C, Status::Success, vec![0xC4, 0, 1, 0, 0, 0]);
        let bytes = ok.to_bytes();
        assert_eq!(&bytes[..4], &[0xCC, 0, 0, 0]);
        let decoded = MessageReply::decode(bytes).unwrap();
        assert_eq!(&decoded.data[..2], &[0xC4, 0]);
    }

    #[test]
    fn test_forward_open() {
        let req = ForwardOpenRequest {
            priority_tick: 0x0A,
            timeout_ticks: 0x0E,
            to_conn_id: 0x1122_3344,
            conn_serial: 7,
            vendor_id: 0x1337,
            orig_serial: 42,
            timeout_multiplier: 3,
            ot_rpi: 2_000_000,
            ot_params: 0x43F4,
            to_rpi: 2_000_000,
            to_params: 0x43F4,
            transport: 0xA3,
            path: Bytes::from_static(&[0x01, 0x00, 0x20, 0x02, 0x24, 0x01]),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        assert_eq!(buf.len(), 36 + 6);
        let decoded = ForwardOpenRequest::decode(buf.freeze()).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(decoded.to_packet_size(), 0x1F4);

        assert_eq!(
            ForwardOpenRequest::decode(Bytes::from_static(&[0; 20])),
            Err(Error::NotEnoughData)
        );
    }

    #[test]
    fn test_write_tag_struct_prefix() {
        let req = WriteTagRequest::decode(
            Bytes::from_static(&[0xA0, 0x02, 0x34, 0x12, 0x01, 0x00, 0xAA]),
            false,
        )
        .unwrap();
        assert_eq!(req.type_code, STRUCT_TYPE_PREFIX);
        assert_eq!(req.count, 1);
        assert_eq!(&req.data[..], &[0xAA]);

        let req = WriteTagRequest::decode(
            Bytes::from_static(&[0xC4, 0x00, 0x02, 0x00, 0x04, 0, 0, 0, 9, 0, 0, 0]),
            true,
        )
        .unwrap();
        assert_eq!(req.offset, Some(4));
        assert_eq!(req.data.len(), 4);
    }

    #[test]
    fn test_unconnected_send() {
        let embedded = MessageRequest::new(0x4C, vec![0x91, 0x01, b'A', 0x00], vec![1, 0]);
        let send = UnconnectedSend {
            priority_tick: 0x0A,
            timeout_ticks: 0x0E,
            request: embedded.clone(),
            route: Bytes::from_static(&[0x01, 0x00]),
        };
        let mut buf = BytesMut::new();
        send.encode(&mut buf);
        let decoded = UnconnectedSend::decode(buf.freeze()).unwrap();
        assert_eq!(decoded.request, embedded);
        assert_eq!(&decoded.route[..], &[0x01, 0x00]);
    }
}
