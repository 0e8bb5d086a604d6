// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! encapsulation layer: header, commands and common packet format items

use crate::{status::EncapStatus, Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddrV4;

/// size of the encapsulation header
pub const HEADER_LEN: usize = 24;
/// largest body a header may declare
pub const MAX_BODY_LEN: usize = 65511;
/// supported encapsulation protocol version
pub const PROTOCOL_VERSION: u16 = 1;

const ITEM_NULL_ADDRESS: u16 = 0x0000;
const ITEM_LIST_IDENTITY: u16 = 0x000C;
const ITEM_CONNECTED_ADDRESS: u16 = 0x00A1;
const ITEM_CONNECTED_DATA: u16 = 0x00B1;
const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;
const ITEM_LIST_SERVICES: u16 = 0x0100;

/// encapsulation commands
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Command {
    /// 0x00, never answered
    Nop = 0x00,
    /// 0x04
    ListServices = 0x04,
    /// 0x63
    ListIdentity = 0x63,
    /// 0x64
    ListInterfaces = 0x64,
    /// 0x65
    RegisterSession = 0x65,
    /// 0x66, never answered
    UnRegisterSession = 0x66,
    /// 0x6F, unconnected messages
    SendRRData = 0x6F,
    /// 0x70, connected messages
    SendUnitData = 0x70,
}

impl Command {
    /// wire code
    #[inline(always)]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// decode a command code; unsupported codes give `None`
    #[inline]
    pub fn from_code(code: u16) -> Option<Self> {
        let v = match code {
            0x00 => Command::Nop,
            0x04 => Command::ListServices,
            0x63 => Command::ListIdentity,
            0x64 => Command::ListInterfaces,
            0x65 => Command::RegisterSession,
            0x66 => Command::UnRegisterSession,
            0x6F => Command::SendRRData,
            0x70 => Command::SendUnitData,
            _ => return None,
        };
        Some(v)
    }
}

/// encapsulation header, little endian on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncapHeader {
    /// command code
    pub command: u16,
    /// body length
    pub length: u16,
    /// session handle
    pub session: u32,
    /// encapsulation status
    pub status: u32,
    /// echoed verbatim in the reply
    pub context: [u8; 8],
    /// options
    pub options: u32,
}

impl EncapHeader {
    /// header for a request
    pub fn new(command: Command, session: u32) -> Self {
        Self {
            command: command.code(),
            session,
            ..Default::default()
        }
    }

    /// decode from at least [`HEADER_LEN`] bytes
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::NotEnoughData);
        }
        let command = buf.get_u16_le();
        let length = buf.get_u16_le();
        let session = buf.get_u32_le();
        let status = buf.get_u32_le();
        let mut context = [0_u8; 8];
        buf.copy_to_slice(&mut context);
        let options = buf.get_u32_le();
        Ok(Self {
            command,
            length,
            session,
            status,
            context,
            options,
        })
    }

    /// encode header
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.command);
        buf.put_u16_le(self.length);
        buf.put_u32_le(self.session);
        buf.put_u32_le(self.status);
        buf.put_slice(&self.context);
        buf.put_u32_le(self.options);
    }

    /// reply header echoing command, session and sender context
    #[inline]
    pub fn reply(&self, status: EncapStatus) -> Self {
        Self {
            command: self.command,
            length: 0,
            session: self.session,
            status: status.code(),
            context: self.context,
            options: 0,
        }
    }
}

/// one encapsulation packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// header; `length` is fixed up while encoding
    pub header: EncapHeader,
    /// command specific data
    pub body: Bytes,
}

impl Frame {
    /// new frame
    #[inline]
    pub fn new(header: EncapHeader, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// decoded command, if supported
    #[inline(always)]
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.header.command)
    }

    /// encode header and body
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(Error::TooMuchData);
        }
        buf.reserve(HEADER_LEN + self.body.len());
        let mut header = self.header.clone();
        header.length = self.body.len() as u16;
        header.encode(buf);
        buf.put_slice(&self.body);
        Ok(())
    }

    /// decode one complete frame; `buf` must hold it entirely
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let header = EncapHeader::decode(&mut buf)?;
        let len = header.length as usize;
        if buf.len() < len {
            return Err(Error::MalformedFrame("body shorter than header length"));
        }
        let body = buf.split_to(len);
        Ok(Self { header, body })
    }
}

/// body of RegisterSession, request and reply
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterSession {
    /// protocol version
    pub version: u16,
    /// option flags
    pub options: u16,
}

impl Default for RegisterSession {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            options: 0,
        }
    }
}

impl RegisterSession {
    /// decode
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::MalformedFrame("register session body too short"));
        }
        Ok(Self {
            version: buf.get_u16_le(),
            options: buf.get_u16_le(),
        })
    }

    /// encode
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.options);
    }
}

/// address item of the common packet format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressItem {
    /// unconnected
    Null,
    /// connected, with connection id
    Connected(u32),
}

/// body of SendRRData / SendUnitData
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendData {
    /// interface handle, always 0 for CIP
    pub interface: u32,
    /// timeout, seconds
    pub timeout: u16,
    /// address item
    pub address: AddressItem,
    /// sequence count of connected data items
    pub sequence: Option<u16>,
    /// CIP message
    pub data: Bytes,
}

impl SendData {
    /// unconnected message
    pub fn unconnected(data: impl Into<Bytes>) -> Self {
        Self {
            interface: 0,
            timeout: 0,
            address: AddressItem::Null,
            sequence: None,
            data: data.into(),
        }
    }

    /// connected message
    pub fn connected(conn_id: u32, sequence: u16, data: impl Into<Bytes>) -> Self {
        Self {
            interface: 0,
            timeout: 0,
            address: AddressItem::Connected(conn_id),
            sequence: Some(sequence),
            data: data.into(),
        }
    }

    /// connection id, for connected messages
    #[inline]
    pub fn conn_id(&self) -> Option<u32> {
        match self.address {
            AddressItem::Connected(id) => Some(id),
            AddressItem::Null => None,
        }
    }

    /// decode the common packet format.
    ///
    /// `Ok(None)` when the items are well framed but not the expected
    /// address/data pair; such requests get [`EncapStatus::IncorrectData`].
    pub fn decode(mut buf: Bytes) -> Result<Option<Self>> {
        if buf.len() < 8 {
            return Err(Error::MalformedFrame("send data too short"));
        }
        let interface = buf.get_u32_le();
        let timeout = buf.get_u16_le();
        let count = buf.get_u16_le();
        if count != 2 {
            return Ok(None);
        }
        let (addr_type, mut addr) = take_item(&mut buf)?;
        let address = match addr_type {
            ITEM_NULL_ADDRESS if addr.is_empty() => AddressItem::Null,
            ITEM_CONNECTED_ADDRESS if addr.len() == 4 => AddressItem::Connected(addr.get_u32_le()),
            _ => return Ok(None),
        };
        let (data_type, mut data) = take_item(&mut buf)?;
        let sequence = match (data_type, address) {
            (ITEM_UNCONNECTED_DATA, AddressItem::Null) => None,
            (ITEM_CONNECTED_DATA, AddressItem::Connected(_)) if data.len() >= 2 => {
                Some(data.get_u16_le())
            }
            _ => return Ok(None),
        };
        Ok(Some(Self {
            interface,
            timeout,
            address,
            sequence,
            data,
        }))
    }

    /// encode the common packet format
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.interface);
        buf.put_u16_le(self.timeout);
        buf.put_u16_le(2);
        match self.address {
            AddressItem::Null => {
                buf.put_u16_le(ITEM_NULL_ADDRESS);
                buf.put_u16_le(0);
            }
            AddressItem::Connected(id) => {
                buf.put_u16_le(ITEM_CONNECTED_ADDRESS);
                buf.put_u16_le(4);
                buf.put_u32_le(id);
            }
        }
        match self.sequence {
            Some(seq) => {
                buf.put_u16_le(ITEM_CONNECTED_DATA);
                buf.put_u16_le(self.data.len() as u16 + 2);
                buf.put_u16_le(seq);
            }
            None => {
                buf.put_u16_le(ITEM_UNCONNECTED_DATA);
                buf.put_u16_le(self.data.len() as u16);
            }
        }
        buf.put_slice(&self.data);
    }

    /// encoded bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 24);
        self.encode(&mut buf);
        buf.freeze()
    }
}

fn take_item(buf: &mut Bytes) -> Result<(u16, Bytes)> {
    if buf.len() < 4 {
        return Err(Error::MalformedFrame("item header truncated"));
    }
    let kind = buf.get_u16_le();
    let len = buf.get_u16_le() as usize;
    if buf.len() < len {
        return Err(Error::MalformedFrame("item data truncated"));
    }
    Ok((kind, buf.split_to(len)))
}

/// identity object values announced by ListIdentity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// vendor id
    pub vendor_id: u16,
    /// device type; 0x0C communications adapter
    pub device_type: u16,
    /// product code
    pub product_code: u16,
    /// major, minor revision
    pub revision: (u8, u8),
    /// status word
    pub status: u16,
    /// serial number
    pub serial_number: u32,
    /// product name, at most 32 bytes
    pub product_name: String,
    /// state; 3 operational
    pub state: u8,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            vendor_id: 1,
            device_type: 0x0C,
            product_code: 65001,
            revision: (21, 0),
            status: 0,
            serial_number: 1234,
            product_name: "plcconnector".to_owned(),
            state: 3,
        }
    }
}

impl Identity {
    /// body of a ListIdentity reply
    pub fn encode_list_identity<B: BufMut>(&self, addr: SocketAddrV4, buf: &mut B) {
        let name = self.product_name.as_bytes();
        let name = &name[..name.len().min(32)];
        // version + socket address + identity attributes
        let len = 2 + 16 + 14 + 1 + name.len() + 1;

        buf.put_u16_le(1);
        buf.put_u16_le(ITEM_LIST_IDENTITY);
        buf.put_u16_le(len as u16);
        buf.put_u16_le(PROTOCOL_VERSION);
        // sockaddr_in, big endian
        buf.put_u16(2);
        buf.put_u16(addr.port());
        buf.put_slice(&addr.ip().octets());
        buf.put_slice(&[0_u8; 8]);
        buf.put_u16_le(self.vendor_id);
        buf.put_u16_le(self.device_type);
        buf.put_u16_le(self.product_code);
        buf.put_u8(self.revision.0);
        buf.put_u8(self.revision.1);
        buf.put_u16_le(self.status);
        buf.put_u32_le(self.serial_number);
        buf.put_u8(name.len() as u8);
        buf.put_slice(name);
        buf.put_u8(self.state);
    }
}

/// body of a ListServices reply
pub fn encode_list_services<B: BufMut>(buf: &mut B) {
    const NAME: &[u8; 16] = b"Communications\0\0";
    // capability: CIP encapsulation over TCP
    const CAP_TCP: u16 = 0x0020;

    buf.put_u16_le(1);
    buf.put_u16_le(ITEM_LIST_SERVICES);
    buf.put_u16_le(20);
    buf.put_u16_le(PROTOCOL_VERSION);
    buf.put_u16_le(CAP_TCP);
    buf.put_slice(NAME);
}

/// body of a ListInterfaces reply: no interfaces
pub fn encode_list_interfaces<B: BufMut>(buf: &mut B) {
    buf.put_u16_le(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_header_layout() {
        let mut header = EncapHeader::new(Command::RegisterSession, 0);
        header.context = [1, 2, 3, 4, 5, 6, 7, 8];
        let frame = Frame::new(header, vec![1, 0, 0, 0]);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 28);
        assert_eq!(&buf[..4], &[0x65, 0, 4, 0]);
        assert_eq!(&buf[12..20], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let decoded = Frame::decode(buf.freeze()).unwrap();
        assert_eq!(decoded.command(), Some(Command::RegisterSession));
        assert_eq!(decoded.header.length, 4);
        assert_eq!(&decoded.body[..], &[1, 0, 0, 0]);
    }

    #[test]
    fn test_short_body() {
        let mut buf = BytesMut::new();
        let mut header = EncapHeader::new(Command::SendRRData, 1);
        header.length = 10;
        header.encode(&mut buf);
        buf.put_slice(&[0; 4]);
        assert!(Frame::decode(buf.freeze()).unwrap_err().is_fatal());
    }

    #[test]
    fn test_send_data() {
        let req = SendData::connected(0x1234_5678, 7, vec![0x4C, 0x02]);
        let bytes = req.to_bytes();
        assert_eq!(&bytes[6..8], &[2, 0]);
        assert_eq!(&bytes[8..12], &[0xA1, 0, 4, 0]);
        let decoded = SendData::decode(bytes).unwrap().unwrap();
        assert_eq!(decoded.conn_id(), Some(0x1234_5678));
        assert_eq!(decoded.sequence, Some(7));
        assert_eq!(&decoded.data[..], &[0x4C, 0x02]);

        let unconnected = SendData::unconnected(vec![1, 2, 3]);
        let decoded = SendData::decode(unconnected.to_bytes()).unwrap().unwrap();
        assert_eq!(decoded.conn_id(), None);
        assert_eq!(decoded.sequence, None);
    }

    #[test]
    fn test_send_data_bad_items() {
        // one item only
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(1);
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        assert_eq!(SendData::decode(buf.freeze()).unwrap(), None);

        // null address with connected data
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(2);
        buf.put_u16_le(ITEM_NULL_ADDRESS);
        buf.put_u16_le(0);
        buf.put_u16_le(ITEM_CONNECTED_DATA);
        buf.put_u16_le(2);
        buf.put_u16_le(1);
        assert_eq!(SendData::decode(buf.freeze()).unwrap(), None);

        // truncated data item
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(2);
        buf.put_u16_le(ITEM_NULL_ADDRESS);
        buf.put_u16_le(0);
        buf.put_u16_le(ITEM_UNCONNECTED_DATA);
        buf.put_u16_le(10);
        assert!(SendData::decode(buf.freeze()).is_err());
    }

    #[test]
    fn test_list_identity() {
        let identity = Identity::default();
        let mut buf = BytesMut::new();
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 44818);
        identity.encode_list_identity(addr, &mut buf);
        let item_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
        assert_eq!(buf.len(), 6 + item_len);
        // port big endian
        assert_eq!(&buf[10..12], &[0xAF, 0x12]);
        assert_eq!(&buf[12..16], &[192, 168, 1, 10]);
        assert_eq!(buf[buf.len() - 1], 3);
    }

    #[test]
    fn test_list_services() {
        let mut buf = BytesMut::new();
        encode_list_services(&mut buf);
        assert_eq!(buf.len(), 26);
        assert_eq!(&buf[10..24], b"Communications");
    }
}
