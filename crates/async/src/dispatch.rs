// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! executes decoded frames against the tag registry and the session tables

use crate::{
    options::Options,
    session::{ConnectionKey, SessionManager},
};
use bytes::{BufMut, Bytes, BytesMut};
use plcconnector_core::{
    cip::{
        ForwardCloseReply, ForwardCloseRequest, ForwardFailure, ForwardOpenReply, ForwardOpenRequest,
        MessageReply, MessageRequest, ReadTagRequest, UnconnectedSend, WriteTagRequest,
    },
    encap::{self, AddressItem, Command, EncapHeader, Frame, RegisterSession, SendData},
    path::{class, EPath},
    ElemType, EncapStatus, Error, Event, EventDispatcher, ReplyStatus, Result, Service, Status,
    TagData, TagRegistry, EXT_CONNECTION_NOT_FOUND,
};
use std::{
    cmp::Ordering,
    convert::TryFrom,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};

/// state of one transport connection
#[derive(Debug)]
pub(crate) struct Peer {
    pub addr: SocketAddr,
    pub local: SocketAddr,
    pub session: Option<u32>,
}

impl Peer {
    pub fn new(addr: SocketAddr, local: SocketAddr) -> Self {
        Self {
            addr,
            local,
            session: None,
        }
    }
}

/// what the transport does after a frame
#[derive(Debug)]
pub(crate) enum Action {
    Reply(Frame),
    /// send the frame if any, then close
    Close(Option<Frame>),
    Ignore,
}

/// result of one executed service
struct Outcome {
    status: ReplyStatus,
    data: Bytes,
    tag: Option<TagData>,
}

impl Outcome {
    #[inline]
    fn ok(data: Bytes, tag: Option<TagData>) -> Self {
        Self {
            status: ReplyStatus::OK,
            data,
            tag,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Dispatcher {
    registry: Arc<TagRegistry>,
    sessions: Arc<SessionManager>,
    events: Arc<EventDispatcher>,
    options: Options,
}

impl Dispatcher {
    pub fn new(registry: Arc<TagRegistry>, events: Arc<EventDispatcher>, options: Options) -> Self {
        let sessions = Arc::new(SessionManager::new(
            options.max_sessions,
            options.max_connections,
        ));
        Self {
            registry,
            sessions,
            events,
            options,
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    #[inline]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    fn emit(&self, event: Event) {
        self.events.dispatch(event);
    }

    /// handle one frame received on a transport connection
    pub fn handle_frame(&self, peer: &mut Peer, frame: Frame) -> Action {
        let command = match frame.command() {
            Some(c) => c,
            None => {
                warn!(
                    "{}: unsupported command {:#06x}",
                    peer.addr, frame.header.command
                );
                let reply = Frame::new(frame.header.reply(EncapStatus::InvalidCommand), Bytes::new());
                return Action::Close(Some(reply));
            }
        };
        match command {
            Command::Nop => Action::Ignore,
            Command::ListIdentity | Command::ListServices | Command::ListInterfaces => {
                Action::Reply(self.discovery_reply(&frame.header, command, peer.local))
            }
            Command::RegisterSession => self.register_session(peer, frame),
            Command::UnRegisterSession => {
                if peer.session == Some(frame.header.session) {
                    self.disconnect(peer);
                }
                Action::Close(None)
            }
            Command::SendRRData | Command::SendUnitData => self.send_data(peer, command, frame),
        }
    }

    /// reply to discovery commands; `None` for anything else
    pub fn discovery(&self, frame: &Frame, local: SocketAddr) -> Option<Frame> {
        match frame.command()? {
            cmd @ (Command::ListIdentity | Command::ListServices | Command::ListInterfaces) => {
                Some(self.discovery_reply(&frame.header, cmd, local))
            }
            _ => None,
        }
    }

    fn discovery_reply(&self, header: &EncapHeader, command: Command, local: SocketAddr) -> Frame {
        let mut body = BytesMut::new();
        match command {
            Command::ListIdentity => {
                let addr = match local {
                    SocketAddr::V4(addr) => addr,
                    SocketAddr::V6(addr) => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, addr.port()),
                };
                self.options.identity.encode_list_identity(addr, &mut body);
            }
            Command::ListServices => encap::encode_list_services(&mut body),
            _ => encap::encode_list_interfaces(&mut body),
        }
        Frame::new(header.reply(EncapStatus::Success), body.freeze())
    }

    /// the transport connection is gone
    pub fn disconnect(&self, peer: &mut Peer) {
        if let Some(handle) = peer.session.take() {
            self.sessions.unregister(handle);
        }
    }

    /// close idle connections; one `(Reset, Success)` event each
    pub fn reap(&self) -> usize {
        let idle = match self.options.idle_limit() {
            Some(idle) => idle,
            None => return 0,
        };
        let closed = self.sessions.reap(idle);
        for conn in closed.iter() {
            info!("connection {:#010x} idle, closed", conn.ot_id);
            self.emit(Event::new(Service::Reset, Status::Success, None));
        }
        closed.len()
    }

    fn register_session(&self, peer: &mut Peer, frame: Frame) -> Action {
        let mut body = frame.body.clone();
        let req = match RegisterSession::decode(&mut body) {
            Ok(req) => req,
            Err(e) => {
                warn!("{}: {}", peer.addr, e);
                return Action::Close(None);
            }
        };
        let mut reply = BytesMut::with_capacity(4);
        RegisterSession::default().encode(&mut reply);
        let reply = reply.freeze();

        if req.version > encap::PROTOCOL_VERSION {
            warn!("{}: unsupported protocol version {}", peer.addr, req.version);
            let header = frame.header.reply(EncapStatus::UnsupportedProtocol);
            return Action::Reply(Frame::new(header, reply));
        }
        // a new registration replaces the previous one
        self.disconnect(peer);
        match self.sessions.register(peer.addr) {
            Ok(handle) => {
                peer.session = Some(handle);
                let mut header = frame.header.reply(EncapStatus::Success);
                header.session = handle;
                Action::Reply(Frame::new(header, reply))
            }
            Err(e) => {
                warn!("{}: {}", peer.addr, e);
                let header = frame.header.reply(EncapStatus::InsufficientMemory);
                Action::Reply(Frame::new(header, reply))
            }
        }
    }

    fn send_data(&self, peer: &mut Peer, command: Command, frame: Frame) -> Action {
        let header = &frame.header;
        let incorrect = || Action::Reply(Frame::new(header.reply(EncapStatus::IncorrectData), Bytes::new()));
        let req = match SendData::decode(frame.body.clone()) {
            Ok(Some(req)) => req,
            Ok(None) => {
                debug!("{}: unexpected packet items", peer.addr);
                return incorrect();
            }
            Err(e) => {
                warn!("{}: {}", peer.addr, e);
                return Action::Close(None);
            }
        };
        let session = match peer.session {
            Some(s) if s == header.session && self.sessions.touch(s).is_ok() => s,
            _ => {
                debug!("{}: invalid session {:#010x}", peer.addr, header.session);
                if let Some((_, service)) = peek_service(&req.data) {
                    self.emit(Event::new(service, Status::ConnectionFailure, None));
                }
                let reply = header.reply(EncapStatus::InvalidSessionHandle);
                return Action::Reply(Frame::new(reply, Bytes::new()));
            }
        };

        let result = match (command, req.address) {
            (Command::SendRRData, AddressItem::Null) => self
                .process(session, req.data, self.options.reply_budget, false)
                .map(SendData::unconnected),
            (Command::SendUnitData, AddressItem::Connected(id)) => {
                let seq = req.sequence.unwrap_or_default();
                match self.sessions.connection(session, id) {
                    Ok(conn) => self
                        .process(session, req.data, conn.max_data, false)
                        .map(|data| SendData::connected(conn.to_id, seq, data)),
                    Err(e) => {
                        debug!("{}: connection {:#010x}: {}", peer.addr, id, e);
                        Ok(SendData::connected(id, seq, self.reject(&req.data)))
                    }
                }
            }
            _ => return incorrect(),
        };
        match result {
            Ok(reply) => {
                let body = reply.to_bytes();
                Action::Reply(Frame::new(header.reply(EncapStatus::Success), body))
            }
            Err(e) => {
                warn!("{}: {}", peer.addr, e);
                Action::Close(None)
            }
        }
    }

    /// reply to a connected request whose connection is unknown
    fn reject(&self, data: &Bytes) -> Bytes {
        let code = match peek_service(data) {
            Some((code, service)) => {
                self.emit(Event::new(service, Status::ConnectionFailure, None));
                code
            }
            None => 0,
        };
        let status = ReplyStatus::with_extended(Status::ConnectionFailure, EXT_CONNECTION_NOT_FOUND);
        MessageReply::new(code, status, Bytes::new()).to_bytes()
    }

    /// execute one message router request; only fatal errors are returned
    fn process(&self, session: u32, data: Bytes, budget: usize, nested: bool) -> Result<Bytes> {
        let code = data.first().copied().unwrap_or_default();
        let req = match MessageRequest::decode(data) {
            Ok(req) => req,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("request {:#04x}: {}", code, e);
                return Ok(MessageReply::new(code, Status::NotEnoughData, Bytes::new()).to_bytes());
            }
        };
        let path = req.epath();
        let class = path.as_ref().ok().and_then(EPath::class);
        let service = Service::from_code(req.service, class);
        if service == Service::UnconnectedSend && !nested {
            return self.unconnected_send(session, req.data);
        }

        let res = match service {
            Service::ReadTag => path.and_then(|p| self.read_tag(&p, req.data, false, budget)),
            Service::ReadTagFragmented => path.and_then(|p| self.read_tag(&p, req.data, true, budget)),
            Service::WriteTag => path.and_then(|p| self.write_tag(&p, req.data, false)),
            Service::WriteTagFragmented => path.and_then(|p| self.write_tag(&p, req.data, true)),
            Service::ForwardOpen => self.forward_open(session, req.data),
            Service::ForwardClose => self.forward_close(session, req.data),
            Service::Reset => self.reset(&req.data),
            Service::UnconnectedSend => Err(Error::InvalidPath("multi hop routing")),
            Service::Unknown(code) => Err(Error::UnknownService(code)),
        };
        let (status, data, tag) = match res {
            Ok(outcome) => (outcome.status, outcome.data, outcome.tag),
            Err(e) => {
                debug!("{}: {}", service, e);
                (ReplyStatus::from_error(service, &e), Bytes::new(), None)
            }
        };
        debug!("{} -> {}", service, status.general);
        self.emit(Event::new(service, status.general, tag));
        Ok(MessageReply::new(req.service, status, data).to_bytes())
    }

    fn unconnected_send(&self, session: u32, data: Bytes) -> Result<Bytes> {
        match UnconnectedSend::decode(data) {
            Ok(send) => self.process(session, send.request.to_bytes(), self.options.reply_budget, true),
            Err(e) => {
                debug!("{}: {}", Service::UnconnectedSend, e);
                let status = ReplyStatus::from_error(Service::UnconnectedSend, &e);
                self.emit(Event::new(Service::UnconnectedSend, status.general, None));
                let reply = MessageReply::new(Service::UnconnectedSend.code(), status, Bytes::new());
                Ok(reply.to_bytes())
            }
        }
    }

    fn read_tag(&self, path: &EPath, data: Bytes, fragmented: bool, budget: usize) -> Result<Outcome> {
        let addr = path.tag_address()?;
        let name = self.registry.resolve(&addr.key)?;
        let req = ReadTagRequest::decode(data, fragmented)?;
        let mut tag = self
            .registry
            .read_tag(&name, addr.element as usize, req.count as usize)?;
        if let Some(offset) = req.offset {
            let offset = offset as usize;
            if offset > 0 && offset >= tag.data.len() {
                return Err(Error::OutOfRange {
                    name: tag.name,
                    end: offset,
                    size: tag.data.len(),
                });
            }
            tag.data.drain(..offset);
        }

        let width = tag.elem_type.width();
        let mut status = ReplyStatus::OK;
        if tag.data.len() > budget {
            status = ReplyStatus::new(Status::PartialTransfer);
            let keep = if width > budget {
                budget
            } else {
                budget / width * width
            };
            tag.data.truncate(keep);
        }
        tag.count = tag.data.len() / width;

        let mut buf = BytesMut::with_capacity(2 + tag.data.len());
        buf.put_u16_le(tag.elem_type.code());
        buf.put_slice(&tag.data);
        Ok(Outcome {
            status,
            data: buf.freeze(),
            tag: Some(tag),
        })
    }

    fn write_tag(&self, path: &EPath, data: Bytes, fragmented: bool) -> Result<Outcome> {
        let addr = path.tag_address()?;
        let name = self.registry.resolve(&addr.key)?;
        let req = WriteTagRequest::decode(data, fragmented)?;
        let wire_type = ElemType::try_from(req.type_code)?;
        let info = self.registry.info(&name)?;
        if wire_type != info.elem_type {
            return Err(Error::TypeMismatch {
                expected: info.elem_type,
                found: req.type_code,
            });
        }

        let width = info.elem_type.width();
        let total = req.count as usize * width;
        let base = (addr.element as usize).saturating_mul(width);
        let offset = match req.offset {
            None => {
                match req.data.len().cmp(&total) {
                    Ordering::Less => return Err(Error::NotEnoughData),
                    Ordering::Greater => return Err(Error::TooMuchData),
                    Ordering::Equal => {}
                }
                base
            }
            Some(offset) => {
                let offset = offset as usize;
                if offset + req.data.len() > total {
                    return Err(Error::TooMuchData);
                }
                base.saturating_add(offset)
            }
        };
        self.registry
            .write_bytes(&name, offset, req.type_code, &req.data)?;

        let tag = TagData {
            name: info.name,
            elem_type: info.elem_type,
            count: req.data.len() / width,
            data: req.data.to_vec(),
        };
        Ok(Outcome::ok(Bytes::new(), Some(tag)))
    }

    fn forward_open(&self, session: u32, data: Bytes) -> Result<Outcome> {
        let req = ForwardOpenRequest::decode(data)?;
        let opened = self.check_connection_path(&req.path).and_then(|_| {
            let max_data = (req.to_packet_size() as usize).saturating_sub(32);
            self.sessions.open(session, &req, max_data)
        });
        let ot_id = match opened {
            Ok(id) => id,
            Err(e) => {
                let failure = ForwardFailure {
                    conn_serial: req.conn_serial,
                    vendor_id: req.vendor_id,
                    orig_serial: req.orig_serial,
                    remaining_path: remaining_path(&e, &req.path),
                };
                return Ok(forward_failure(Service::ForwardOpen, &e, failure));
            }
        };

        let reply = ForwardOpenReply {
            ot_conn_id: ot_id,
            to_conn_id: req.to_conn_id,
            conn_serial: req.conn_serial,
            vendor_id: req.vendor_id,
            orig_serial: req.orig_serial,
            ot_api: req.ot_rpi,
            to_api: req.to_rpi,
        };
        let mut buf = BytesMut::with_capacity(26);
        reply.encode(&mut buf);
        Ok(Outcome::ok(buf.freeze(), None))
    }

    /// the message router, or a symbol naming an existing tag
    fn check_connection_path(&self, raw: &[u8]) -> Result<()> {
        let path = EPath::decode(raw)?;
        if path.is_empty() {
            return Err(Error::InvalidPath("empty connection path"));
        }
        if path.class() == Some(class::MESSAGE_ROUTER) {
            return Ok(());
        }
        if path.symbol().is_some() {
            let addr = path.tag_address()?;
            self.registry.resolve(&addr.key)?;
            return Ok(());
        }
        Err(Error::InvalidPath("connection path does not resolve"))
    }

    fn forward_close(&self, session: u32, data: Bytes) -> Result<Outcome> {
        let req = ForwardCloseRequest::decode(data)?;
        let key = ConnectionKey {
            conn_serial: req.conn_serial,
            vendor_id: req.vendor_id,
            orig_serial: req.orig_serial,
        };
        if let Err(e) = self.sessions.close(session, key) {
            let failure = ForwardFailure {
                conn_serial: req.conn_serial,
                vendor_id: req.vendor_id,
                orig_serial: req.orig_serial,
                remaining_path: 0,
            };
            return Ok(forward_failure(Service::ForwardClose, &e, failure));
        }

        let reply = ForwardCloseReply {
            conn_serial: req.conn_serial,
            vendor_id: req.vendor_id,
            orig_serial: req.orig_serial,
        };
        let mut buf = BytesMut::with_capacity(10);
        reply.encode(&mut buf);
        Ok(Outcome::ok(buf.freeze(), None))
    }

    /// closes every connection; tag data is kept
    fn reset(&self, data: &[u8]) -> Result<Outcome> {
        if data.first().map(|b| *b > 1).unwrap_or(false) {
            return Ok(Outcome {
                status: ReplyStatus::new(Status::InvalidParameter),
                data: Bytes::new(),
                tag: None,
            });
        }
        self.sessions.reset_all();
        Ok(Outcome::ok(Bytes::new(), None))
    }
}

/// failed ForwardOpen/ForwardClose; the reply still echoes the serial triple
fn forward_failure(service: Service, err: &Error, body: ForwardFailure) -> Outcome {
    debug!("{}: {}", service, err);
    let mut buf = BytesMut::with_capacity(10);
    body.encode(&mut buf);
    Outcome {
        status: ReplyStatus::from_error(service, err),
        data: buf.freeze(),
        tag: None,
    }
}

/// connection path words left unprocessed by a failed ForwardOpen
fn remaining_path(err: &Error, path: &[u8]) -> u8 {
    match err {
        Error::InvalidPath(_) | Error::UnknownTag(_) | Error::InvalidTag(_) => {
            (path.len() / 2).min(u8::MAX as usize) as u8
        }
        _ => 0,
    }
}

/// service code and service of a raw request
fn peek_service(data: &Bytes) -> Option<(u8, Service)> {
    let req = MessageRequest::decode(data.clone()).ok()?;
    let class = req.epath().ok().and_then(|p| p.class());
    Some((req.service, Service::from_code(req.service, class)))
}
