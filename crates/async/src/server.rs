// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::{
    codec::EncapCodec,
    dispatch::{Action, Dispatcher, Peer},
    session::SessionManager,
    Error, Options, Result,
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use plcconnector_core::{encap::Frame, EventDispatcher, TagRegistry};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs, UdpSocket},
    task::{JoinHandle, JoinSet},
    time,
};
use tokio_util::{codec::Framed, sync::CancellationToken};

/// the tag server; all tasks run on the current tokio runtime.
///
/// `Server` is cheap to clone; clones share the listeners and tables.
#[derive(Debug, Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    dispatcher: Dispatcher,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// new server over `registry`; events go to `events`
    pub fn new(registry: Arc<TagRegistry>, events: Arc<EventDispatcher>, options: Options) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(registry, events, options),
                token: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// the tag registry
    #[inline]
    pub fn registry(&self) -> &Arc<TagRegistry> {
        self.inner.dispatcher.registry()
    }

    /// the session tables
    #[inline]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        self.inner.dispatcher.sessions()
    }

    /// server settings
    #[inline]
    pub fn options(&self) -> &Options {
        self.inner.dispatcher.options()
    }

    /// has [`Server::shutdown`] been called?
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    fn check_running(&self) -> Result<()> {
        if self.is_shutdown() {
            Err(Error::Other("server is shut down".into()))
        } else {
            Ok(())
        }
    }

    /// listen for EtherNet/IP clients on `addr`, TCP and UDP; returns the bound address.
    ///
    /// the registry is frozen; tags must be added before.
    pub async fn serve<A: ToSocketAddrs>(&self, addr: A) -> Result<SocketAddr> {
        self.check_running()?;
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        self.registry().freeze();
        info!("listening on {}", local);

        let mut tasks = vec![tokio::spawn(accept_loop(self.inner.clone(), listener))];
        if self.options().discovery {
            match UdpSocket::bind(local).await {
                Ok(socket) => tasks.push(tokio::spawn(discovery_loop(self.inner.clone(), socket))),
                Err(e) => warn!("udp {}: {}", local, e),
            }
        }
        if self.options().idle_limit().is_some() {
            tasks.push(tokio::spawn(reaper(self.inner.clone())));
        }
        self.inner.tasks.lock().extend(tasks);
        Ok(local)
    }

    /// serve the status page on `addr`; returns the bound address
    #[cfg(feature = "http")]
    pub async fn serve_http<A: ToSocketAddrs>(&self, addr: A) -> Result<SocketAddr> {
        self.check_running()?;
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!("status page on http://{}", local);
        let task = tokio::spawn(crate::http::serve(
            listener,
            self.registry().clone(),
            self.inner.token.clone(),
        ));
        self.inner.tasks.lock().push(task);
        Ok(local)
    }

    /// stop all tasks and wait for them; closes every session
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("server task: {}", e);
            }
        }
        self.sessions().clear();
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    let mut conns = JoinSet::new();
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, addr)) => {
                    debug!("{} connected", addr);
                    conns.spawn(serve_conn(inner.clone(), stream, addr));
                }
                Err(e) => {
                    error!("accept: {}", e);
                    time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(res) = conns.join_next(), if !conns.is_empty() => {
                if let Err(e) = res {
                    warn!("connection task: {}", e);
                }
            }
        }
    }
    while conns.join_next().await.is_some() {}
}

/// one transport connection; requests are served strictly in order
async fn serve_conn(inner: Arc<Inner>, stream: TcpStream, addr: SocketAddr) {
    let local = match stream.local_addr() {
        Ok(local) => local,
        Err(e) => {
            warn!("{}: {}", addr, e);
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let idle = inner.dispatcher.options().idle_limit();
    let mut framed = Framed::new(stream, EncapCodec);
    let mut peer = Peer::new(addr, local);
    loop {
        let next = tokio::select! {
            _ = inner.token.cancelled() => break,
            res = next_frame(&mut framed, idle) => res,
        };
        let frame = match next {
            Err(_) => {
                info!("{} idle, closing", addr);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!("{}: {}", addr, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };
        match inner.dispatcher.handle_frame(&mut peer, frame) {
            Action::Reply(reply) => {
                if let Err(e) = framed.send(reply).await {
                    warn!("{}: {}", addr, e);
                    break;
                }
            }
            Action::Close(reply) => {
                if let Some(reply) = reply {
                    let _ = framed.send(reply).await;
                }
                break;
            }
            Action::Ignore => {}
        }
    }
    inner.dispatcher.disconnect(&mut peer);
    debug!("{} disconnected", addr);
}

async fn next_frame(
    framed: &mut Framed<TcpStream, EncapCodec>,
    idle: Option<Duration>,
) -> std::result::Result<Option<Result<Frame>>, time::error::Elapsed> {
    match idle {
        Some(idle) => time::timeout(idle, framed.next()).await,
        None => Ok(framed.next().await),
    }
}

/// ListIdentity/ListServices/ListInterfaces over UDP
async fn discovery_loop(inner: Arc<Inner>, socket: UdpSocket) {
    let local = match socket.local_addr() {
        Ok(local) => local,
        Err(e) => {
            warn!("udp: {}", e);
            return;
        }
    };
    let mut buf = vec![0_u8; 1500];
    loop {
        let (n, from) = tokio::select! {
            _ = inner.token.cancelled() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok(v) => v,
                Err(e) => {
                    debug!("udp: {}", e);
                    continue;
                }
            },
        };
        let frame = match Frame::decode(Bytes::copy_from_slice(&buf[..n])) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("udp {}: {}", from, e);
                continue;
            }
        };
        if let Some(reply) = inner.dispatcher.discovery(&frame, local) {
            let mut out = BytesMut::new();
            if reply.encode(&mut out).is_ok() {
                if let Err(e) = socket.send_to(&out, from).await {
                    debug!("udp {}: {}", from, e);
                }
            }
        }
    }
}

async fn reaper(inner: Arc<Inner>) {
    let mut ticker = time::interval(inner.dispatcher.options().reap_interval());
    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            _ = ticker.tick() => {
                inner.dispatcher.reap();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use plcconnector_core::{
        encap::{Command, EncapHeader},
        ElemType,
    };

    fn server() -> Server {
        let registry = Arc::new(TagRegistry::new());
        registry.add_tag("T1", ElemType::Dint, 1).unwrap();
        Server::new(registry, Arc::new(EventDispatcher::new()), Options::default())
    }

    #[test]
    fn test_serve_and_shutdown() -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let server = server();
            let addr = server.serve("127.0.0.1:0").await?;
            assert_ne!(addr.port(), 0);
            assert!(server.registry().is_frozen());

            let _stream = TcpStream::connect(addr).await?;
            server.shutdown().await;
            assert!(server.is_shutdown());
            assert!(server.serve("127.0.0.1:0").await.is_err());
            Ok(())
        })
    }

    #[test]
    fn test_udp_list_identity() -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let server = server();
            let addr = server.serve("127.0.0.1:0").await?;

            let socket = UdpSocket::bind("127.0.0.1:0").await?;
            let mut buf = BytesMut::new();
            Frame::new(EncapHeader::new(Command::ListIdentity, 0), Bytes::new()).encode(&mut buf)?;
            socket.send_to(&buf, addr).await?;

            let mut reply = vec![0_u8; 512];
            let (n, _) = time::timeout(Duration::from_secs(5), socket.recv_from(&mut reply)).await??;
            let frame = Frame::decode(Bytes::copy_from_slice(&reply[..n]))?;
            assert_eq!(frame.command(), Some(Command::ListIdentity));
            assert_eq!(frame.header.status, 0);
            // item count, then identity item type 0x0C
            assert_eq!(&frame.body[..4], &[1, 0, 0x0C, 0]);

            server.shutdown().await;
            Ok(())
        })
    }
}
