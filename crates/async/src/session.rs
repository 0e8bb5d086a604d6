// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! registered sessions and open CIP connections
//!
//! Both tables live behind one lock; a connection never outlives its session.

use parking_lot::Mutex;
use plcconnector_core::{cip::ForwardOpenRequest, Error, Result};
use rand::Rng;
use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

/// identifies a connection across ForwardOpen and ForwardClose
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// connection serial number
    pub conn_serial: u16,
    /// originator vendor id
    pub vendor_id: u16,
    /// originator serial number
    pub orig_serial: u32,
}

/// a registered session
#[derive(Debug, Clone)]
pub struct Session {
    /// session handle
    pub handle: u32,
    /// remote address
    pub peer: SocketAddr,
    /// registration time
    pub created: Instant,
    /// last request
    pub last_active: Instant,
}

/// an open CIP connection
#[derive(Debug, Clone)]
pub struct Connection {
    /// O->T id, allocated by the server
    pub ot_id: u32,
    /// T->O id, chosen by the client
    pub to_id: u32,
    /// serial triple
    pub key: ConnectionKey,
    /// owning session
    pub session: u32,
    /// tag data budget of replies
    pub max_data: usize,
    /// O->T requested packet interval
    pub ot_rpi: u32,
    /// T->O requested packet interval
    pub to_rpi: u32,
    /// last request
    pub last_active: Instant,
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<u32, Session>,
    connections: HashMap<u32, Connection>,
}

impl Tables {
    fn drop_session_connections(&mut self, handle: u32) -> usize {
        let before = self.connections.len();
        self.connections.retain(|_, c| c.session != handle);
        before - self.connections.len()
    }
}

/// session and connection tables
#[derive(Debug)]
pub struct SessionManager {
    tables: Mutex<Tables>,
    max_sessions: usize,
    max_connections: usize,
}

/// random non-zero id not in use
fn alloc_id<T>(used: &HashMap<u32, T>) -> u32 {
    let mut rng = rand::thread_rng();
    loop {
        let id: u32 = rng.gen();
        if id != 0 && !used.contains_key(&id) {
            return id;
        }
    }
}

impl SessionManager {
    /// empty tables with the given limits
    pub fn new(max_sessions: usize, max_connections: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            max_sessions,
            max_connections,
        }
    }

    /// register a session for `peer`; returns the new handle
    pub fn register(&self, peer: SocketAddr) -> Result<u32> {
        let mut tables = self.tables.lock();
        if tables.sessions.len() >= self.max_sessions {
            return Err(Error::ResourceExhausted("session table full"));
        }
        let handle = alloc_id(&tables.sessions);
        let now = Instant::now();
        tables.sessions.insert(
            handle,
            Session {
                handle,
                peer,
                created: now,
                last_active: now,
            },
        );
        info!("session {:#010x} registered for {}", handle, peer);
        Ok(handle)
    }

    /// remove a session and its connections; returns the number of connections closed
    pub fn unregister(&self, handle: u32) -> usize {
        let mut tables = self.tables.lock();
        if tables.sessions.remove(&handle).is_none() {
            return 0;
        }
        let n = tables.drop_session_connections(handle);
        info!("session {:#010x} closed, {} connection(s) dropped", handle, n);
        n
    }

    /// is `handle` registered?
    #[inline]
    pub fn is_registered(&self, handle: u32) -> bool {
        self.tables.lock().sessions.contains_key(&handle)
    }

    /// record activity on a session
    pub fn touch(&self, handle: u32) -> Result<()> {
        let mut tables = self.tables.lock();
        let session = tables
            .sessions
            .get_mut(&handle)
            .ok_or(Error::InvalidSession)?;
        session.last_active = Instant::now();
        Ok(())
    }

    /// open a connection owned by `session`; returns the allocated O->T id.
    ///
    /// a connection with the same serial triple is replaced.
    pub fn open(&self, session: u32, req: &ForwardOpenRequest, max_data: usize) -> Result<u32> {
        let mut tables = self.tables.lock();
        if !tables.sessions.contains_key(&session) {
            return Err(Error::InvalidSession);
        }
        let key = ConnectionKey {
            conn_serial: req.conn_serial,
            vendor_id: req.vendor_id,
            orig_serial: req.orig_serial,
        };
        tables
            .connections
            .retain(|_, c| !(c.session == session && c.key == key));
        if tables.connections.len() >= self.max_connections {
            return Err(Error::ResourceExhausted("connection table full"));
        }
        let ot_id = alloc_id(&tables.connections);
        tables.connections.insert(
            ot_id,
            Connection {
                ot_id,
                to_id: req.to_conn_id,
                key,
                session,
                max_data,
                ot_rpi: req.ot_rpi,
                to_rpi: req.to_rpi,
                last_active: Instant::now(),
            },
        );
        info!(
            "connection {:#010x} opened on session {:#010x}, serial {}",
            ot_id, session, key.conn_serial
        );
        Ok(ot_id)
    }

    /// close the connection of `session` matching `key`
    pub fn close(&self, session: u32, key: ConnectionKey) -> Result<Connection> {
        let mut tables = self.tables.lock();
        let ot_id = tables
            .connections
            .values()
            .find(|c| c.session == session && c.key == key)
            .map(|c| c.ot_id)
            .ok_or(Error::InvalidSession)?;
        let conn = tables
            .connections
            .remove(&ot_id)
            .ok_or(Error::InvalidSession)?;
        info!("connection {:#010x} closed", ot_id);
        Ok(conn)
    }

    /// the connection `ot_id` of `session`; records activity
    pub fn connection(&self, session: u32, ot_id: u32) -> Result<Connection> {
        let mut tables = self.tables.lock();
        let conn = tables
            .connections
            .get_mut(&ot_id)
            .filter(|c| c.session == session)
            .ok_or(Error::InvalidSession)?;
        conn.last_active = Instant::now();
        Ok(conn.clone())
    }

    /// close every connection of every session; returns the number closed
    pub fn reset_all(&self) -> usize {
        let mut tables = self.tables.lock();
        let n = tables.connections.len();
        tables.connections.clear();
        if n > 0 {
            info!("reset: {} connection(s) closed", n);
        }
        n
    }

    /// close connections idle for longer than `idle`
    pub fn reap(&self, idle: Duration) -> Vec<Connection> {
        let now = Instant::now();
        let mut tables = self.tables.lock();
        let expired: Vec<u32> = tables
            .connections
            .values()
            .filter(|c| now.saturating_duration_since(c.last_active) > idle)
            .map(|c| c.ot_id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| tables.connections.remove(&id))
            .collect()
    }

    /// drop everything
    pub fn clear(&self) {
        let mut tables = self.tables.lock();
        tables.connections.clear();
        tables.sessions.clear();
    }

    /// number of sessions
    pub fn session_count(&self) -> usize {
        self.tables.lock().sessions.len()
    }

    /// number of connections
    pub fn connection_count(&self) -> usize {
        self.tables.lock().connections.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn forward_open(serial: u16) -> ForwardOpenRequest {
        ForwardOpenRequest {
            to_conn_id: 0xAABB_0000 + serial as u32,
            conn_serial: serial,
            vendor_id: 0x1337,
            orig_serial: 42,
            ot_rpi: 2_000_000,
            to_rpi: 2_000_000,
            ..Default::default()
        }
    }

    fn key(serial: u16) -> ConnectionKey {
        ConnectionKey {
            conn_serial: serial,
            vendor_id: 0x1337,
            orig_serial: 42,
        }
    }

    #[test]
    fn test_register_limit() {
        let mgr = SessionManager::new(2, 4);
        let a = mgr.register(peer()).unwrap();
        let b = mgr.register(peer()).unwrap();
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert!(matches!(
            mgr.register(peer()),
            Err(Error::ResourceExhausted(_))
        ));
        mgr.unregister(a);
        assert!(!mgr.is_registered(a));
        assert!(mgr.register(peer()).is_ok());
    }

    #[test]
    fn test_open_close() {
        let mgr = SessionManager::new(4, 2);
        let s = mgr.register(peer()).unwrap();
        assert_eq!(mgr.open(0x1234, &forward_open(1), 100), Err(Error::InvalidSession));

        let id = mgr.open(s, &forward_open(1), 468).unwrap();
        assert_ne!(id, 0);
        let conn = mgr.connection(s, id).unwrap();
        assert_eq!(conn.max_data, 468);
        assert_eq!(conn.to_id, 0xAABB_0001);
        // other sessions can not use it
        assert!(mgr.connection(s.wrapping_add(1), id).is_err());

        mgr.open(s, &forward_open(2), 100).unwrap();
        assert_eq!(
            mgr.open(s, &forward_open(3), 100),
            Err(Error::ResourceExhausted("connection table full"))
        );
        // same triple replaces
        mgr.open(s, &forward_open(2), 200).unwrap();
        assert_eq!(mgr.connection_count(), 2);

        assert_eq!(mgr.close(s, key(9)).unwrap_err(), Error::InvalidSession);
        assert_eq!(mgr.close(s, key(1)).unwrap().ot_id, id);
        assert!(mgr.connection(s, id).is_err());
    }

    #[test]
    fn test_unregister_drops_connections() {
        let mgr = SessionManager::new(4, 8);
        let a = mgr.register(peer()).unwrap();
        let b = mgr.register(peer()).unwrap();
        mgr.open(a, &forward_open(1), 100).unwrap();
        mgr.open(a, &forward_open(2), 100).unwrap();
        mgr.open(b, &forward_open(1), 100).unwrap();
        assert_eq!(mgr.unregister(a), 2);
        assert_eq!(mgr.connection_count(), 1);
        assert_eq!(mgr.reset_all(), 1);
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn test_reap() {
        let mgr = SessionManager::new(4, 8);
        let s = mgr.register(peer()).unwrap();
        let idle = mgr.open(s, &forward_open(1), 100).unwrap();
        let busy = mgr.open(s, &forward_open(2), 100).unwrap();
        thread::sleep(Duration::from_millis(60));
        mgr.connection(s, busy).unwrap();
        let closed = mgr.reap(Duration::from_millis(30));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].ot_id, idle);
        assert!(mgr.connection(s, busy).is_ok());
    }
}
