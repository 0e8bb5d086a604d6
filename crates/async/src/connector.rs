// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use crate::{Options, Result, Server};
use plcconnector_core::{
    DebugLevel, ElemType, Event, EventDispatcher, Handler, Service, Status, TagData, TagRegistry,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::runtime::{self, Runtime};

/// blocking facade over [`Server`] with its own tokio runtime.
///
/// # Note
/// do not call or drop a `Connector` from inside another tokio runtime; use [`Server`] there.
#[derive(Debug)]
pub struct Connector {
    runtime: Runtime,
    events: Arc<EventDispatcher>,
    server: Server,
}

impl Connector {
    /// connector with default options
    #[inline]
    pub fn init() -> Result<Self> {
        Self::new(Options::default())
    }

    /// build the runtime and an empty tag registry
    pub fn new(options: Options) -> Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .thread_name("plcconnector")
            .enable_all()
            .build()?;
        let events = Arc::new(EventDispatcher::new());
        let server = Server::new(Arc::new(TagRegistry::new()), events.clone(), options);
        Ok(Self {
            runtime,
            events,
            server,
        })
    }

    /// the tag registry
    #[inline]
    pub fn registry(&self) -> &Arc<TagRegistry> {
        self.server.registry()
    }

    /// the server, for use inside [`Connector::runtime`]
    #[inline]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// the runtime the server runs on
    #[inline]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// add a zero filled tag; only before [`Connector::serve`]
    #[inline]
    pub fn add_tag(&self, name: impl AsRef<str>, elem_type: ElemType, count: usize) -> Result<()> {
        self.registry().add_tag(name, elem_type, count)?;
        Ok(())
    }

    /// log requests (`true`) or only problems (`false`)
    #[inline]
    pub fn set_verbose(&self, verbose: bool) {
        plcconnector_log::set_verbose(verbose);
    }

    /// set the diagnostic level
    #[inline]
    pub fn set_debug_level(&self, level: DebugLevel) {
        plcconnector_log::set_debug_level(level);
    }

    /// receive every event with a closure; replaces the previous handler
    #[inline]
    pub fn callback<F>(&self, f: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.events.set_fn(f);
    }

    /// receive events with `handler`; replaces the previous handler
    #[inline]
    pub fn register_handler(&self, handler: impl Handler) {
        self.events.set_handler(handler);
    }

    /// start serving EtherNet/IP clients; returns once listening
    pub fn serve(&self, addr: &str, port: u16) -> Result<SocketAddr> {
        self.runtime.block_on(self.server.serve((addr, port)))
    }

    /// start the status page; returns once listening
    #[cfg(feature = "http")]
    pub fn serve_http(&self, addr: &str, port: u16) -> Result<SocketAddr> {
        self.runtime.block_on(self.server.serve_http((addr, port)))
    }

    /// local write of raw element bytes starting at element `offset`.
    ///
    /// emits a `(WriteTag, Success)` event unless disabled by
    /// [`Options::notify_local_updates`].
    pub fn update_tag(&self, name: &str, offset: usize, bytes: &[u8]) -> Result<()> {
        let registry = self.registry();
        registry.update_tag(name, offset, bytes)?;
        if self.server.options().notify_local_updates {
            let info = registry.info(name)?;
            let tag = TagData {
                count: bytes.len() / info.elem_type.width(),
                name: info.name,
                elem_type: info.elem_type,
                data: bytes.to_vec(),
            };
            self.events
                .dispatch(Event::new(Service::WriteTag, Status::Success, Some(tag)));
        }
        Ok(())
    }

    /// local read of `count` elements starting at element `offset`
    #[inline]
    pub fn read_tag(&self, name: &str, offset: usize, count: usize) -> Result<TagData> {
        Ok(self.registry().read_tag(name, offset, count)?)
    }

    /// stop serving and close every session; calling it again does nothing
    pub fn close(&self) {
        if self.server.is_shutdown() {
            return;
        }
        self.runtime.block_on(self.server.shutdown());
        info!("connector closed");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parking_lot::Mutex;
    use plcconnector_core::{Error as CoreError, Value};

    #[test]
    fn test_update_tag_notifies() -> anyhow::Result<()> {
        let connector = Connector::init()?;
        connector.add_tag("T1", ElemType::Dint, 100)?;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        connector.callback(move |e| sink.lock().push(e));

        connector.update_tag("T1", 50, &42_i32.to_le_bytes())?;
        let data = connector.read_tag("T1", 50, 1)?;
        assert_eq!(data.values(), vec![Value::Dint(42)]);

        let err = connector.update_tag("T1", 100, &[0; 4]).unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OutOfRange { .. })));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].service, Service::WriteTag);
        assert_eq!(seen[0].tag.as_ref().unwrap().count, 1);
        Ok(())
    }

    #[test]
    fn test_quiet_local_updates() -> anyhow::Result<()> {
        let mut opts = Options::default();
        opts.notify_local_updates(false);
        let connector = Connector::new(opts)?;
        connector.add_tag("T1", ElemType::Real, 1)?;
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        connector.callback(move |_| *sink.lock() += 1);
        connector.update_tag("T1", 0, &1.5_f32.to_le_bytes())?;
        assert_eq!(*seen.lock(), 0);
        Ok(())
    }

    #[test]
    fn test_serve_close() -> anyhow::Result<()> {
        let connector = Connector::init()?;
        connector.add_tag("T1", ElemType::Dint, 1)?;
        let addr = connector.serve("127.0.0.1", 0)?;
        assert_ne!(addr.port(), 0);
        assert!(matches!(
            connector.add_tag("late", ElemType::Dint, 1).unwrap_err().as_core(),
            Some(CoreError::RegistryFrozen)
        ));
        connector.close();
        connector.close();
        assert!(connector.serve("127.0.0.1", 0).is_err());
        Ok(())
    }
}
