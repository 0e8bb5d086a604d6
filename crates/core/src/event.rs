// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! request notifications for the embedding application

use crate::{registry::TagData, service::Service, status::Status};
use parking_lot::RwLock;
use std::{collections::HashSet, fmt, panic, sync::Arc};

/// one completed request, local update or cleanup.
///
/// the event is moved into the handler; nothing is kept by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// service
    pub service: Service,
    /// general status
    pub status: Status,
    /// affected tag data; `None` for Reset, Forward* and failed lookups
    pub tag: Option<TagData>,
}

impl Event {
    /// new event
    #[inline]
    pub fn new(service: Service, status: Status, tag: Option<TagData>) -> Self {
        Self {
            service,
            status,
            tag,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service, self.status)?;
        if let Some(ref tag) = self.tag {
            write!(f, " {} {}[{}]", tag.name, tag.elem_type, tag.count)?;
        }
        Ok(())
    }
}

/// receives events
pub trait Handler: Send + Sync + 'static {
    /// called once per event, on the task that completed the request
    fn invoke(&self, event: Event);
}

/// closure handler with an optional service filter, see [`listen`]
pub struct HandlerImpl<F: Fn(Event) + Send + Sync + 'static> {
    interest: Option<HashSet<Service>>,
    cb: F,
}

/// build a handler from a closure.
///
/// By default, the handler receives all events.
///
/// # Examples
/// ```rust
/// use plcconnector_core::{event::listen, EventDispatcher, Service};
///
/// let dispatcher = EventDispatcher::new();
/// dispatcher.set_handler(
///     listen(|evt| println!("event: {}", evt))
///         .service(Service::WriteTag)
///         .service(Service::WriteTagFragmented),
/// );
/// ```
#[inline(always)]
pub fn listen<F>(f: F) -> HandlerImpl<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    HandlerImpl {
        interest: None,
        cb: f,
    }
}

impl<F: Fn(Event) + Send + Sync + 'static> HandlerImpl<F> {
    /// listen for one service
    #[inline]
    pub fn service(mut self, service: Service) -> Self {
        self.interest
            .get_or_insert_with(HashSet::new)
            .insert(service);
        self
    }

    /// listen for all services
    #[inline(always)]
    pub fn all(mut self) -> Self {
        self.interest = None;
        self
    }

    #[inline(always)]
    fn interested(&self, service: Service) -> bool {
        match self.interest {
            Some(ref items) => items.contains(&service),
            None => true,
        }
    }
}

impl<F: Fn(Event) + Send + Sync + 'static> fmt::Debug for HandlerImpl<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("interest", &self.interest)
            .finish()
    }
}

impl<F: Fn(Event) + Send + Sync + 'static> Handler for HandlerImpl<F> {
    #[inline(always)]
    fn invoke(&self, event: Event) {
        if self.interested(event.service) {
            (self.cb)(event)
        }
    }
}

/// holds the single registered handler; a new registration replaces the old one
#[derive(Default)]
pub struct EventDispatcher {
    handler: RwLock<Option<Arc<dyn Handler>>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registered", &self.has_handler())
            .finish()
    }
}

impl EventDispatcher {
    /// no handler
    pub fn new() -> Self {
        Default::default()
    }

    /// install `handler`, replacing any previous one
    pub fn set_handler(&self, handler: impl Handler) {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// install a closure receiving every event
    #[inline]
    pub fn set_fn<F>(&self, f: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.set_handler(listen(f));
    }

    /// remove the handler
    pub fn clear(&self) {
        self.handler.write().take();
    }

    /// is a handler installed?
    #[inline]
    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    /// deliver `event`; returns false if there is no handler.
    ///
    /// a panicking handler is logged and does not propagate.
    pub fn dispatch(&self, event: Event) -> bool {
        let handler = match self.handler.read().as_ref() {
            Some(h) => h.clone(),
            None => return false,
        };
        let res = panic::catch_unwind(panic::AssertUnwindSafe(|| handler.invoke(event)));
        if res.is_err() {
            error!("event handler panicked");
        }
        true
    }
}
