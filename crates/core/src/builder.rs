// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! builders for request paths

use crate::{
    path::{class, parse_tag_path, EPath, Segment},
    Error, Result,
};

/// builder to build an encoded EPATH
///
/// # Examples
/// ```rust
/// use plcconnector_core::builder::*;
///
/// let path = PathBuilder::default()
///     .name("MyTag1")
///     .element(2)
///     .build()
///     .unwrap();
/// assert_eq!(path, vec![0x91, 6, b'M', b'y', b'T', b'a', b'g', b'1', 0x28, 2]);
/// ```
#[derive(Default, Debug)]
pub struct PathBuilder {
    ports: Vec<(u8, u8)>,
    segments: Vec<Segment>,
    error: Option<&'static str>,
}

impl PathBuilder {
    /// route through backplane port `port` to slot/link `link`
    #[inline]
    pub fn port(&mut self, port: u8, link: u8) -> &mut Self {
        self.ports.push((port, link));
        self
    }

    /// ANSI symbol, e.g. a tag name
    #[inline]
    pub fn name(&mut self, name: impl AsRef<str>) -> &mut Self {
        let name = name.as_ref();
        if name.is_empty() || name.len() > 255 {
            self.error = Some("symbol length must be 1..=255");
        }
        self.segments.push(Segment::Symbol(name.to_owned()));
        self
    }

    /// textual tag path like `Tag[1]`; see [`parse_tag_path`]
    pub fn tag(&mut self, path: impl AsRef<str>) -> &mut Self {
        match parse_tag_path(path.as_ref()) {
            Ok(p) => self.segments.extend(p.segments().iter().cloned()),
            Err(_) => self.error = Some("invalid tag path"),
        }
        self
    }

    /// array element index
    #[inline]
    pub fn element(&mut self, index: u32) -> &mut Self {
        self.segments.push(Segment::Element(index));
        self
    }

    /// logical class
    #[inline]
    pub fn class(&mut self, class: u32) -> &mut Self {
        self.segments.push(Segment::Class(class));
        self
    }

    /// logical instance
    #[inline]
    pub fn instance(&mut self, instance: u32) -> &mut Self {
        self.segments.push(Segment::Instance(instance));
        self
    }

    /// logical attribute
    #[inline]
    pub fn attribute(&mut self, attr: u32) -> &mut Self {
        self.segments.push(Segment::Attribute(attr));
        self
    }

    /// shortcut for message router, instance 1
    #[inline]
    pub fn message_router(&mut self) -> &mut Self {
        self.class(class::MESSAGE_ROUTER).instance(1)
    }

    /// shortcut for connection manager, instance 1
    #[inline]
    pub fn connection_manager(&mut self) -> &mut Self {
        self.class(class::CONNECTION_MANAGER).instance(1)
    }

    /// build encoded path bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        if let Some(e) = self.error {
            return Err(Error::InvalidPath(e));
        }
        let mut buf = Vec::with_capacity(self.ports.len() * 2 + self.segments.len() * 8);
        for (port, link) in self.ports.iter() {
            if *port == 0 || *port > 0x0E {
                return Err(Error::InvalidPath("port must be 1..=14"));
            }
            buf.push(*port);
            buf.push(*link);
        }
        EPath::new(self.segments.clone()).encode(&mut buf)?;
        Ok(buf)
    }

    /// build encoded path bytes, the size in 16 bit words first
    pub fn build_sized(&self) -> Result<Vec<u8>> {
        let path = self.build()?;
        let words = path.len() / 2;
        if words > 255 {
            return Err(Error::InvalidPath("path too long"));
        }
        let mut buf = Vec::with_capacity(path.len() + 1);
        buf.push(words as u8);
        buf.extend_from_slice(&path);
        Ok(buf)
    }
}
