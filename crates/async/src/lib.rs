// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

/*!
# plcconnector-async

tokio based CIP/EtherNet/IP tag server for `plcconnector`.

[![crates.io](https://img.shields.io/crates/v/plcconnector-async.svg)](https://crates.io/crates/plcconnector-async)
[![docs](https://docs.rs/plcconnector-async/badge.svg)](https://docs.rs/plcconnector-async)
[![license](https://img.shields.io/crates/l/plcconnector.svg)](https://github.com/joylei/plcconnector-rs/blob/master/LICENSE)

## How to use

Add `plcconnector-async` to your Cargo.toml

```toml
[dependencies]
plcconnector-async= "0.4"
```

## Examples

### blocking facade

```rust,no_run
use plcconnector_async::{Connector, Options};
use plcconnector_core::ElemType;

let connector = Connector::new(Options::default())?;
connector.add_tag("Counter", ElemType::Dint, 100)?;
connector.callback(|evt| println!("{}", evt));
let addr = connector.serve("0.0.0.0", 44818)?;
println!("listening on {}", addr);

connector.update_tag("Counter", 50, &42_i32.to_le_bytes())?;
connector.close();
# Ok::<(), plcconnector_async::Error>(())
```

### inside tokio

```rust,no_run
use plcconnector_async::{Options, Server};
use plcconnector_core::{ElemType, EventDispatcher, TagRegistry};
use std::sync::Arc;

# async fn run() -> plcconnector_async::Result<()> {
let registry = Arc::new(TagRegistry::new());
registry.add_tag("T1", ElemType::Real, 4)?;
let server = Server::new(registry, Arc::new(EventDispatcher::new()), Options::default());
let addr = server.serve("127.0.0.1:44818").await?;
println!("listening on {}", addr);
server.shutdown().await;
# Ok(())
# }
```

## Thread-safety

Tags can be updated from any thread while the server is running; every tag has its own lock.

## License

MIT

*/
#![warn(missing_docs)]

extern crate plcconnector_core;
extern crate tokio;
#[macro_use]
extern crate log;

pub mod codec;
mod connector;
mod dispatch;
#[cfg(feature = "http")]
mod http;
mod options;
mod server;
pub mod session;

pub use connector::Connector;
pub use options::Options;
pub use server::Server;

use std::{fmt, io};
use tokio::task::JoinError;

/// result for [`plcconnector-async`]
pub type Result<T> = std::result::Result<T, Error>;

/// errors for [`plcconnector-async`]
#[derive(Debug)]
pub enum Error {
    /// protocol or tag error
    Core(plcconnector_core::Error),
    /// socket error
    Io(io::Error),
    /// tokio task join error
    JoinError(JoinError),
    /// other error
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// the core error, if any
    #[inline]
    pub fn as_core(&self) -> Option<&plcconnector_core::Error> {
        match self {
            Error::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Core(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::JoinError(e) => Some(e),
            Error::Other(e) => Some(e.as_ref()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Core(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "IoError - {}", e),
            Error::JoinError(e) => write!(f, "{}", e),
            Error::Other(e) => write!(f, "{}", e),
        }
    }
}

impl From<plcconnector_core::Error> for Error {
    fn from(e: plcconnector_core::Error) -> Self {
        Error::Core(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::JoinError(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_source() {
        let err: Error = plcconnector_core::Error::UnknownTag("x".into()).into();
        assert_eq!(err.to_string(), "unknown tag: x");
        assert!(err.as_core().is_some());
        assert!(err.source().is_some());

        let err: Error = io::Error::new(io::ErrorKind::AddrInUse, "busy").into();
        assert!(err.as_core().is_none());
        assert_eq!(err.to_string(), "IoError - busy");
    }
}
