// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

#[doc(inline)]
pub use plcconnector_core::*;
#[cfg(feature = "log")]
#[doc(inline)]
pub use plcconnector_log::*;

#[cfg(feature = "async")]
#[doc(inline)]
pub use plcconnector_async as server;
#[cfg(feature = "async")]
#[doc(inline)]
pub use plcconnector_async::{Connector, Options, Server};
