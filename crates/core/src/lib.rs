// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

/*!
# plcconnector-core

tag registry, type codec and CIP/EtherNet/IP framing for `plcconnector`.

[![crates.io](https://img.shields.io/crates/v/plcconnector-core.svg)](https://crates.io/crates/plcconnector-core)
[![docs](https://docs.rs/plcconnector-core/badge.svg)](https://docs.rs/plcconnector-core)
[![license](https://img.shields.io/crates/l/plcconnector.svg)](https://github.com/joylei/plcconnector-rs/blob/master/LICENSE)

## How to use

Add `plcconnector-core` to your Cargo.toml

```toml
[dependencies]
plcconnector-core= "0.4"
```

## Examples

### tag registry

```rust
use plcconnector_core::{ElemType, TagRegistry, ValueExt};

let registry = TagRegistry::new();
registry.add_tag("Counter", ElemType::Dint, 10).unwrap();

let offset = 2; // element
registry.update_tag("Counter", offset, &42_i32.to_le_bytes()).unwrap();

let data = registry.read_tag("Counter", offset, 1).unwrap();
let value: i32 = data.data.get_value(0).unwrap();
assert_eq!(value, 42);
```

### request path

```rust
use plcconnector_core::builder::PathBuilder;

let path = PathBuilder::default().tag("Counter[2]").build().unwrap();
assert_eq!(path[0], 0x91);
```

## Thread-safety

[`TagRegistry`] and [`EventDispatcher`] are thread-safe; every tag has its own lock.

## License

MIT

*/
#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod builder;
pub mod cip;
mod debug;
pub mod encap;
mod error;
pub mod event;
pub mod path;
pub mod registry;
mod service;
mod status;
mod types;
mod value;

/// core result
pub type Result<T> = std::result::Result<T, Error>;

pub use debug::{hex_dump, DebugLevel};
pub use error::Error;
pub use event::{Event, EventDispatcher, Handler};
pub use registry::{TagData, TagInfo, TagRegistry};
pub use service::Service;
pub use status::{
    EncapStatus, ReplyStatus, Status, EXT_CONNECTION_NOT_FOUND, EXT_OUT_OF_CONNECTIONS,
    EXT_TYPE_MISMATCH,
};
pub use types::{ElemType, Value};
pub use value::{decode_elements, encode_elements, Decode, Element, Encode, ValueExt};
