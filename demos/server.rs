// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use plcconnector::{
    event::listen, server::Error, ElemType, EventDispatcher, Options, Server, Service, TagRegistry,
};
use std::{sync::Arc, time::Duration};
use tokio::runtime;

fn main() {
    env_logger::init();
    let rt = runtime::Runtime::new().unwrap();
    let res: Result<_, Error> = rt.block_on(async {
        let registry = Arc::new(TagRegistry::new());
        registry.add_tag("Counter", ElemType::Dint, 1)?;
        registry.add_tag("Program:main.speed", ElemType::Real, 4)?;
        registry.add_tag("Flags", ElemType::Bool, 16)?;

        let events = Arc::new(EventDispatcher::new());
        // only writes from clients
        events.set_handler(listen(|e| println!("{}", e)).service(Service::WriteTag));

        let mut opts = Options::default();
        opts.idle_timeout(Duration::from_secs(30)).product_name("plcconnector demo");
        let server = Server::new(registry.clone(), events, opts);
        let addr = server.serve("0.0.0.0:44818").await?;
        println!("listening on {}", addr);

        for n in 0..600_i32 {
            registry.update_tag("Counter", 0, &n.to_le_bytes())?;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        server.shutdown().await;
        Ok(())
    });
    res.unwrap();
}
