// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use plcconnector::{encode_elements, Connector, ElemType, Event, Service, Status};
use std::{thread, time::Duration};

fn on_event(event: Event) {
    match event.service {
        Service::Reset => println!("Reset"),
        Service::ReadTag => println!("Read Tag"),
        Service::WriteTag => println!("Write Tag"),
        _ => println!("{}", event.service),
    }
    println!("{}", event.status);
    if let (Some(tag), Status::Success) = (event.tag.as_ref(), event.status) {
        println!("{} {} {} {:?}", tag.name, tag.count, tag.elem_type, tag.values());
    }
    println!();
}

fn main() -> anyhow::Result<()> {
    let connector = Connector::init()?;
    connector.add_tag("TABLE_DINT_1", ElemType::Dint, 100)?;
    connector.set_verbose(false);
    connector.callback(on_event);

    let http = connector.serve_http("0.0.0.0", 28080)?;
    println!("status page on http://{}", http);
    let addr = connector.serve("0.0.0.0", 10000)?;
    println!("listening on {}", addr);

    let mut data = [0_i32, 1, 2];
    loop {
        data[0] += 1;
        data[1] += 2;
        data[2] += 3;
        let bytes = encode_elements(&data);
        connector.update_tag("TABLE_DINT_1", 0, &bytes)?;
        connector.update_tag("TABLE_DINT_1", 50, &bytes)?;

        thread::sleep(Duration::from_secs(1));
        println!("{}", data[0]);
        if data[0] > 60 {
            break;
        }
    }

    connector.close();
    Ok(())
}
