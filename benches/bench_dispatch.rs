use std::sync::Arc;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use futures::{SinkExt, StreamExt};
use plcconnector::{
    builder::PathBuilder,
    cip::MessageRequest,
    encap::{Command, EncapHeader, Frame, RegisterSession, SendData},
    server::codec::EncapCodec,
    ElemType, EventDispatcher, Options, Server, TagRegistry,
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_util::codec::Framed;

fn bench_read(c: &mut Criterion) {
    c.bench_function("loopback read", |b| {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let (framed, request) = rt.block_on(async {
            let registry = Arc::new(TagRegistry::new());
            registry.add_tag("Car_Pos", ElemType::Dint, 10).unwrap();
            let server = Server::new(registry, Arc::new(EventDispatcher::new()), Options::default());
            let addr = server.serve("127.0.0.1:0").await.unwrap();

            let stream = TcpStream::connect(addr).await.unwrap();
            let mut framed = Framed::new(stream, EncapCodec);
            let mut body = BytesMut::new();
            RegisterSession::default().encode(&mut body);
            framed
                .send(Frame::new(EncapHeader::new(Command::RegisterSession, 0), body.freeze()))
                .await
                .unwrap();
            let session = framed.next().await.unwrap().unwrap().header.session;

            let path = PathBuilder::default().tag("Car_Pos[1]").build().unwrap();
            let msg = MessageRequest::new(0x4C, path, 1_u16.to_le_bytes().to_vec());
            let request = Frame::new(
                EncapHeader::new(Command::SendRRData, session),
                SendData::unconnected(msg.to_bytes()).to_bytes(),
            );
            (Arc::new(Mutex::new(framed)), request)
        });
        b.to_async(rt).iter_batched(
            || (framed.clone(), request.clone()),
            |(framed, request)| async move {
                let mut framed = framed.lock().await;
                framed.send(request).await.unwrap();
                let _reply = framed.next().await.unwrap().unwrap();
            },
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, bench_read);
criterion_main!(benches);
