// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use bytes::BytesMut;
use dns_frontend_rs::{
    client::{common::ClientOptions, dispatch::Dispatch, manager::ClientManager},
    handlers::HandlerSet,
    message::{
        codec::{Intent, Message, MessageRenderer, Section},
        name::Name,
        opcode::{Opcode, RdClass, RecordType},
        question::Question,
        record::Record,
    },
    view::{View, ViewRegistry},
};
use tokio::net::TcpListener;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One IN view holding a single A record for example.com.
pub fn test_views() -> Result<Arc<ViewRegistry>> {
    let registry = ViewRegistry::new();
    let mut view = View::new("default", RdClass::In);
    view.add_record(Record::a(
        Name::from_ascii("example.com.")?,
        RdClass::In,
        300,
        "93.184.216.34".parse()?,
    ));
    registry.register(Arc::new(view));
    Ok(Arc::new(registry))
}

pub struct TestServer {
    pub manager: Arc<ClientManager>,
    pub dispatch: Arc<Dispatch>,
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
}

pub async fn start_server(udp_clients: usize, tcp_clients: usize) -> Result<TestServer> {
    start_server_with(udp_clients, tcp_clients, ClientOptions::default()).await
}

pub async fn start_server_with(
    udp_clients: usize,
    tcp_clients: usize,
    options: ClientOptions,
) -> Result<TestServer> {
    let manager = ClientManager::new(test_views()?, HandlerSet::standard(), options);

    let dispatch = Dispatch::bind("127.0.0.1:0".parse()?).await?;
    let udp_addr = dispatch.local_addr();
    if udp_clients > 0 {
        manager.add_to_dispatch(udp_clients, &dispatch)?;
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let tcp_addr = listener.local_addr()?;
    if tcp_clients > 0 {
        manager.accept_tcp(tcp_clients, Arc::new(listener))?;
    }

    Ok(TestServer {
        manager,
        dispatch,
        udp_addr,
        tcp_addr,
    })
}

pub fn build_query(
    id: u16,
    name: &str,
    rtype: RecordType,
    class: RdClass,
) -> Result<Vec<u8>> {
    build_request(id, Opcode::Query, name, rtype, class)
}

pub fn build_request(
    id: u16,
    opcode: Opcode,
    name: &str,
    rtype: RecordType,
    class: RdClass,
) -> Result<Vec<u8>> {
    let mut msg = Message::new(Intent::Render);
    msg.id = id;
    msg.flags.set_opcode(opcode);
    msg.flags.set_rd(true);
    msg.questions.push(Question::new(
        Name::from_ascii(name)?,
        rtype as u16,
        class as u16,
    ));

    let mut buf = BytesMut::with_capacity(512);
    let mut renderer = MessageRenderer::begin(&msg, &mut buf, 512)?;
    renderer.section(Section::Question)?;
    renderer.end();
    Ok(buf.to_vec())
}

pub fn parse_response(bytes: &[u8]) -> Result<Message> {
    let mut msg = Message::new(Intent::Parse);
    msg.parse(bytes, false)?;
    Ok(msg)
}
