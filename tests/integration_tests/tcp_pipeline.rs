// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use dns_frontend_rs::{
    client::common::ClientOptions,
    message::opcode::{RdClass, Rcode, RecordType},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use super::common::{
    TEST_TIMEOUT, build_query, parse_response, start_server, start_server_with,
};

fn frame(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 2);
    out.extend_from_slice(&(message.len() as u16).to_be_bytes());
    out.extend_from_slice(message);
    out
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 2];
    timeout(TEST_TIMEOUT, stream.read_exact(&mut len_bytes)).await??;
    let len = u16::from_be_bytes(len_bytes) as usize;
    let mut body = vec![0u8; len];
    timeout(TEST_TIMEOUT, stream.read_exact(&mut body)).await??;
    Ok(body)
}

#[tokio::test]
async fn pipelined_queries_are_answered_in_order() -> Result<()> {
    let server = start_server(0, 1).await?;
    let mut stream = TcpStream::connect(server.tcp_addr).await?;

    // both frames in one write; the framer has to split them
    let mut batch = frame(&build_query(1, "example.com.", RecordType::A, RdClass::In)?);
    batch.extend_from_slice(&frame(&build_query(
        2,
        "example.com.",
        RecordType::A,
        RdClass::In,
    )?));
    stream.write_all(&batch).await?;

    let first = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(first.id, 1);
    assert!(first.flags.qr());
    assert_eq!(first.answers.len(), 1);

    let second = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(second.id, 2);
    assert_eq!(second.flags.rcode(), Some(Rcode::NoError));

    // the connection keeps serving after the pipeline drained
    stream
        .write_all(&frame(&build_query(3, "example.com.", RecordType::A, RdClass::In)?))
        .await?;
    let third = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(third.id, 3);

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn listener_is_rearmed_after_a_disconnect() -> Result<()> {
    // one client: the second connection can only be served if the
    // first teardown re-armed the accept
    let server = start_server(0, 1).await?;

    {
        let mut stream = TcpStream::connect(server.tcp_addr).await?;
        stream
            .write_all(&frame(&build_query(7, "example.com.", RecordType::A, RdClass::In)?))
            .await?;
        let response = parse_response(&read_frame(&mut stream).await?)?;
        assert_eq!(response.id, 7);
    }

    let mut stream = TcpStream::connect(server.tcp_addr).await?;
    stream
        .write_all(&frame(&build_query(8, "example.com.", RecordType::A, RdClass::In)?))
        .await?;
    let response = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(response.id, 8);

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn refused_class_still_flows_over_tcp() -> Result<()> {
    let server = start_server(0, 1).await?;
    let mut stream = TcpStream::connect(server.tcp_addr).await?;

    stream
        .write_all(&frame(&build_query(9, "example.com.", RecordType::A, RdClass::Hs)?))
        .await?;
    let response = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(response.flags.rcode(), Some(Rcode::Refused));

    // an error response does not cost the connection
    stream
        .write_all(&frame(&build_query(10, "example.com.", RecordType::A, RdClass::In)?))
        .await?;
    let response = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(response.id, 10);

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn idle_connection_is_torn_down_by_the_timer() -> Result<()> {
    let options = ClientOptions {
        recursion_available: false,
        tcp_idle_timeout: Some(Duration::from_millis(200)),
    };
    let server = start_server_with(0, 1, options).await?;

    let mut stream = TcpStream::connect(server.tcp_addr).await?;
    let mut probe = [0u8; 1];
    let read = timeout(TEST_TIMEOUT, stream.read(&mut probe)).await??;
    assert_eq!(read, 0, "server should close the idle connection");

    // the listener is armed again after the timeout teardown
    let mut stream = TcpStream::connect(server.tcp_addr).await?;
    stream
        .write_all(&frame(&build_query(11, "example.com.", RecordType::A, RdClass::In)?))
        .await?;
    let response = parse_response(&read_frame(&mut stream).await?)?;
    assert_eq!(response.id, 11);

    server.manager.destroy().await;
    Ok(())
}
