// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use dns_frontend_rs::message::{
    name::Name,
    opcode::{Opcode, RdClass, Rcode, RecordType},
};
use tokio::{net::UdpSocket, time::timeout};

use super::common::{
    TEST_TIMEOUT, build_query, build_request, parse_response, start_server,
};

async fn exchange(sock: &UdpSocket, query: &[u8]) -> Result<Vec<u8>> {
    sock.send(query).await?;
    let mut buf = [0u8; 512];
    let len = timeout(TEST_TIMEOUT, sock.recv(&mut buf)).await??;
    Ok(buf[..len].to_vec())
}

#[tokio::test]
async fn matching_view_query_is_answered() -> Result<()> {
    // a single client proves the slot is re-armed between requests
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let query = build_query(0x1234, "example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;

    assert_eq!(response.id, 0x1234);
    assert!(response.flags.qr());
    assert!(response.flags.aa());
    assert_eq!(response.flags.rcode(), Some(Rcode::NoError));
    assert_eq!(response.questions.len(), 1);
    assert_eq!(response.questions[0].name, Name::from_ascii("example.com.")?);
    assert_eq!(response.questions[0].qtype, RecordType::A as u16);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(&response.answers[0].rdata[..], &[93, 184, 216, 34]);

    // same client, next request
    let query = build_query(0x1235, "example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;
    assert_eq!(response.id, 0x1235);

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn unknown_name_gets_nxdomain() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let query = build_query(0x00aa, "nowhere.example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;

    assert_eq!(response.flags.rcode(), Some(Rcode::NxDomain));
    assert!(response.answers.is_empty());

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn class_without_a_view_is_refused() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let query = build_query(0x2222, "example.com.", RecordType::A, RdClass::Ch)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;

    assert!(response.flags.qr());
    assert_eq!(response.id, 0x2222);
    assert_eq!(response.flags.rcode(), Some(Rcode::Refused));

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn truncated_request_gets_formerr() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    // a valid id, then nothing
    let response = parse_response(&exchange(&sock, &[0xde, 0xad, 0x01, 0x00, 0x00]).await?)?;

    assert_eq!(response.id, 0xdead);
    assert!(response.flags.qr());
    assert_eq!(response.flags.rcode(), Some(Rcode::FormErr));

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn unsupported_opcode_is_not_implemented() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let query =
        build_request(0x0c0c, Opcode::Status, "example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;
    assert_eq!(response.flags.rcode(), Some(Rcode::NotImp));

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn iquery_is_refused() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let query =
        build_request(0x0d0d, Opcode::Iquery, "example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;
    assert_eq!(response.flags.rcode(), Some(Rcode::Refused));

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn update_is_refused_and_notify_is_acknowledged() -> Result<()> {
    let server = start_server(1, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    let update =
        build_request(0x0e0e, Opcode::Update, "example.com.", RecordType::Soa, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &update).await?)?;
    assert_eq!(response.flags.rcode(), Some(Rcode::Refused));

    let notify =
        build_request(0x0f0f, Opcode::Notify, "example.com.", RecordType::Soa, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &notify).await?)?;
    assert_eq!(response.id, 0x0f0f);
    assert_eq!(response.flags.opcode(), Some(Opcode::Notify));
    assert_eq!(response.flags.rcode(), Some(Rcode::NoError));

    server.manager.destroy().await;
    Ok(())
}

#[tokio::test]
async fn a_response_is_dropped_without_an_answer() -> Result<()> {
    let server = start_server(2, 0).await?;
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.connect(server.udp_addr).await?;

    // QR already set: the frontend must not answer a response
    let mut query = build_query(0x3333, "example.com.", RecordType::A, RdClass::In)?;
    query[2] |= 0x80;
    sock.send(&query).await?;

    let mut buf = [0u8; 512];
    let silence = tokio::time::Duration::from_millis(300);
    assert!(timeout(silence, sock.recv(&mut buf)).await.is_err());

    // the slot was re-armed, an honest query still goes through
    let query = build_query(0x3334, "example.com.", RecordType::A, RdClass::In)?;
    let response = parse_response(&exchange(&sock, &query).await?)?;
    assert_eq!(response.id, 0x3334);

    server.manager.destroy().await;
    Ok(())
}
