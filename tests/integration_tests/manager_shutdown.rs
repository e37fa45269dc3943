// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use serial_test::serial;
use tokio::{net::TcpStream, time::timeout};

use super::common::{TEST_TIMEOUT, start_server};

#[tokio::test]
#[serial]
async fn destroy_waits_for_every_client() -> Result<()> {
    let server = start_server(2, 2).await?;
    assert_eq!(server.manager.client_count(), 4);
    assert!(!server.manager.is_exiting());

    timeout(TEST_TIMEOUT, server.manager.destroy()).await?;

    assert!(server.manager.is_exiting());
    assert_eq!(server.manager.client_count(), 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn destroy_completes_with_a_connection_open() -> Result<()> {
    let server = start_server(0, 2).await?;
    let _stream = TcpStream::connect(server.tcp_addr).await?;

    timeout(TEST_TIMEOUT, server.manager.destroy()).await?;
    assert_eq!(server.manager.client_count(), 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn destroy_is_idempotent() -> Result<()> {
    let server = start_server(1, 1).await?;
    timeout(TEST_TIMEOUT, server.manager.destroy()).await?;
    timeout(TEST_TIMEOUT, server.manager.destroy()).await?;
    assert_eq!(server.manager.client_count(), 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn client_creation_is_refused_while_exiting() -> Result<()> {
    let server = start_server(1, 0).await?;
    timeout(TEST_TIMEOUT, server.manager.destroy()).await?;

    assert!(server.manager.add_to_dispatch(1, &server.dispatch).is_err());
    Ok(())
}
