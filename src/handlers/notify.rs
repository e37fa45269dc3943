// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::{client::client::Client, handlers::RequestHandler};

/// Acknowledges a NOTIFY without acting on it; zone maintenance lives
/// outside this frontend.
pub struct NotifyHandler;

#[async_trait]
impl RequestHandler for NotifyHandler {
    async fn handle(&self, client: &mut Client) -> Result<()> {
        info!(peer = ?client.peer_sockaddr(), "notify received");

        if client.message_mut().reply(true).is_err() {
            client.next(Ok(())).await;
            return Ok(());
        }
        client.send().await;
        Ok(())
    }
}
