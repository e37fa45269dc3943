// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::{
    client::{client::Client, common::RequestError},
    handlers::RequestHandler,
};

/// Dynamic update is not served by this frontend; every update request
/// is refused.
pub struct RefuseUpdateHandler;

#[async_trait]
impl RequestHandler for RefuseUpdateHandler {
    async fn handle(&self, client: &mut Client) -> Result<()> {
        debug!(peer = ?client.peer_sockaddr(), "update refused");
        client.error(RequestError::Refused).await;
        Ok(())
    }
}
