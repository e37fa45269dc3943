// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request handlers, one per served opcode.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::client::client::Client;

/// Handles NOTIFY requests.
pub mod notify;
/// Handles QUERY requests.
pub mod query;
/// Handles UPDATE requests.
pub mod update;

/// One handler per opcode the core dispatches on.
///
/// A handler runs on the client's task with exclusive access to the
/// client and must finalize the request (`send`, `error` or `next`)
/// exactly once before returning, unless it keeps the request alive
/// through `Client::wait`. Returning an error without finalizing makes
/// the core answer SERVFAIL on the handler's behalf.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, client: &mut Client) -> Result<()>;
}

pub struct HandlerSet {
    pub query: Box<dyn RequestHandler>,
    pub update: Box<dyn RequestHandler>,
    pub notify: Box<dyn RequestHandler>,
}

impl HandlerSet {
    /// The stock wiring: zone-backed queries, refused updates, logged
    /// notifies.
    pub fn standard() -> Arc<Self> {
        Arc::new(Self {
            query: Box::new(query::ZoneQueryHandler),
            update: Box::new(update::RefuseUpdateHandler),
            notify: Box::new(notify::NotifyHandler),
        })
    }
}
