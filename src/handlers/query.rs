// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::{
    client::{client::Client, common::RequestError},
    handlers::RequestHandler,
    message::opcode::Rcode,
    view::Lookup,
};

/// Answers queries from the static zone data of the matched view.
pub struct ZoneQueryHandler;

#[async_trait]
impl RequestHandler for ZoneQueryHandler {
    async fn handle(&self, client: &mut Client) -> Result<()> {
        let Some(view) = client.view().cloned() else {
            client.error(RequestError::Refused).await;
            return Ok(());
        };
        let Some(question) = client.message().questions.first().cloned() else {
            client.error(RequestError::EmptyQuestion).await;
            return Ok(());
        };

        let found = view.lookup(&question.name, question.qtype);
        debug!(
            view = %view.name,
            qname = %question.name,
            qtype = question.qtype,
            "query lookup done"
        );

        let message = client.message_mut();
        message.reply(true)?;
        message.flags.set_aa(true);
        match found {
            Lookup::Records(records) => message.answers = records,
            Lookup::NoRecords => {},
            Lookup::NxDomain => message.flags.set_rcode(Rcode::NxDomain),
        }

        client.send().await;
        Ok(())
    }
}
