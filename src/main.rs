// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use dns_frontend_rs::{
    cfg::{
        cli::config_path_from_args,
        config::Config,
        logger::{init_default_logger, init_logger},
    },
    client::{dispatch::Dispatch, manager::ClientManager},
    handlers::HandlerSet,
};
use tokio::net::TcpListener;
use tracing::info;

const LOGGER_CONFIG: &str = "config_logger.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = if Path::new(LOGGER_CONFIG).exists() {
        init_logger(LOGGER_CONFIG)?
    } else {
        init_default_logger()?
    };

    let cfg_path = config_path_from_args("config.yaml")?;
    let config = Config::load_from_file(&cfg_path)
        .context("failed to resolve or load config")?;

    let views = Arc::new(config.build_views().context("failed to build views")?);
    let manager = ClientManager::new(
        Arc::clone(&views),
        HandlerSet::standard(),
        config.client_options(),
    );

    let dispatch = Dispatch::bind(config.server.listen).await?;
    manager.add_to_dispatch(config.server.udp_clients, &dispatch)?;

    let listener = TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind tcp listener on {}", config.server.listen))?;
    manager.accept_tcp(config.server.tcp_clients, Arc::new(listener))?;

    info!(addr = %config.server.listen, views = views.len(), "dns frontend running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("shutting down");
    manager.destroy().await;
    dispatch.shutdown();

    Ok(())
}
