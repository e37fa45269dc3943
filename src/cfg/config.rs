// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, net::SocketAddr, path::Path, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::{
    client::common::ClientOptions,
    message::{
        name::Name,
        opcode::{RdClass, RecordType},
        record::Record,
    },
    view::{View, ViewRegistry},
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener and client-pool parameters.
    pub server: ServerConfig,
    /// Views with their static zone data, matched in file order.
    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address both the UDP dispatch and the TCP listener bind to.
    pub listen: SocketAddr,
    #[serde(default = "default_udp_clients")]
    pub udp_clients: usize,
    #[serde(default = "default_tcp_clients")]
    pub tcp_clients: usize,
    /// Advertise recursion (the RA bit) on responses.
    #[serde(default)]
    pub recursion_available: bool,
    /// Idle TCP connections are torn down after this many milliseconds.
    #[serde(default)]
    pub tcp_idle_timeout_ms: Option<u64>,
}

fn default_udp_clients() -> usize {
    8
}

fn default_tcp_clients() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

fn default_class() -> String {
    "IN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordConfig {
    pub name: String,
    pub rtype: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    pub data: String,
}

fn default_ttl() -> u32 {
    300
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {path:?}"))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            recursion_available: self.server.recursion_available,
            tcp_idle_timeout: self.server.tcp_idle_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Materializes the configured views into a registry.
    pub fn build_views(&self) -> Result<ViewRegistry> {
        let registry = ViewRegistry::new();
        for vc in &self.views {
            let class = RdClass::from_str(&vc.class)
                .with_context(|| format!("view {:?}", vc.name))?;
            let mut view = View::new(vc.name.clone(), class);
            for rc in &vc.records {
                let record = build_record(rc, class).with_context(|| {
                    format!("record {:?} in view {:?}", rc.name, vc.name)
                })?;
                view.add_record(record);
            }
            registry.register(Arc::new(view));
        }
        Ok(registry)
    }
}

fn build_record(rc: &RecordConfig, class: RdClass) -> Result<Record> {
    let name = Name::from_ascii(&rc.name)?;
    let rtype = RecordType::from_str(&rc.rtype)?;
    Ok(match rtype {
        RecordType::A => {
            Record::a(name, class, rc.ttl, rc.data.parse().context("invalid IPv4 address")?)
        },
        RecordType::Aaaa => Record::aaaa(
            name,
            class,
            rc.ttl,
            rc.data.parse().context("invalid IPv6 address")?,
        ),
        RecordType::Txt => Record::txt(name, class, rc.ttl, &rc.data),
        RecordType::Ns | RecordType::Cname | RecordType::Ptr => {
            let target = Name::from_ascii(&rc.data)?;
            Record::with_name_data(name, rtype, class, rc.ttl, &target)
        },
        other => bail!("record type {other:?} cannot be configured"),
    })
}
