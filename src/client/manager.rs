// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The client manager: creates pools of clients bound to an endpoint,
//! tracks them, and coordinates their orderly teardown.
//!
//! The manager's lock guards only the registry (the client table and its
//! count); client state itself is task-owned. The lock is held across a
//! whole create batch so a racing `destroy` can never observe a
//! half-built pool. Teardown is driven by the clients: each one detaches
//! itself as its task ends, and the last detach while `exiting` resolves
//! the drain watch that `destroy` awaits.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result, ensure};
use once_cell::sync::OnceCell;
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{
        client::{CLIENT_MAILBOX_DEPTH, Client, ClientParams},
        common::ClientOptions,
        dispatch::Dispatch,
    },
    handlers::HandlerSet,
    view::ViewRegistry,
};

/// Where a new client attaches.
pub(crate) enum EndpointSeed {
    Udp(Arc<Dispatch>),
    Tcp(Arc<TcpListener>),
}

struct ClientHandle {
    cancel: CancellationToken,
}

struct Inner {
    exiting: bool,
    nclients: usize,
    clients: HashMap<u64, ClientHandle>,
}

pub struct ClientManager {
    inner: Mutex<Inner>,
    drained: watch::Sender<bool>,
    views: Arc<ViewRegistry>,
    handlers: Arc<HandlerSet>,
    options: ClientOptions,
    next_id: AtomicU64,
    self_weak: OnceCell<Weak<ClientManager>>,
}

impl ClientManager {
    pub fn new(
        views: Arc<ViewRegistry>,
        handlers: Arc<HandlerSet>,
        options: ClientOptions,
    ) -> Arc<Self> {
        let (drained, _) = watch::channel(false);
        let manager = Arc::new(Self {
            inner: Mutex::new(Inner {
                exiting: false,
                nclients: 0,
                clients: HashMap::new(),
            }),
            drained,
            views,
            handlers,
            options,
            next_id: AtomicU64::new(1),
            self_weak: OnceCell::new(),
        });
        let _ = manager.self_weak.set(Arc::downgrade(&manager));
        manager
    }

    /// Creates up to `n` UDP clients attached to `dispatch`. Creating at
    /// least one counts as success; the shortfall is only logged.
    pub fn add_to_dispatch(&self, n: usize, dispatch: &Arc<Dispatch>) -> Result<()> {
        let mut inner = self.lock_inner();
        ensure!(!inner.exiting, "client manager is shutting down");

        let mut created = 0usize;
        for _ in 0..n {
            match self.start_client(&mut inner, EndpointSeed::Udp(Arc::clone(dispatch)))
            {
                Ok(()) => created += 1,
                Err(e) => debug!(error = %e, "udp client creation failed"),
            }
        }
        ensure!(created > 0, "could not create any udp client");
        if created < n {
            debug!(created, requested = n, "udp client pool created short");
        }
        info!(clients = created, addr = %dispatch.local_addr(), "udp clients ready");
        Ok(())
    }

    /// Creates up to `n` TCP clients accepting on `listener`, same
    /// partial-success policy as `add_to_dispatch`.
    pub fn accept_tcp(&self, n: usize, listener: Arc<TcpListener>) -> Result<()> {
        let mut inner = self.lock_inner();
        ensure!(!inner.exiting, "client manager is shutting down");

        let mut created = 0usize;
        for _ in 0..n {
            match self.start_client(&mut inner, EndpointSeed::Tcp(Arc::clone(&listener)))
            {
                Ok(()) => created += 1,
                Err(e) => debug!(error = %e, "tcp client creation failed"),
            }
        }
        ensure!(created > 0, "could not create any tcp client");
        if created < n {
            debug!(created, requested = n, "tcp client pool created short");
        }
        info!(clients = created, "tcp clients ready");
        Ok(())
    }

    /// Spawns one more client on an existing endpoint, used by
    /// `Client::replace`.
    pub(crate) fn spawn_sibling(&self, seed: EndpointSeed) -> Result<()> {
        let mut inner = self.lock_inner();
        ensure!(!inner.exiting, "client manager is shutting down");
        self.start_client(&mut inner, seed)
    }

    fn start_client(&self, inner: &mut Inner, seed: EndpointSeed) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events) = mpsc::channel(CLIENT_MAILBOX_DEPTH);
        let cancel = CancellationToken::new();
        let manager = self
            .self_weak
            .get()
            .cloned()
            .context("manager self reference missing")?;

        let client = Client::new(ClientParams {
            id,
            seed,
            events_tx,
            events,
            shutdown: cancel.clone(),
            manager,
            views: Arc::clone(&self.views),
            handlers: Arc::clone(&self.handlers),
            options: self.options.clone(),
        });

        inner.clients.insert(id, ClientHandle { cancel });
        inner.nclients += 1;
        tokio::spawn(client.run());
        Ok(())
    }

    /// Called by a client task as its last act.
    pub(crate) fn detach_client(&self, id: u64) {
        let mut inner = self.lock_inner();
        if inner.clients.remove(&id).is_some() {
            inner.nclients -= 1;
        }
        debug_assert_eq!(inner.nclients, inner.clients.len());
        if inner.exiting && inner.nclients == 0 {
            // the last client to finish completes the teardown
            self.drained.send_replace(true);
        }
    }

    pub fn client_count(&self) -> usize {
        self.lock_inner().nclients
    }

    pub fn is_exiting(&self) -> bool {
        self.lock_inner().exiting
    }

    /// Shuts every client down and resolves once the last one has
    /// detached. Safe to call more than once.
    pub async fn destroy(&self) {
        let mut drained = self.drained.subscribe();
        {
            let mut inner = self.lock_inner();
            inner.exiting = true;
            for handle in inner.clients.values() {
                handle.cancel.cancel();
            }
            if inner.nclients == 0 {
                self.drained.send_replace(true);
            }
        }
        if drained.wait_for(|done| *done).await.is_err() {
            warn!("drain notifier dropped before shutdown finished");
        }
        debug!("client manager drained");
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
