// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The UDP demultiplexer: one socket, one pump task, a table of client
//! slots. Each registered slot receives at most one datagram at a time;
//! the owning client hands the event back through `free_event` before the
//! slot becomes eligible again.

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{common::ClientEvent, tcp_message::TransportError};

/// Largest datagram the pump will accept.
const MAX_DATAGRAM: usize = 65_535;

/// One inbound datagram, or a dispatcher failure, delivered to a client.
#[derive(Debug)]
pub struct DispatchEvent {
    pub buffer: BytesMut,
    pub addr: SocketAddr,
    pub result: Result<(), TransportError>,
}

/// Opaque registration handle a client keeps until it is destroyed.
#[derive(Debug)]
pub struct DispatchEntry {
    id: u64,
}

#[derive(Debug)]
struct Slot {
    id: u64,
    mailbox: mpsc::Sender<ClientEvent>,
    busy: bool,
}

#[derive(Debug)]
pub struct Dispatch {
    socket: Arc<UdpSocket>,
    slots: Mutex<VecDeque<Slot>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    local: SocketAddr,
}

impl Dispatch {
    /// Binds the socket and starts the pump task.
    pub async fn bind(addr: SocketAddr) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind udp socket on {addr}"))?;
        let local = socket
            .local_addr()
            .context("failed to read udp local address")?;

        let dispatch = Arc::new(Self {
            socket: Arc::new(socket),
            slots: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            local,
        });
        tokio::spawn(Arc::clone(&dispatch).pump());
        info!(%local, "udp dispatch listening");
        Ok(dispatch)
    }

    /// Registers a client mailbox as a request slot.
    pub fn add_request(&self, mailbox: mpsc::Sender<ClientEvent>) -> DispatchEntry {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_slots().push_back(Slot {
            id,
            mailbox,
            busy: false,
        });
        DispatchEntry { id }
    }

    /// Returns a delivered event; the slot becomes eligible again.
    pub fn free_event(&self, entry: &DispatchEntry, event: DispatchEvent) {
        drop(event);
        if let Some(slot) = self.lock_slots().iter_mut().find(|s| s.id == entry.id) {
            slot.busy = false;
        }
    }

    /// Unregisters a slot, releasing any event still held by the client.
    pub fn remove_request(&self, entry: DispatchEntry, event: Option<DispatchEvent>) {
        drop(event);
        self.lock_slots().retain(|s| s.id != entry.id);
    }

    /// The socket replies are sent from.
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, VecDeque<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pump(self: Arc<Self>) {
        let mut scratch = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                r = self.socket.recv_from(&mut scratch) => r,
            };

            match received {
                Ok((len, addr)) => self.deliver(&scratch[..len], addr),
                Err(e) => {
                    // the demultiplexer is gone; every registered client
                    // learns about it and shuts down
                    warn!(error = %e, "udp dispatch socket failed");
                    self.broadcast_failure(e);
                    return;
                },
            }
        }
    }

    fn deliver(&self, datagram: &[u8], addr: SocketAddr) {
        let mut slots = self.lock_slots();
        let Some(slot) = slots.iter_mut().find(|s| !s.busy) else {
            debug!(%addr, len = datagram.len(), "no idle client, dropping datagram");
            return;
        };

        slot.busy = true;
        let event = ClientEvent::Request(DispatchEvent {
            buffer: BytesMut::from(datagram),
            addr,
            result: Ok(()),
        });
        if slot.mailbox.try_send(event).is_err() {
            slot.busy = false;
            debug!(%addr, "client mailbox unavailable, dropping datagram");
        }
    }

    fn broadcast_failure(&self, error: std::io::Error) {
        let failure = TransportError::from(error);
        let slots = self.lock_slots();
        for slot in slots.iter() {
            let event = ClientEvent::Request(DispatchEvent {
                buffer: BytesMut::new(),
                addr: self.local,
                result: Err(failure.clone()),
            });
            let _ = slot.mailbox.try_send(event);
        }
    }
}
