// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;

use crate::{
    client::{dispatch::DispatchEvent, tcp_message::TransportError},
    message::{
        error::{ParseError, RenderError, ReplyError},
        opcode::Rcode,
    },
};

/// Why a request finished the way it did. Every accepted request is
/// finalized with exactly one of these, or with success.
#[derive(Debug, Error, Clone)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),
    /// The inbound message carried QR=1; responses are never dispatched.
    #[error("message is a response, not a request")]
    NotARequest,
    #[error("no view matches class {0}")]
    ViewMismatch(u16),
    #[error("query carries no question")]
    EmptyQuestion,
    #[error("opcode not implemented")]
    NotImplemented,
    #[error("refused by policy")]
    Refused,
    #[error("send buffer pool exhausted")]
    NoMemory,
    #[error("request timed out")]
    TimedOut,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("render failure: {0}")]
    Render(#[from] RenderError),
    #[error("reply construction failed: {0}")]
    Reply(#[from] ReplyError),
    #[error("handler failure: {0}")]
    Handler(String),
    #[error("internal: {0}")]
    Internal(&'static str),
}

impl RequestError {
    /// The response code an error response carries for this failure.
    pub fn rcode(&self) -> Rcode {
        match self {
            Self::Parse(_) | Self::EmptyQuestion => Rcode::FormErr,
            Self::ViewMismatch(_) | Self::Refused => Rcode::Refused,
            Self::NotImplemented => Rcode::NotImp,
            _ => Rcode::ServFail,
        }
    }
}

pub type FinishResult = Result<(), RequestError>;

/// Events delivered to a client through its mailbox. Everything that
/// mutates a client arrives here or through one of its event-loop arms,
/// so no lock is ever taken on client state.
#[derive(Debug)]
pub enum ClientEvent {
    /// A datagram (or a dispatcher failure) from the UDP dispatch.
    Request(DispatchEvent),
    /// A background send finished; the buffer goes back to the pool.
    SendDone {
        result: std::io::Result<()>,
        buffer: BytesMut,
    },
    /// A deferred-work reference was released (see `Client::wait`).
    Unwait,
}

/// Which of the two bounds the per-client timer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Life,
    Idle,
}

/// Per-request scratch state owned by the handlers.
#[derive(Debug, Default)]
pub struct QueryContext {
    /// Requestor UDP buffer size advertised via EDNS0, when present.
    /// Recorded only; responses still fit the fixed send buffer.
    pub udpsize: Option<u16>,
}

impl QueryContext {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Knobs shared by every client a manager creates.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Sets the RA bit on every response.
    pub recursion_available: bool,
    /// Tears an idle TCP connection down through the timeout path.
    pub tcp_idle_timeout: Option<Duration>,
}
