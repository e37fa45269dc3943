// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-request client state machine.
//!
//! Each client is pinned to one spawned task for its whole life; every
//! mutation happens inside that task's event loop, so client state needs
//! no lock. The loop suspends on whichever source matches the current
//! state: the mailbox (UDP requests, send completions, unwait), the TCP
//! endpoint (accept while `Listening`, framed read while `Reading`), or
//! the idle/life timer. Being parked in `Listening` or `Reading` is what
//! "one outstanding accept/read" means here: exactly one endpoint future
//! is armed at a time.
//!
//! A request is finalized by exactly one of `send`, `error` or `next`;
//! `send` and `error` both funnel into `next`, which detaches the view,
//! resets the parser and re-arms the endpoint for the next request.

use std::{
    mem,
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use bitflags::bitflags;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, mpsc, oneshot},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    client::{
        common::{
            ClientEvent, ClientOptions, FinishResult, QueryContext, RequestError,
            TimerKind,
        },
        dispatch::{Dispatch, DispatchEntry, DispatchEvent},
        manager::{ClientManager, EndpointSeed},
        send_pool::{SEND_BUFFER_SIZE, SendPool},
        tcp_message::{TCP_LENGTH_PREFIX, TcpMessage, TransportError},
    },
    handlers::HandlerSet,
    message::{
        codec::{Intent, Message, MessageRenderer, Section},
        error::RenderError,
        name::Name,
        opcode::Opcode,
    },
    view::{View, ViewRegistry},
};

/// Mailbox depth per client: a request slot, the send completions, and
/// some slack for unwait notifications.
pub(crate) const CLIENT_MAILBOX_DEPTH: usize = 16;

bitflags! {
    /// Attribute bits fixed at creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientAttrs: u8 {
        const TCP = 0b0000_0001;
        const RECURSION_AVAILABLE = 0b0000_0010;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Listening,
    Reading,
    Working,
    Waiting,
    ShuttingDown,
}

/// TCP-side endpoint bindings. UDP clients never carry one.
struct TcpEndpoint {
    listener: Arc<TcpListener>,
    reader: TcpMessage,
    writer: Option<Arc<Mutex<OwnedWriteHalf>>>,
    peer: Option<SocketAddr>,
}

/// The single idle/life timer slot of a client.
struct ClientTimer {
    deadline: Option<(Instant, TimerKind)>,
}

impl ClientTimer {
    fn new() -> Self {
        Self { deadline: None }
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.deadline = Some((Instant::now() + after, kind));
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    async fn fired(&mut self) -> TimerKind {
        match self.deadline {
            Some((at, kind)) => {
                sleep_until(at).await;
                self.deadline = None;
                kind
            },
            None => std::future::pending().await,
        }
    }
}

enum TcpOutcome {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Frame(Result<BytesMut, TransportError>),
}

/// The one armed endpoint future of a TCP client: an accept while
/// `Listening`, a framed read while `Reading`, nothing otherwise.
async fn drive_tcp(tcp: &mut Option<TcpEndpoint>, state: ClientState) -> TcpOutcome {
    match (state, tcp.as_mut()) {
        (ClientState::Listening, Some(t)) => TcpOutcome::Accepted(t.listener.accept().await),
        (ClientState::Reading, Some(t)) => TcpOutcome::Frame(t.reader.read_message().await),
        _ => std::future::pending().await,
    }
}

enum Step {
    Shutdown,
    Event(ClientEvent),
    Tcp(TcpOutcome),
    Timer(TimerKind),
}

/// Everything a manager hands a new client.
pub(crate) struct ClientParams {
    pub id: u64,
    pub seed: EndpointSeed,
    pub events_tx: mpsc::Sender<ClientEvent>,
    pub events: mpsc::Receiver<ClientEvent>,
    pub shutdown: CancellationToken,
    pub manager: Weak<ClientManager>,
    pub views: Arc<ViewRegistry>,
    pub handlers: Arc<HandlerSet>,
    pub options: ClientOptions,
}

pub struct Client {
    id: u64,
    mode: ClientMode,
    state: ClientState,
    attrs: ClientAttrs,

    dispatch: Option<(Arc<Dispatch>, DispatchEntry)>,
    dispevent: Option<DispatchEvent>,
    tcp: Option<TcpEndpoint>,

    message: Message,
    view: Option<Arc<View>>,
    /// Name of the key that authenticated the request. Stays empty while
    /// signature checking is not performed.
    signer: Option<Name>,
    requesttime: Option<DateTime<Utc>>,
    now: Option<DateTime<Utc>>,
    query_ctx: QueryContext,

    send_pool: SendPool,
    timer: ClientTimer,

    nreads: u64,
    nsends: u32,
    nwaiting: u32,
    naccepts: u64,

    events_tx: mpsc::Sender<ClientEvent>,
    events: mpsc::Receiver<ClientEvent>,
    shutdown: CancellationToken,
    manager: Weak<ClientManager>,
    views: Arc<ViewRegistry>,
    handlers: Arc<HandlerSet>,
    options: ClientOptions,

    next_cb: Option<oneshot::Sender<FinishResult>>,
    mortal: bool,
}

impl Client {
    pub(crate) fn new(params: ClientParams) -> Self {
        let mut attrs = ClientAttrs::empty();
        if params.options.recursion_available {
            attrs |= ClientAttrs::RECURSION_AVAILABLE;
        }

        let (mode, dispatch, tcp) = match params.seed {
            EndpointSeed::Udp(d) => {
                let entry = d.add_request(params.events_tx.clone());
                (ClientMode::Udp, Some((d, entry)), None)
            },
            EndpointSeed::Tcp(listener) => {
                attrs |= ClientAttrs::TCP;
                (
                    ClientMode::Tcp,
                    None,
                    Some(TcpEndpoint {
                        listener,
                        reader: TcpMessage::new(),
                        writer: None,
                        peer: None,
                    }),
                )
            },
        };

        Self {
            id: params.id,
            mode,
            state: ClientState::Listening,
            attrs,
            dispatch,
            dispevent: None,
            tcp,
            message: Message::new(Intent::Parse),
            view: None,
            signer: None,
            requesttime: None,
            now: None,
            query_ctx: QueryContext::default(),
            send_pool: SendPool::new(),
            timer: ClientTimer::new(),
            nreads: 0,
            nsends: 0,
            nwaiting: 0,
            naccepts: 0,
            events_tx: params.events_tx,
            events: params.events,
            shutdown: params.shutdown,
            manager: params.manager,
            views: params.views,
            handlers: params.handlers,
            options: params.options,
            next_cb: None,
            mortal: false,
        }
    }

    // --- accessors exposed to handlers ---

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state
    }

    #[inline]
    pub fn attrs(&self) -> ClientAttrs {
        self.attrs
    }

    #[inline]
    pub fn message(&self) -> &Message {
        &self.message
    }

    #[inline]
    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    #[inline]
    pub fn view(&self) -> Option<&Arc<View>> {
        self.view.as_ref()
    }

    #[inline]
    pub fn signer(&self) -> Option<&Name> {
        self.signer.as_ref()
    }

    #[inline]
    pub fn requesttime(&self) -> Option<DateTime<Utc>> {
        self.requesttime
    }

    #[inline]
    pub fn query_ctx(&self) -> &QueryContext {
        &self.query_ctx
    }

    #[inline]
    pub fn query_ctx_mut(&mut self) -> &mut QueryContext {
        &mut self.query_ctx
    }

    /// Peer of the request currently held, if any.
    pub fn peer_sockaddr(&self) -> Option<SocketAddr> {
        match self.mode {
            ClientMode::Udp => self.dispevent.as_ref().map(|e| e.addr),
            ClientMode::Tcp => self.tcp.as_ref().and_then(|t| t.peer),
        }
    }

    pub fn shutting_down(&self) -> bool {
        matches!(self.state, ClientState::ShuttingDown) || self.shutdown.is_cancelled()
    }

    /// Handle to this client's mailbox. Handler work that outlives the
    /// current event posts its completion here (see `ClientEvent`), which
    /// delivers it back on the client's own task.
    pub fn mailbox(&self) -> mpsc::Sender<ClientEvent> {
        self.events_tx.clone()
    }

    /// Takes a reference that keeps the client from finishing teardown
    /// while handler work outlives the current event.
    pub fn wait(&mut self) {
        self.nwaiting += 1;
    }

    pub fn unwait(&mut self) {
        self.nwaiting = self.nwaiting.saturating_sub(1);
    }

    /// One-shot completion hook fired when the current request is
    /// finalized. A later call replaces an unfired hook.
    pub fn on_finish(&mut self, cb: oneshot::Sender<FinishResult>) {
        self.next_cb = Some(cb);
    }

    /// Bounds the current activity with the idle timer.
    pub fn arm_idle_timer(&mut self, after: Duration) {
        self.timer.arm(TimerKind::Idle, after);
    }

    /// Bounds the whole request with the life timer.
    pub fn arm_life_timer(&mut self, after: Duration) {
        self.timer.arm(TimerKind::Life, after);
    }

    pub fn cancel_timer(&mut self) {
        self.timer.disarm();
    }

    /// Asks the manager for a fresh sibling on the same endpoint and
    /// marks this client mortal: it self-destructs at its next finalize
    /// instead of re-arming, so a long-running handler does not starve
    /// the endpoint.
    pub fn replace(&mut self) -> Result<()> {
        let manager = self.manager.upgrade().context("client manager is gone")?;
        let seed = match (&self.dispatch, &self.tcp) {
            (Some((dispatch, _)), _) => EndpointSeed::Udp(Arc::clone(dispatch)),
            (_, Some(t)) => EndpointSeed::Tcp(Arc::clone(&t.listener)),
            _ => bail!("client has no endpoint to hand over"),
        };
        manager.spawn_sibling(seed)?;
        self.mortal = true;
        Ok(())
    }

    // --- event loop ---

    pub(crate) async fn run(mut self) {
        debug!(client = self.id, mode = ?self.mode, "client task started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let state = self.state;
            let tcp_armed = matches!(self.mode, ClientMode::Tcp)
                && matches!(state, ClientState::Listening | ClientState::Reading);
            let timer_armed = self.timer.is_armed();

            let step = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Step::Shutdown,
                ev = self.events.recv() => match ev {
                    Some(ev) => Step::Event(ev),
                    None => Step::Shutdown,
                },
                out = drive_tcp(&mut self.tcp, state), if tcp_armed => Step::Tcp(out),
                kind = self.timer.fired(), if timer_armed => Step::Timer(kind),
            };

            match step {
                Step::Shutdown => break,
                Step::Event(ev) => self.on_event(ev).await,
                Step::Tcp(TcpOutcome::Accepted(res)) => self.on_accept(res).await,
                Step::Tcp(TcpOutcome::Frame(res)) => self.on_request(res).await,
                Step::Timer(kind) => self.on_timer(kind).await,
            }
        }
        self.destroy();
    }

    async fn on_event(&mut self, ev: ClientEvent) {
        match ev {
            ClientEvent::Request(event) => self.on_dispatch(event).await,
            ClientEvent::SendDone { result, buffer } => {
                self.send_done(result, buffer).await
            },
            ClientEvent::Unwait => self.unwait(),
        }
    }

    async fn on_dispatch(&mut self, mut event: DispatchEvent) {
        if !matches!(self.mode, ClientMode::Udp) {
            debug!(client = self.id, "dispatch event on a tcp client ignored");
            return;
        }
        if let Err(e) = mem::replace(&mut event.result, Ok(())) {
            // the demultiplexer is lost; there is nothing left to serve
            warn!(client = self.id, error = %e, "udp transport failed, shutting down");
            self.shutdown.cancel();
            return;
        }

        let buffer = mem::take(&mut event.buffer);
        self.dispevent = Some(event);
        self.on_request(Ok(buffer)).await;
    }

    /// Request intake, both transports.
    async fn on_request(&mut self, input: Result<BytesMut, TransportError>) {
        self.now = Some(Utc::now());
        self.requesttime = self.now;
        self.state = ClientState::Working;
        self.timer.disarm();

        let buffer = match input {
            Ok(b) => b,
            Err(e) => {
                debug!(client = self.id, error = %e, "tcp read failed");
                self.next(Err(RequestError::Transport(e))).await;
                return;
            },
        };
        self.nreads += 1;
        trace!(client = self.id, payload = %hex::encode(&buffer), "request received");

        self.message.reset(Intent::Parse);
        if let Err(e) = self.message.parse(&buffer, false) {
            debug!(client = self.id, error = %e, "request parse failed");
            self.error(RequestError::Parse(e)).await;
            return;
        }

        // a response must never be dispatched as a request
        if self.message.flags.qr() {
            debug!(client = self.id, "dropping message with QR set");
            self.next(Err(RequestError::NotARequest)).await;
            return;
        }

        self.query_ctx.udpsize = self.message.requestor_udpsize();

        let class = self.message.rdclass().unwrap_or(0);
        match self.views.match_class(class) {
            Some(view) => self.view = Some(view),
            None => {
                self.error(RequestError::ViewMismatch(class)).await;
                return;
            },
        }

        let handlers = Arc::clone(&self.handlers);
        let outcome = match self.message.flags.opcode() {
            Some(Opcode::Query) => handlers.query.handle(self).await,
            Some(Opcode::Update) => handlers.update.handle(self).await,
            Some(Opcode::Notify) => handlers.notify.handle(self).await,
            Some(Opcode::Iquery) => {
                self.error(RequestError::Refused).await;
                Ok(())
            },
            Some(Opcode::Status) | None => {
                self.error(RequestError::NotImplemented).await;
                Ok(())
            },
        };
        if let Err(e) = outcome {
            warn!(client = self.id, error = %e, "handler failed");
            if matches!(self.state, ClientState::Working) {
                self.error(RequestError::Handler(e.to_string())).await;
            }
        }
    }

    /// Sends the reply the handler left in `message`, then finalizes.
    ///
    /// With the pool empty and sends still in flight the client parks in
    /// `Waiting`; the next send completion retries. With the pool empty
    /// and nothing in flight there is nothing to wait for and the request
    /// finalizes as out of memory.
    pub async fn send(&mut self) {
        let Some(mut buffer) = self.send_pool.acquire() else {
            if self.nsends > 0 {
                debug!(client = self.id, "send buffers exhausted, deferring");
                self.state = ClientState::Waiting;
                return;
            }
            self.next(Err(RequestError::NoMemory)).await;
            return;
        };

        if self.attrs.contains(ClientAttrs::RECURSION_AVAILABLE) {
            self.message.flags.set_ra(true);
        }

        let prefix = match self.mode {
            ClientMode::Tcp => TCP_LENGTH_PREFIX,
            ClientMode::Udp => 0,
        };
        if let Err(e) = render_response(&self.message, &mut buffer, prefix) {
            self.send_pool.release(buffer);
            self.next(Err(RequestError::Render(e))).await;
            return;
        }

        match self.schedule_send(buffer) {
            Ok(()) => {
                self.nsends += 1;
                self.next(Ok(())).await;
            },
            Err((e, buffer)) => {
                self.send_pool.release(buffer);
                self.next(Err(e)).await;
            },
        }
    }

    /// Hands the rendered buffer to a background task; completion comes
    /// back through the mailbox as `SendDone`.
    fn schedule_send(
        &mut self,
        buffer: BytesMut,
    ) -> Result<(), (RequestError, BytesMut)> {
        let mailbox = self.events_tx.clone();
        match self.mode {
            ClientMode::Udp => {
                let Some((dispatch, _)) = &self.dispatch else {
                    return Err((
                        RequestError::Internal("udp client without dispatch"),
                        buffer,
                    ));
                };
                let Some(addr) = self.dispevent.as_ref().map(|e| e.addr) else {
                    return Err((
                        RequestError::Internal("send without a dispatch event"),
                        buffer,
                    ));
                };
                let socket = dispatch.socket();
                tokio::spawn(async move {
                    let result = socket.send_to(&buffer, addr).await.map(|_| ());
                    let _ = mailbox
                        .send(ClientEvent::SendDone { result, buffer })
                        .await;
                });
            },
            ClientMode::Tcp => {
                let Some(writer) = self.tcp.as_ref().and_then(|t| t.writer.clone())
                else {
                    return Err((
                        RequestError::Transport(TransportError::Closed),
                        buffer,
                    ));
                };
                tokio::spawn(async move {
                    let result = writer.lock().await.write_all(&buffer).await;
                    let _ = mailbox
                        .send(ClientEvent::SendDone { result, buffer })
                        .await;
                });
            },
        }
        Ok(())
    }

    async fn send_done(&mut self, result: std::io::Result<()>, buffer: BytesMut) {
        self.nsends = self.nsends.saturating_sub(1);
        self.send_pool.release(buffer);
        if let Err(e) = result {
            debug!(client = self.id, error = %e, "send failed");
        }
        if matches!(self.state, ClientState::Waiting) {
            // the freed buffer serves the deferred response
            self.state = ClientState::Working;
            self.send().await;
        }
    }

    /// Converts a failure into an error response and sends it.
    pub async fn error(&mut self, err: RequestError) {
        let rcode = err.rcode();
        debug!(client = self.id, error = %err, %rcode, "request failed");

        // the codec refuses to build a reply from a message with QR set
        self.message.flags.clear_qr();
        if self.message.reply(true).is_err() && self.message.reply(false).is_err() {
            // not even an error packet can be produced; drop silently
            self.next(Err(err)).await;
            return;
        }
        self.message.flags.set_rcode(rcode);
        self.send().await;
    }

    /// Finalizes the current request and re-arms for the next one.
    pub async fn next(&mut self, result: FinishResult) {
        if let Err(e) = &result {
            debug!(client = self.id, error = %e, "request finalized with error");
        }
        if let Some(cb) = self.next_cb.take() {
            let _ = cb.send(result.clone());
        }

        self.view = None;
        self.signer = None;
        self.requesttime = None;
        self.now = None;
        self.query_ctx.reset();
        self.message.reset(Intent::Parse);
        self.timer.disarm();

        if self.mortal {
            // a replaced client is done once its request is finished
            self.shutdown.cancel();
            return;
        }

        match self.mode {
            ClientMode::Udp => {
                if let Some(event) = self.dispevent.take()
                    && let Some((dispatch, entry)) = &self.dispatch
                {
                    dispatch.free_event(entry, event);
                }
                self.state = ClientState::Listening;
            },
            ClientMode::Tcp => {
                let alive = self
                    .tcp
                    .as_ref()
                    .is_some_and(|t| t.reader.is_attached() && t.writer.is_some());
                if result.is_ok() && alive {
                    self.state = ClientState::Reading;
                    if let Some(timeout) = self.options.tcp_idle_timeout {
                        self.timer.arm(TimerKind::Idle, timeout);
                    }
                } else {
                    if let Some(t) = &mut self.tcp {
                        t.reader.cancel_read();
                        t.reader.invalidate();
                        t.writer = None;
                        t.peer = None;
                    }
                    self.state = ClientState::Listening;
                }
            },
        }
    }

    async fn on_accept(&mut self, res: std::io::Result<(TcpStream, SocketAddr)>) {
        match res {
            Ok((stream, peer)) => {
                self.naccepts += 1;
                debug!(client = self.id, %peer, "tcp connection accepted");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(client = self.id, error = %e, "set_nodelay failed");
                }
                let (read_half, write_half) = stream.into_split();
                if let Some(t) = &mut self.tcp {
                    t.reader.init(read_half);
                    t.writer = Some(Arc::new(Mutex::new(write_half)));
                    t.peer = Some(peer);
                }
                self.state = ClientState::Reading;
                if let Some(timeout) = self.options.tcp_idle_timeout {
                    self.timer.arm(TimerKind::Idle, timeout);
                }
            },
            Err(e) => {
                // going idle keeps the listener for the remaining
                // clients; this one waits for shutdown
                warn!(client = self.id, error = %e, "accept failed, client going idle");
                self.state = ClientState::Idle;
            },
        }
    }

    async fn on_timer(&mut self, kind: TimerKind) {
        debug!(client = self.id, ?kind, "timer fired");
        self.next(Err(RequestError::TimedOut)).await;
    }

    fn destroy(mut self) {
        self.state = ClientState::ShuttingDown;
        if let Some((dispatch, entry)) = self.dispatch.take() {
            dispatch.remove_request(entry, self.dispevent.take());
        }
        if let Some(t) = &mut self.tcp {
            t.reader.cancel_read();
            t.reader.invalidate();
            t.writer = None;
        }
        if self.nwaiting > 0 {
            warn!(
                client = self.id,
                nwaiting = self.nwaiting,
                "destroying client with waiters outstanding"
            );
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.detach_client(self.id);
        }
        debug!(
            client = self.id,
            nreads = self.nreads,
            naccepts = self.naccepts,
            "client destroyed"
        );
    }
}

/// Renders Question, Answer, Authority and Additional, in that order,
/// into one pooled buffer. Additional data that does not fit is left off;
/// for TCP the frame length lands in the first two bytes.
fn render_response(
    msg: &Message,
    buffer: &mut BytesMut,
    prefix: usize,
) -> Result<(), RenderError> {
    buffer.resize(prefix, 0);
    let limit = SEND_BUFFER_SIZE - prefix;

    let mut renderer = MessageRenderer::begin(msg, buffer, limit)?;
    renderer.section(Section::Question)?;
    renderer.section(Section::Answer)?;
    renderer.section(Section::Authority)?;
    match renderer.section(Section::Additional) {
        Ok(()) | Err(RenderError::NoSpace) => {},
    }
    renderer.end();

    if prefix > 0 {
        let len = (buffer.len() - prefix) as u16;
        buffer[..prefix].copy_from_slice(&len.to_be_bytes());
    }
    Ok(())
}
