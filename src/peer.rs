//! Defines IO with the chat peer.
//!
//! Each direction has its own socket and its own worker. The [`Sender`] owns an ephemeral
//! socket used only for outgoing datagrams; the [`Receiver`] owns the socket bound to the local
//! port the peer sends to.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::message::{Control, ShiftCodec};
use crate::presence::{PresenceRound, PresenceState};
use crate::session::Context;
use crate::terminal::ScreenItem;

/// How many times the receiver tries to open its socket again after a receive error.
pub const REOPEN_ATTEMPTS: u32 = 3;
/// Pause before the second attempt. Grows linearly with every further attempt.
const REOPEN_BACKOFF: Duration = Duration::from_millis(100);

type Framed = UdpFramed<ShiftCodec>;

async fn bind(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

/// Drains the outbound queue onto the wire and keeps track of `!status` rounds.
pub struct Sender {
    socket: UdpSocket,
    codec: ShiftCodec,
    buf: BytesMut,
    peer: SocketAddr,
    answer_timeout: Duration,
    ctx: Arc<Context>,
}

impl Sender {
    pub async fn bind(
        peer: SocketAddr,
        answer_timeout: Duration,
        ctx: Arc<Context>,
    ) -> Result<Sender> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        Ok(Sender {
            socket: bind(local).await?,
            codec: ShiftCodec::new(),
            buf: BytesMut::new(),
            peer,
            answer_timeout,
            ctx,
        })
    }

    /// Sends queued messages until shutdown.
    ///
    /// At most one `!status` round is open at a time. Messages keep flowing while it is open,
    /// and a newer `!status` replaces it.
    pub async fn run(mut self) -> Result<()> {
        debug!(peer = %self.peer, "sender worker started");
        let mut round: Option<PresenceRound> = None;
        loop {
            tokio::select! {
                seen = settle(round.as_mut()) => {
                    round = None;
                    self.finish_round(seen);
                }
                payload = self.ctx.outbound.pop(&self.ctx.shutdown) => {
                    let Some(payload) = payload else { break };
                    if Control::parse(&payload) == Some(Control::Status) {
                        round = Some(self.ctx.presence.begin_round(self.answer_timeout));
                    }
                    self.send(payload).await;
                }
            }
        }
        debug!("sender worker stopped");
        Ok(())
    }

    /// Encodes and sends one message. A message that cannot be sent is dropped.
    async fn send(&mut self, payload: Bytes) {
        self.buf.clear();
        let len = payload.len();
        if let Err(err) = self.codec.encode(payload, &mut self.buf) {
            warn!(len, error = %err, "dropping message that could not be encoded");
            return;
        }
        trace!(len, "sending datagram");
        if let Err(err) = self.socket.send_to(&self.buf, self.peer).await {
            warn!(
                peer = %self.peer,
                len,
                error = %err,
                "dropping message that could not be sent"
            );
        }
    }

    /// The receiver renders `Online` itself when the acknowledgement lands; a timeout is ours
    /// to report.
    fn finish_round(&self, seen: PresenceState) {
        match seen {
            PresenceState::Online => {
                debug!("peer answered !status");
                self.ctx.presence.reset();
            }
            PresenceState::Offline => {
                debug!(timeout = ?self.answer_timeout, "no acknowledgement from peer");
                self.ctx
                    .inbound
                    .push(ScreenItem::Presence(PresenceState::Offline));
            }
        }
    }
}

/// Settles the open round, or never resolves when there is none.
async fn settle(round: Option<&mut PresenceRound>) -> PresenceState {
    match round {
        Some(round) => round.settle().await,
        None => std::future::pending().await,
    }
}

/// Listens on the local port and routes every datagram to the right place.
pub struct Receiver {
    socket: Option<Framed>,
    addr: SocketAddr,
    ctx: Arc<Context>,
}

impl Receiver {
    pub async fn bind(addr: SocketAddr, ctx: Arc<Context>) -> Result<Receiver> {
        let socket = bind(addr).await?;
        // Remember the real port so a re-open lands on the same one when asked for port 0.
        let addr = socket.local_addr().map_err(Error::Socket)?;
        Ok(Receiver {
            socket: Some(UdpFramed::new(socket, ShiftCodec::new())),
            addr,
            ctx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(mut self) -> Result<()> {
        debug!(addr = %self.addr, "receiver worker started");
        while let Some(socket) = self.socket.as_mut() {
            let datagram = tokio::select! {
                datagram = socket.next() => datagram,
                () = self.ctx.shutdown.cancelled() => break,
            };
            match datagram {
                Some(Ok((payload, from))) => {
                    trace!(%from, len = payload.len(), "received datagram");
                    dispatch(&self.ctx, payload);
                }
                Some(Err(err)) => self.recover(err).await?,
                None => self.recover(io::ErrorKind::UnexpectedEof.into()).await?,
            }
        }
        debug!("receiver worker stopped");
        Ok(())
    }

    /// Closes the listening socket and opens it again on the same address.
    ///
    /// Gives up with [`Error::Bind`] after [`REOPEN_ATTEMPTS`] failed attempts. Returns early,
    /// without a socket, when the session shuts down in the meantime.
    pub async fn recover(&mut self, cause: io::Error) -> Result<()> {
        warn!(
            addr = %self.addr,
            error = %cause,
            "receive failed, re-opening the listening socket"
        );
        // The port has to be released before it can be bound again.
        self.socket = None;

        let mut attempt = 1;
        loop {
            match bind(self.addr).await {
                Ok(socket) => {
                    info!(addr = %self.addr, attempt, "listening socket re-opened");
                    self.socket = Some(UdpFramed::new(socket, ShiftCodec::new()));
                    return Ok(());
                }
                Err(err) if attempt < REOPEN_ATTEMPTS => {
                    warn!(attempt, error = %err, "could not re-open the listening socket");
                    tokio::select! {
                        () = tokio::time::sleep(REOPEN_BACKOFF * attempt) => {}
                        () = self.ctx.shutdown.cancelled() => return Ok(()),
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Routes one decoded datagram.
pub fn dispatch(ctx: &Context, payload: Bytes) {
    match Control::parse(&payload) {
        Some(Control::Status) => ctx.outbound.push(Control::Acknowledgement.to_bytes()),
        Some(Control::Acknowledgement) => {
            ctx.presence.mark_online();
            ctx.inbound.push(ScreenItem::Presence(PresenceState::Online));
        }
        Some(Control::Exit) => {
            info!("peer left the chat");
            ctx.inbound.push(ScreenItem::Text(payload));
            ctx.shutdown.cancel();
        }
        None => ctx.inbound.push(ScreenItem::Text(payload)),
    }
}
