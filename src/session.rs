//! Starts the four workers of a chat session and stops them again.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::peer::{Receiver, Sender};
use crate::presence::PresenceTracker;
use crate::queue::Queue;
use crate::terminal::{Keyboard, Printer, ScreenItem};

/// State shared by every worker of a session.
#[derive(Debug, Default)]
pub struct Context {
    /// Lines waiting to go out. Filled by the keyboard and by the receiver (acknowledgements),
    /// drained by the sender.
    pub outbound: Queue<Bytes>,
    /// Things waiting to be shown. Filled by the receiver and by the sender (unanswered `!status`),
    /// drained by the printer.
    pub inbound: Queue<ScreenItem>,
    /// Set online by the receiver, put back offline by the sender.
    pub presence: PresenceTracker,
    /// Cancelled by the keyboard or the receiver when either side leaves. Never reset.
    pub shutdown: CancellationToken,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }
}

/// A running chat session.
pub struct Session {
    ctx: Arc<Context>,
    local_addr: SocketAddr,
    workers: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl Session {
    /// Binds both sockets and spawns the keyboard, receiver, printer and sender workers.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start<R, W>(config: &Config, input: R, output: W) -> Result<Session>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let ctx = Arc::new(Context::new());
        let receiver = Receiver::bind(config.listen_addr(), ctx.clone()).await?;
        let local_addr = receiver.local_addr();
        let sender = Sender::bind(config.peer, config.answer_timeout, ctx.clone()).await?;
        info!(%local_addr, peer = %config.peer, "chat session started");

        let workers = vec![
            spawn("keyboard", &ctx, Keyboard::new(input, ctx.clone()).run()),
            spawn("receiver", &ctx, receiver.run()),
            spawn("printer", &ctx, Printer::new(output, ctx.clone()).run()),
            spawn("sender", &ctx, sender.run()),
        ];

        Ok(Session {
            ctx,
            local_addr,
            workers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Waits for either side to leave, then joins every worker in start order.
    ///
    /// Returns the first error a worker reported.
    pub async fn wait(self) -> Result<()> {
        self.ctx.shutdown.cancelled().await;
        info!("shutting down");

        let mut result = Ok(());
        for (worker, handle) in self.workers {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(source) => Err(Error::Worker { worker, source }),
            };
            match outcome {
                Ok(()) => debug!(worker, "worker joined"),
                Err(err) => {
                    error!(worker, error = %err, "worker failed");
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }
}

/// Runs a whole session: start, then wait for it to end.
pub async fn run<R, W>(config: &Config, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    Session::start(config, input, output).await?.wait().await
}

/// Spawns a worker. A worker that fails takes the rest of the session down with it.
fn spawn<F>(
    worker: &'static str,
    ctx: &Arc<Context>,
    task: F,
) -> (&'static str, JoinHandle<Result<()>>)
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        let outcome = task.await;
        if outcome.is_err() {
            ctx.shutdown.cancel();
        }
        outcome
    });
    (worker, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt, BufReader};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn exit_from_keyboard_stops_every_worker() {
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let config = Config::new(0, peer.local_addr().unwrap());
        let (mut user, input) = duplex(1024);
        let (output, _screen) = duplex(64 * 1024);

        let session = Session::start(&config, BufReader::new(input), output)
            .await
            .unwrap();
        let ctx = session.context().clone();
        user.write_all(b"!exit\n").await.unwrap();

        timeout(WAIT, session.wait()).await.unwrap().unwrap();
        assert!(ctx.shutdown.is_cancelled());
        assert!(ctx.outbound.is_empty());

        // The exit line went out before the sender stopped.
        peer.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(crate::message::decode(&buf[..len]), b"!exit\n");
    }

    #[tokio::test]
    async fn failing_worker_shuts_the_session_down() {
        let ctx = Arc::new(Context::new());
        let (worker, handle) = spawn("receiver", &ctx, async {
            Err(Error::Socket(std::io::Error::other("socket closed")))
        });
        assert_eq!(worker, "receiver");

        let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(Error::Socket(_))));
        assert!(ctx.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn start_fails_when_the_port_is_taken() {
        let taken = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = Config::new(port, SocketAddr::from((Ipv4Addr::LOCALHOST, 9)));
        let (_user, input) = duplex(16);
        let (output, _screen) = duplex(16);

        let err = Session::start(&config, BufReader::new(input), output)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Bind { .. }), "unexpected error: {err}");
    }
}
