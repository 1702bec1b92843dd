//! The user-facing half of a session: reading typed lines and printing what arrives.
//!
//! Both workers are generic over their I/O so a session can be driven by the real terminal or
//! by in-memory pipes.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::message::Control;
use crate::presence::PresenceState;
use crate::session::Context;
use crate::MAX_MESSAGE_LEN;

pub const WELCOME: &str = "Welcome to peerchat! Type a message and press enter to send it.";

/// Something for the printer to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenItem {
    /// Chat text exactly as it arrived.
    Text(Bytes),
    /// Render the peer's presence as it was when the item was queued.
    Presence(PresenceState),
}

/// Reads lines from the user and queues them for the sender.
pub struct Keyboard<R> {
    input: R,
    ctx: Arc<Context>,
}

impl<R> Keyboard<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(input: R, ctx: Arc<Context>) -> Keyboard<R> {
        Keyboard { input, ctx }
    }

    pub async fn run(mut self) -> Result<()> {
        debug!("keyboard worker started");
        let mut line = Vec::with_capacity(256);
        while !self.ctx.shutdown.is_cancelled() {
            line.clear();
            let read = tokio::select! {
                read = self.input.read_until(b'\n', &mut line) => read.map_err(Error::Terminal)?,
                () = self.ctx.shutdown.cancelled() => break,
            };

            if read == 0 {
                info!("input closed, leaving the chat");
                self.ctx.outbound.push(Control::Exit.to_bytes());
                self.ctx.shutdown.cancel();
                break;
            }

            let exit = Control::parse(&line) == Some(Control::Exit);
            for chunk in line.chunks(MAX_MESSAGE_LEN) {
                self.ctx.outbound.push(Bytes::copy_from_slice(chunk));
            }
            if exit {
                info!("exit requested from the keyboard");
                self.ctx.shutdown.cancel();
                break;
            }
        }
        debug!("keyboard worker stopped");
        Ok(())
    }
}

/// Drains the inbound queue onto the screen.
pub struct Printer<W> {
    output: W,
    ctx: Arc<Context>,
}

impl<W> Printer<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(output: W, ctx: Arc<Context>) -> Printer<W> {
        Printer { output, ctx }
    }

    pub async fn run(mut self) -> Result<()> {
        debug!("printer worker started");
        self.write_line(WELCOME.as_bytes()).await?;

        while let Some(item) = self.ctx.inbound.pop(&self.ctx.shutdown).await {
            match item {
                ScreenItem::Text(text) => self.write_line(&text).await?,
                ScreenItem::Presence(state) => {
                    let text = state.to_string();
                    self.write_line(text.as_bytes()).await?
                }
            }
        }
        debug!("printer worker stopped");
        Ok(())
    }

    async fn write_line(&mut self, text: &[u8]) -> Result<()> {
        let output = &mut self.output;
        output.write_all(text).await.map_err(Error::Terminal)?;
        if !text.ends_with(b"\n") {
            output.write_all(b"\n").await.map_err(Error::Terminal)?;
        }
        output.flush().await.map_err(Error::Terminal)
    }
}
