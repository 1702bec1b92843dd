//! # A two-party peer-to-peer terminal chat over UDP.
//!
//! Each instance listens on a local port and sends to a single remote peer. In the terminal a
//! user can:
//!
//! 1. Type a line to send it to the peer.
//! 2. Type `!status` to ask whether the peer is reachable. The screen shows `Online` if the
//!    peer acknowledged within the answer timeout and `Offline` otherwise.
//! 3. Type `!exit` to shut down both instances.
//!
//! Every payload is passed through a reversible byte shift (see [`message::ShiftCodec`]) before
//! it hits the wire and after it comes off it.
//!
//! Architecture:
//!
//! ```text
//!   stdin                                                       stdout
//!     v                                                           ^
//! +----------+   outbound   +--------+      UDP      +----------+  inbound  +---------+
//! | Keyboard |--> Queue --->| Sender |--ShiftCodec-->| Receiver |--> Queue->| Printer |
//! +----------+      ^       +--------+    (peer)     +----------+     ^     +---------+
//!                   |            |                     |    |         |
//!                   |            +--> Presence <-------+    |         |
//!                   |                 Tracker               |         |
//!                   +---- !acknowledgement -----------------+---------+
//!
//!                   shutdown: CancellationToken, observed by all four workers
//! ```
//!
//! The [`session`] module owns the shared [`session::Context`], starts the four workers and
//! joins them once the shutdown token fires.

pub mod config;
pub mod error;
pub mod message;
pub mod peer;
pub mod presence;
pub mod queue;
pub mod session;
pub mod terminal;

pub use config::Config;
pub use error::{Error, Result};
pub use session::Session;

/// Largest payload carried by a single datagram, in bytes.
pub const MAX_MESSAGE_LEN: usize = 4000;
