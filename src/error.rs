use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid remote host {0:?}: expected `localhost` or a dotted-quad IPv4 address")]
    InvalidHost(String),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("terminal I/O failed: {0}")]
    Terminal(#[source] io::Error),

    #[error("{worker} worker did not finish: {source}")]
    Worker {
        worker: &'static str,
        #[source]
        source: JoinError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
