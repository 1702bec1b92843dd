use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use peerchat::config::{self, Config};
use peerchat::session;

/// A two-party chat over UDP.
#[derive(Debug, Parser)]
#[command(
    name = "peerchat",
    version,
    after_help = "Examples:\n  peerchat 3000 192.168.0.13 3001\n  peerchat 3000 localhost 3001\n\n\
                  Type !status to check whether the peer is online, !exit to leave."
)]
struct Cli {
    /// Port to listen on for the peer's messages.
    local_port: u16,

    /// Peer address: `localhost` or a dotted-quad IPv4 address.
    #[arg(value_parser = parse_remote_host)]
    remote_host: Ipv4Addr,

    /// Port the peer listens on.
    remote_port: u16,

    /// How long to wait for the peer to answer `!status`, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    answer_timeout_ms: u64,
}

fn parse_remote_host(host: &str) -> Result<Ipv4Addr, String> {
    config::parse_host(host).map_err(|err| err.to_string())
}

impl Cli {
    fn config(&self) -> Config {
        Config::new(
            self.local_port,
            SocketAddr::from((self.remote_host, self.remote_port)),
        )
        .with_answer_timeout(Duration::from_millis(self.answer_timeout_ms))
    }
}

fn setup_logging() {
    // stdout belongs to the chat.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();
    let config = cli.config();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("peerchat: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(session::run(
        &config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));
    // The blocking stdin read cannot be interrupted, so don't wait on it.
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("peerchat: {err}");
            ExitCode::FAILURE
        }
    }
}
