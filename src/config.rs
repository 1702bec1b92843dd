//! Session configuration and remote host validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

/// How long the sender waits for an acknowledgement after sending `!status`.
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Port the receiver listens on, on every interface. `0` picks an ephemeral port.
    pub local_port: u16,
    /// Where the sender delivers every message.
    pub peer: SocketAddr,
    pub answer_timeout: Duration,
}

impl Config {
    pub fn new(local_port: u16, peer: SocketAddr) -> Config {
        Config {
            local_port,
            peer,
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
        }
    }

    pub fn with_answer_timeout(mut self, answer_timeout: Duration) -> Config {
        self.answer_timeout = answer_timeout;
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.local_port))
    }
}

/// Resolves the remote host argument: `localhost` or a dotted-quad IPv4 address.
pub fn parse_host(host: &str) -> Result<Ipv4Addr> {
    if host == "localhost" {
        return Ok(Ipv4Addr::LOCALHOST);
    }
    if !is_dotted_quad(host) {
        return Err(Error::InvalidHost(host.to_string()));
    }
    // The format check lets octets like 513 through.
    host.parse()
        .map_err(|_| Error::InvalidHost(host.to_string()))
}

/// Four dot-separated groups of one to three ASCII digits.
pub fn is_dotted_quad(host: &str) -> bool {
    let groups: Vec<&str> = host.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        private = { "192.168.0.10", true },
        loopback = { "127.0.0.1", true },
        zeros = { "0.0.0.0", true },
        out_of_range_octet = { "192.168.0.513", true },
        three_groups = { "192.168.0", false },
        five_groups = { "1.2.3.4.5", false },
        long_group = { "1.2.3.1000", false },
        empty_group = { "1..3.4", false },
        trailing_dot = { "1.2.3.4.", false },
        hostname = { "some-computer-name", false },
        letters = { "1.2.3.a", false },
        signed = { "1.2.3.+4", false },
        empty = { "", false },
    )]
    fn dotted_quad_format(host: &str, expected: bool) {
        assert_eq!(is_dotted_quad(host), expected);
    }

    #[test]
    fn localhost_maps_to_loopback() {
        assert_eq!(parse_host("localhost").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn dotted_quad_parses() {
        assert_eq!(
            parse_host("10.0.0.42").unwrap(),
            Ipv4Addr::new(10, 0, 0, 42)
        );
    }

    #[parameterized(
        hostname = { "some-computer-name" },
        out_of_range_octet = { "192.168.0.513" },
        ipv6 = { "::1" },
        uppercase_localhost = { "LOCALHOST" },
    )]
    fn rejected_hosts(host: &str) {
        assert!(matches!(parse_host(host), Err(Error::InvalidHost(h)) if h == host));
    }

    #[test]
    fn listens_on_every_interface() {
        let config = Config::new(3000, SocketAddr::from((Ipv4Addr::LOCALHOST, 3001)));
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.answer_timeout, DEFAULT_ANSWER_TIMEOUT);

        let config = config.with_answer_timeout(Duration::from_millis(250));
        assert_eq!(config.answer_timeout, Duration::from_millis(250));
    }
}
