//! Endpoint abstraction for network addressing.
//!
//! Parses `irc://host:port` style addresses into a host/port pair that is
//! resolved lazily at connect time.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// Default port used when an endpoint omits one.
pub const DEFAULT_PORT: u16 = 6667;

/// A network endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `irc://irc.example.net:6667`
    /// - `irc://irc.example.net` (default port)
    /// - `irc.example.net:6667`
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("irc://127.0.0.1:6667").unwrap();
    /// assert_eq!(endpoint.host(), "127.0.0.1");
    /// assert_eq!(endpoint.port(), 6667);
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Get the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the endpoint to a socket address.
    ///
    /// Uses the first address the system resolver returns.
    pub fn resolve(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no addresses for {}", self),
                )
            })
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = match s.split_once("://") {
            Some(("irc", rest)) => rest,
            Some((scheme, _)) => return Err(EndpointError::InvalidScheme(scheme.to_string())),
            None => s,
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(EndpointError::MissingHost(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "irc://{}:{}", self.host, self.port)
    }
}

/// Errors that can occur when parsing an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid scheme in endpoint: {0} (expected irc://)")]
    InvalidScheme(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("missing host in endpoint: {0}")]
    MissingHost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_url() {
        let endpoint = Endpoint::parse("irc://irc.example.net:6697").unwrap();
        assert_eq!(endpoint.host(), "irc.example.net");
        assert_eq!(endpoint.port(), 6697);
        assert_eq!(endpoint.to_string(), "irc://irc.example.net:6697");
    }

    #[test]
    fn parses_without_scheme() {
        let endpoint = Endpoint::parse("127.0.0.1:4000").unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 4000);
    }

    #[test]
    fn defaults_the_port() {
        let endpoint = Endpoint::parse("irc://irc.example.net").unwrap();
        assert_eq!(endpoint.port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_foreign_scheme() {
        let result = Endpoint::parse("http://irc.example.net");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn rejects_bad_port() {
        let result = Endpoint::parse("irc://host:notaport");
        assert!(matches!(result, Err(EndpointError::InvalidPort(_))));
    }

    #[test]
    fn rejects_empty_host() {
        let result = Endpoint::parse("irc://:6667");
        assert!(matches!(result, Err(EndpointError::MissingHost(_))));
    }

    #[test]
    fn resolves_loopback() {
        let endpoint = Endpoint::parse("127.0.0.1:6667").unwrap();
        let addr = endpoint.resolve().unwrap();
        assert!(addr.ip().is_loopback());
    }
}
