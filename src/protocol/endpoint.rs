// Remote endpoint addressing
// (c) 2024 sendplz contributors

use std::{fmt::Display, net::IpAddr, str::FromStr};

use anyhow::Context as _;

use super::Selector;

/// Transport scheme: plain or TLS-protected WebSocket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Scheme {
    /// Plain websocket (`ws://`)
    #[default]
    Ws,
    /// Websocket over TLS (`wss://`)
    Wss,
}

/// A remote peer to connect to.
///
/// This is validated on construction and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Validating constructor.
    ///
    /// `host` must be an IP address or a syntactically valid DNS name; `port` must be in `[1, 65535]`.
    pub fn new(scheme: Scheme, host: &str, port: u16) -> anyhow::Result<Self> {
        anyhow::ensure!(port != 0, "port must be in the range 1-65535");
        // Accept IPv6 in its bracketed form too, as people tend to paste it from URIs
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.parse::<IpAddr>().is_err() && !is_valid_hostname(host) {
            anyhow::bail!("invalid network address `{host}`");
        }
        Ok(Self {
            scheme,
            host: host.to_owned(),
            port,
        })
    }

    /// Accessor
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }
    /// Accessor
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
    /// Accessor
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Constructs the connection URI for a given transfer kind, e.g. `ws://127.0.0.1:9001/file`
    #[must_use]
    pub fn uri(&self, selector: Selector) -> String {
        format!("{self}{}", selector.path())
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// Parses `[scheme://]host:port`. The scheme defaults to `ws`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (
                Scheme::from_str(scheme).with_context(|| format!("unknown scheme `{scheme}`"))?,
                rest,
            ),
            None => (Scheme::default(), s),
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let (host, port) = rest
            .rsplit_once(':')
            .with_context(|| format!("`{s}` is not of the form host:port"))?;
        let port = port
            .parse::<u16>()
            .with_context(|| format!("invalid port `{port}`"))?;
        Self::new(scheme, host, port)
    }
}

/// RFC 1123 host name check
fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
