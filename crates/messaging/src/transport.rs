use serde::{Deserialize, Serialize};

/// Transport layer for ZeroMQ connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Inter-process communication via Unix domain sockets.
    /// Fastest option for same-host deployments.
    Ipc(String),

    /// TCP transport for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// Create an IPC transport with the given socket name.
    ///
    /// The name is used as a path component under `/tmp/tagarela/`.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    /// Create a TCP transport with the given host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string like `tcp://host:port` or `ipc:///tmp/x.sock`.
    pub fn parse(endpoint: &str) -> Result<Self, crate::error::MessagingError> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            let name = std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    crate::error::MessagingError::Config(format!(
                        "invalid ipc endpoint '{endpoint}'"
                    ))
                })?;
            Ok(Self::ipc(name))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port_str) = addr.rsplit_once(':').ok_or_else(|| {
                crate::error::MessagingError::Config(format!(
                    "tcp endpoint '{endpoint}' is missing a port"
                ))
            })?;
            let port = port_str.parse().map_err(|_| {
                crate::error::MessagingError::Config(format!(
                    "tcp endpoint '{endpoint}' has an invalid port"
                ))
            })?;
            Ok(Self::tcp(host, port))
        } else {
            Err(crate::error::MessagingError::Config(format!(
                "unsupported endpoint scheme in '{endpoint}'"
            )))
        }
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc:///tmp/tagarela/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("broker");
        assert_eq!(t.endpoint(), "ipc:///tmp/tagarela/broker.sock");
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5555);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parse_tcp() {
        let t = Transport::parse("tcp://10.0.0.1:6000").unwrap();
        assert_eq!(t, Transport::tcp("10.0.0.1", 6000));
    }

    #[test]
    fn parse_ipc() {
        let t = Transport::parse("ipc:///tmp/tagarela/proxy.sock").unwrap();
        assert_eq!(t.endpoint(), "ipc:///tmp/tagarela/proxy.sock");
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(Transport::parse("tcp://localhost").is_err());
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        assert!(Transport::parse("udp://localhost:1").is_err());
    }

    #[test]
    fn display_matches_endpoint() {
        let t = Transport::tcp("localhost", 9090);
        assert_eq!(t.to_string(), t.endpoint());
    }
}
