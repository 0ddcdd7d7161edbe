use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;
use crate::transport::Transport;

/// Endpoint topology for a tagarela deployment.
///
/// Parsed from `tagarela.toml` with `TAGARELA_*` environment variable
/// overrides. Every component reads the same file, so one document
/// describes the whole federation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Topology {
    /// Request broker endpoints.
    #[serde(default)]
    pub broker: BrokerEndpoints,

    /// Pub/sub proxy endpoints.
    #[serde(default)]
    pub proxy: ProxyEndpoints,

    /// Registry endpoint.
    #[serde(default)]
    pub registry: RegistryEndpoint,
}

/// Broker section: the client-facing request router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerEndpoints {
    /// Where clients connect (broker binds ROUTER here).
    #[serde(default = "default_broker_frontend")]
    pub frontend: String,

    /// Where servers connect (broker binds DEALER here).
    #[serde(default = "default_broker_backend")]
    pub backend: String,
}

fn default_broker_frontend() -> String {
    "tcp://0.0.0.0:5555".into()
}

fn default_broker_backend() -> String {
    "tcp://0.0.0.0:5556".into()
}

impl Default for BrokerEndpoints {
    fn default() -> Self {
        Self {
            frontend: default_broker_frontend(),
            backend: default_broker_backend(),
        }
    }
}

/// Proxy section: the topic fan-out fabric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEndpoints {
    /// Where publishers connect.
    #[serde(default = "default_proxy_frontend")]
    pub frontend: String,

    /// Where subscribers connect.
    #[serde(default = "default_proxy_backend")]
    pub backend: String,
}

fn default_proxy_frontend() -> String {
    "tcp://0.0.0.0:5557".into()
}

fn default_proxy_backend() -> String {
    "tcp://0.0.0.0:5558".into()
}

impl Default for ProxyEndpoints {
    fn default() -> Self {
        Self {
            frontend: default_proxy_frontend(),
            backend: default_proxy_backend(),
        }
    }
}

/// Registry section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    #[serde(default = "default_registry_endpoint")]
    pub endpoint: String,
}

fn default_registry_endpoint() -> String {
    "tcp://0.0.0.0:6000".into()
}

impl Default for RegistryEndpoint {
    fn default() -> Self {
        Self {
            endpoint: default_registry_endpoint(),
        }
    }
}

impl Topology {
    /// Parse from a TOML string, then apply environment overrides and
    /// validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, MessagingError> {
        let mut topology: Self = toml::from_str(toml_str)?;
        topology.apply_env_overrides();
        topology.validate()?;
        Ok(topology)
    }

    /// Load from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MessagingError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides, for deployments without a
    /// config file.
    pub fn from_env() -> Result<Self, MessagingError> {
        let mut topology = Self::default();
        topology.apply_env_overrides();
        topology.validate()?;
        Ok(topology)
    }

    /// Apply `TAGARELA_SECTION_KEY` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TAGARELA_BROKER_FRONTEND") {
            self.broker.frontend = v;
        }
        if let Ok(v) = std::env::var("TAGARELA_BROKER_BACKEND") {
            self.broker.backend = v;
        }
        if let Ok(v) = std::env::var("TAGARELA_PROXY_FRONTEND") {
            self.proxy.frontend = v;
        }
        if let Ok(v) = std::env::var("TAGARELA_PROXY_BACKEND") {
            self.proxy.backend = v;
        }
        if let Ok(v) = std::env::var("TAGARELA_REGISTRY_ENDPOINT") {
            self.registry.endpoint = v;
        }
    }

    /// Ensure every endpoint parses as a supported transport.
    pub fn validate(&self) -> Result<(), MessagingError> {
        for (name, endpoint) in [
            ("broker.frontend", &self.broker.frontend),
            ("broker.backend", &self.broker.backend),
            ("proxy.frontend", &self.proxy.frontend),
            ("proxy.backend", &self.proxy.backend),
            ("registry.endpoint", &self.registry.endpoint),
        ] {
            Transport::parse(endpoint).map_err(|e| {
                MessagingError::Config(format!("{name}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn broker_frontend(&self) -> Transport {
        Transport::parse(&self.broker.frontend).unwrap_or_else(|_| Transport::tcp("0.0.0.0", 5555))
    }

    pub fn broker_backend(&self) -> Transport {
        Transport::parse(&self.broker.backend).unwrap_or_else(|_| Transport::tcp("0.0.0.0", 5556))
    }

    pub fn proxy_frontend(&self) -> Transport {
        Transport::parse(&self.proxy.frontend).unwrap_or_else(|_| Transport::tcp("0.0.0.0", 5557))
    }

    pub fn proxy_backend(&self) -> Transport {
        Transport::parse(&self.proxy.backend).unwrap_or_else(|_| Transport::tcp("0.0.0.0", 5558))
    }

    pub fn registry_endpoint(&self) -> Transport {
        Transport::parse(&self.registry.endpoint).unwrap_or_else(|_| Transport::tcp("0.0.0.0", 6000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_standard_ports() {
        let t = Topology::default();
        assert_eq!(t.broker.frontend, "tcp://0.0.0.0:5555");
        assert_eq!(t.broker.backend, "tcp://0.0.0.0:5556");
        assert_eq!(t.proxy.frontend, "tcp://0.0.0.0:5557");
        assert_eq!(t.proxy.backend, "tcp://0.0.0.0:5558");
        assert_eq!(t.registry.endpoint, "tcp://0.0.0.0:6000");
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let toml = r#"
[broker]
frontend = "tcp://10.0.0.1:7555"
"#;
        let t = Topology::from_toml(toml).unwrap();
        assert_eq!(t.broker.frontend, "tcp://10.0.0.1:7555");
        assert_eq!(t.broker.backend, "tcp://0.0.0.0:5556");
        assert_eq!(t.registry.endpoint, "tcp://0.0.0.0:6000");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let toml = r#"
[registry]
endpoint = "carrier-pigeon://roof"
"#;
        let err = Topology::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("registry.endpoint"));
    }

    #[test]
    fn env_override_registry_endpoint() {
        // SAFETY: test-only, nextest runs each test in its own process
        unsafe {
            std::env::set_var("TAGARELA_REGISTRY_ENDPOINT", "tcp://override:6001");
        }
        let t = Topology::from_toml("").unwrap();
        assert_eq!(t.registry.endpoint, "tcp://override:6001");
        unsafe {
            std::env::remove_var("TAGARELA_REGISTRY_ENDPOINT");
        }
    }

    #[test]
    fn transport_accessors_parse() {
        let t = Topology::default();
        assert_eq!(t.broker_frontend().endpoint(), "tcp://0.0.0.0:5555");
        assert_eq!(t.registry_endpoint().endpoint(), "tcp://0.0.0.0:6000");
    }
}
