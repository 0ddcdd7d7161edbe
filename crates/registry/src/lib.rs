pub mod service;
pub mod state;

pub use service::RegistryService;
pub use state::RegistryState;

use thiserror::Error;

/// Errors produced by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("messaging error: {0}")]
    Messaging(#[from] tagarela_messaging::MessagingError),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
