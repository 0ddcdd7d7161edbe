pub mod coordination;
pub mod handlers;
pub mod logs;
pub mod replica;
pub mod server;
pub mod state;

pub use coordination::Coordination;
pub use logs::RecordLog;
pub use server::{ChatServer, ServerConfig};
pub use state::{ChannelRegistry, ServerCore};

use thiserror::Error;

/// Errors produced by the application server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("messaging error: {0}")]
    Messaging(#[from] tagarela_messaging::MessagingError),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("registry rejected {service}: {message}")]
    RegistryRefusal { service: String, message: String },
}
