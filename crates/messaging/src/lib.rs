pub mod broker;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod proxy;
pub mod pubsub;
pub mod records;
pub mod reqrep;
pub mod topics;
pub mod traits;
pub mod transport;

pub use clock::LamportClock;
pub use config::Topology;
pub use envelope::{now_iso, Envelope, Payload};
pub use error::MessagingError;
pub use records::{ElectionAnnouncement, MessageRecord, PublishRecord, Record, ServerIdentity};
pub use reqrep::{BackendSocket, ReplyToken, RequestClient, RequestServer};
pub use broker::{BrokerMetrics, RequestBroker, RequestBrokerConfig};
pub use proxy::{TopicProxy, TopicProxyConfig};
pub use pubsub::{Publisher, Subscriber};
pub use traits::{CommandHandler, FramePublisher, FrameSubscriber, RequestSender};
pub use transport::Transport;
