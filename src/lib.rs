pub mod actors;
pub mod config;
pub mod connector;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod state;
pub mod types;

pub use actors::messages::ConnectionState;
pub use actors::store::StoreHandle;
pub use config::Config;
pub use dashboard::Dashboard;
pub use error::{FeedError, FeedResult};
pub use events::{MetricEvent, MetricPayload, ServiceCheckEvent, StreamEvent};
pub use state::{AlertEntry, MetricPoint, StoreSnapshot};
