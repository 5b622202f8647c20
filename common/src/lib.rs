pub mod cache;
pub mod config;
pub mod error;
pub mod normalize;
pub mod profile;
pub mod prompt;
pub mod session;
pub mod topics;
pub mod types;

pub use cache::TtlCache;
pub use config::{DashboardConfig, EndpointConfig, RetryConfig};
pub use error::ParseError;
pub use normalize::{normalize, ChartPoint, MetricCard, ReadingRow, ReadingTable};
pub use profile::{rows_to_map, rows_to_profiles};
pub use prompt::{ChatMessage, ChatRole, WeatherContext};
pub use session::{Credentials, RequestCounter, Session};
pub use topics::{ChatTopic, INVALID_TOPIC_MESSAGE};
pub use types::{
    DeviceProfile, Language, Measurement, Metric, ReadingRecord, WeatherSnapshot, MISSING_MARKER,
};
