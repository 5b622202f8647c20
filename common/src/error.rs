use thiserror::Error;

use crate::topics::INVALID_TOPIC_MESSAGE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("unknown language '{0}'. Use 'en' or 'ms'")]
    UnknownLanguage(String),
    #[error("{}", INVALID_TOPIC_MESSAGE)]
    UnknownTopic(String),
}
