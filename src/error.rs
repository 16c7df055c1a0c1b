use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid compound expression: {0}")]
    InvalidExpression(String),

    #[error("unrecognized target engine '{engine}' in '{token}'")]
    UnknownEngine { engine: String, token: String },

    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("invalid IP/CIDR target: {0}")]
    InvalidIpTarget(String),

    #[error("unsupported target type: {0}")]
    UnsupportedTargetType(String),

    #[error("range resolver error: {0}")]
    RangeError(String),

    #[error("range matcher unavailable: no range resolver configured")]
    RangeUnavailable,

    #[error("backing store error: {0}")]
    StoreError(String),

    #[error("expression expands beyond {limit} tokens")]
    ExpansionLimit { limit: usize },

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("invalid function invocation: {0}")]
    InvalidInvocation(String),
}

impl From<regex::Error> for TargetError {
    fn from(err: regex::Error) -> Self {
        TargetError::InvalidRegex(err.to_string())
    }
}

impl From<serde_json::Error> for TargetError {
    fn from(err: serde_json::Error) -> Self {
        TargetError::ConfigError(err.to_string())
    }
}
