//! # Exchange Error Types
//!
//! Only two kinds of failure ever reach a caller of the routing core:
//! programming misuse (operating on an exchange that was never initialised,
//! initialising twice, mutating a closed exchange) and malformed bindings.
//! Everything on the publish path that is not misuse is absorbed and counted.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("Exchange used before initialize()")]
    NotInitialized,

    #[error("Exchange '{name}' is already initialized")]
    AlreadyInitialized { name: String },

    #[error("Invalid binding key '{key}' for {exchange_type} exchange: {reason}")]
    InvalidBindingKey {
        exchange_type: String,
        key: String,
        reason: String,
    },

    #[error("Invalid binding arguments for {exchange_type} exchange: {reason}")]
    InvalidArguments {
        exchange_type: String,
        reason: String,
    },

    #[error("Binding targets exchange '{binding_exchange}' but was offered to '{exchange}'")]
    ExchangeMismatch {
        binding_exchange: String,
        exchange: String,
    },

    #[error("Exchange '{name}' is closed")]
    Closed { name: String },

    #[error("Unknown exchange type: {0}")]
    UnknownExchangeType(String),

    #[error("Exchange '{name}' already declared as {existing}, cannot redeclare as {requested}")]
    TypeMismatch {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Exchange '{name}' is still referenced by {referrers} referrer(s)")]
    ExchangeInUse { name: String, referrers: usize },

    #[error("Exchange already registered: {0}")]
    AlreadyExists(String),

    #[error("Exchange not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Event sink error: {0}")]
    EventSink(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ExchangeError {
    /// Caller-side programming errors (taxonomy "initialization misuse")
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            ExchangeError::NotInitialized
                | ExchangeError::AlreadyInitialized { .. }
                | ExchangeError::Closed { .. }
        )
    }

    /// Errors raised at bind time that leave the binding set untouched
    pub fn is_invalid_binding(&self) -> bool {
        matches!(
            self,
            ExchangeError::InvalidBindingKey { .. }
                | ExchangeError::InvalidArguments { .. }
                | ExchangeError::ExchangeMismatch { .. }
        )
    }

    /// Create an invalid binding key error
    pub fn invalid_binding_key(
        exchange_type: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ExchangeError::InvalidBindingKey {
            exchange_type: exchange_type.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(exchange_type: impl Into<String>, reason: impl Into<String>) -> Self {
        ExchangeError::InvalidArguments {
            exchange_type: exchange_type.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ExchangeError::InvalidConfig(msg.into())
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Io(err.to_string())
    }
}

/// Result type alias for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ExchangeError::NotInitialized.is_misuse());
        assert!(ExchangeError::Closed {
            name: "orders".to_string()
        }
        .is_misuse());
        assert!(!ExchangeError::NotInitialized.is_invalid_binding());

        let err = ExchangeError::invalid_binding_key("topic", "a.b*", "mixed wildcard");
        assert!(err.is_invalid_binding());
        assert!(!err.is_misuse());
        assert_eq!(
            err.to_string(),
            "Invalid binding key 'a.b*' for topic exchange: mixed wildcard"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.toml");
        let err: ExchangeError = io.into();
        assert!(matches!(err, ExchangeError::Io(ref msg) if msg.contains("missing.toml")));
    }
}
