//! TOML declarations of the exchanges a virtual host starts with.
//!
//! ```toml
//! [exchanges.orders]
//! type = "topic"
//! durable = true
//! alternate_exchange = "orders.unroutable"
//!
//! [exchanges."orders.unroutable"]
//! type = "fanout"
//! ```

use crate::error::{ExchangeError, Result};
use crate::strategy::{ExchangeType, MAX_BINDING_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Exchange names share the AMQP short-string limit with binding keys
pub const MAX_EXCHANGE_NAME_LENGTH: usize = MAX_BINDING_KEY_LENGTH;

/// Top-level exchanges configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExchangesConfig {
    /// Map of exchange name to declaration
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
}

/// Declaration of a single exchange
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(rename = "type")]
    pub exchange_type: ExchangeType,

    #[serde(default)]
    pub durable: bool,

    #[serde(default)]
    pub auto_delete: bool,

    /// Name of the exchange that receives messages this one cannot route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_exchange: Option<String>,
}

impl ExchangeConfig {
    pub fn new(exchange_type: ExchangeType) -> Self {
        Self {
            exchange_type,
            durable: false,
            auto_delete: false,
            alternate_exchange: None,
        }
    }

    pub fn with_alternate(mut self, alternate: impl Into<String>) -> Self {
        self.alternate_exchange = Some(alternate.into());
        self
    }

    /// Checks that only need this declaration
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ExchangeError::invalid_config(
                "exchange name must not be empty",
            ));
        }
        if name.len() > MAX_EXCHANGE_NAME_LENGTH {
            return Err(ExchangeError::invalid_config(format!(
                "exchange name '{}...' is {} bytes, limit is {}",
                name.chars().take(32).collect::<String>(),
                name.len(),
                MAX_EXCHANGE_NAME_LENGTH
            )));
        }
        if !self.exchange_type.is_builtin() {
            return Err(ExchangeError::invalid_config(format!(
                "exchange '{}' has unknown type '{}'",
                name, self.exchange_type
            )));
        }
        if self.alternate_exchange.as_deref() == Some(name) {
            return Err(ExchangeError::invalid_config(format!(
                "exchange '{}' cannot be its own alternate",
                name
            )));
        }
        Ok(())
    }
}

impl ExchangesConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExchangeError::invalid_config(format!("failed to parse TOML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ExchangeError::invalid_config(format!("failed to serialize TOML: {}", e)))
    }

    pub fn get(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.get(name)
    }

    /// Validate every declaration, alternate references, and alternate cycles
    pub fn validate(&self) -> Result<()> {
        for (name, config) in &self.exchanges {
            config.validate(name)?;
        }

        for (name, config) in &self.exchanges {
            if let Some(alternate) = &config.alternate_exchange {
                if !self.exchanges.contains_key(alternate) && !is_builtin_name(alternate) {
                    return Err(ExchangeError::invalid_config(format!(
                        "exchange '{}' references unknown alternate exchange '{}'",
                        name, alternate
                    )));
                }
            }
        }

        self.detect_alternate_cycles()
    }

    /// Names in declaration-independent (sorted) order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exchanges.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn detect_alternate_cycles(&self) -> Result<()> {
        for name in self.names() {
            let mut path = Vec::new();
            if self.has_alternate_cycle(name, &mut path) {
                return Err(ExchangeError::invalid_config(format!(
                    "alternate exchange cycle: {}",
                    path.join(" -> ")
                )));
            }
        }
        Ok(())
    }

    /// DFS along alternate links; every exchange has at most one, so the
    /// walk is a chain and `path` ends with the repeated name on a cycle
    fn has_alternate_cycle<'a>(&'a self, name: &'a str, path: &mut Vec<&'a str>) -> bool {
        let seen = path.contains(&name);
        path.push(name);
        if seen {
            return true;
        }

        match self
            .exchanges
            .get(name)
            .and_then(|config| config.alternate_exchange.as_deref())
        {
            Some(next) => self.has_alternate_cycle(next, path),
            None => false,
        }
    }
}

/// Names the broker pre-declares in every virtual host
pub fn is_builtin_name(name: &str) -> bool {
    ExchangeType::BUILTIN
        .iter()
        .any(|exchange_type| exchange_type.default_exchange_name() == Some(name))
}
