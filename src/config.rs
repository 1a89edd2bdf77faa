use crate::constants::{
    DEFAULT_MAX_CURSORS, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_SESSIONS,
    DEFAULT_MAX_TRANSACTION_DEPTH, DEFAULT_RETRIEVE_BUFFER_SIZE, MAX_KEY_SIZE_LIMIT,
};
use crate::error::{Error, Result};
use crate::types::EngineParams;

/// Configuration for an engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Instance name, used in log output
    pub name: String,

    /// Maximum concurrently open sessions (default: 64)
    pub max_sessions: u32,

    /// Maximum open cursors across all sessions (default: 1024)
    pub max_cursors: u32,

    /// Maximum nesting of transactions per session (default: 7)
    pub max_transaction_depth: u32,

    /// Key size cap for indexes that do not declare one (default: 255)
    pub max_key_size: u32,

    /// Initial buffer for variable-size column retrieval (default: 256 bytes)
    pub retrieve_buffer_size: usize,

    /// Reuse log files instead of keeping them for recovery (default: false)
    pub circular_log: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "lumoisam".to_owned(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_cursors: DEFAULT_MAX_CURSORS,
            max_transaction_depth: DEFAULT_MAX_TRANSACTION_DEPTH,
            max_key_size: DEFAULT_MAX_KEY_SIZE as u32,
            retrieve_buffer_size: DEFAULT_RETRIEVE_BUFFER_SIZE,
            circular_log: false,
        }
    }
}

impl InstanceConfig {
    /// Create a new config with the given instance name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the session limit
    pub fn max_sessions(mut self, max: u32) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the cursor limit
    pub fn max_cursors(mut self, max: u32) -> Self {
        self.max_cursors = max;
        self
    }

    /// Set the transaction nesting limit
    pub fn max_transaction_depth(mut self, depth: u32) -> Self {
        self.max_transaction_depth = depth;
        self
    }

    /// Set the default index key size cap
    pub fn max_key_size(mut self, size: u32) -> Self {
        self.max_key_size = size;
        self
    }

    /// Set the initial retrieval buffer size
    pub fn retrieve_buffer_size(mut self, size: usize) -> Self {
        self.retrieve_buffer_size = size;
        self
    }

    /// Enable circular logging
    pub fn circular_log(mut self, enabled: bool) -> Self {
        self.circular_log = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(Error::InvalidParameter("max_sessions must be positive"));
        }
        if self.max_transaction_depth == 0 {
            return Err(Error::InvalidParameter(
                "max_transaction_depth must be positive",
            ));
        }
        if self.max_key_size == 0 || self.max_key_size as usize > MAX_KEY_SIZE_LIMIT {
            return Err(Error::InvalidParameter("max_key_size out of range"));
        }
        if self.retrieve_buffer_size == 0 {
            return Err(Error::InvalidParameter(
                "retrieve_buffer_size must be positive",
            ));
        }
        Ok(())
    }

    /// Parameters handed to the engine when the instance starts
    pub(crate) fn engine_params(&self) -> EngineParams {
        EngineParams {
            name: self.name.clone(),
            max_sessions: self.max_sessions,
            max_cursors: self.max_cursors,
            max_transaction_depth: self.max_transaction_depth,
            max_key_size: self.max_key_size,
            circular_log: self.circular_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InstanceConfig::default();
        assert_eq!(config.max_transaction_depth, 7);
        assert_eq!(config.max_key_size, 255);
        assert_eq!(config.retrieve_buffer_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = InstanceConfig::new("test")
            .max_sessions(2)
            .max_transaction_depth(3)
            .circular_log(true);
        assert_eq!(config.engine_params().max_sessions, 2);
        assert_eq!(config.engine_params().name, "test");
        assert!(config.engine_params().circular_log);

        assert!(InstanceConfig::default().max_key_size(5000).validate().is_err());
        assert!(InstanceConfig::default().max_sessions(0).validate().is_err());
    }
}
