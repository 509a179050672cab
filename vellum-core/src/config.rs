//! Queue configuration.
//!
//! Declarative limits for a [Queue](crate::queue::Queue), loadable from YAML or JSON.
//! A missing limit means unbounded.

use crate::error::{Error, ErrorType};

/// Limits of a task queue.
///
/// # Example (YAML)
/// ```yaml
/// max_pending: 1
/// max_queued: 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximal number of concurrently running tasks.
    #[serde(default)]
    pub max_pending: Option<usize>,

    /// Maximal number of tasks waiting to be started.
    #[serde(default)]
    pub max_queued: Option<usize>,
}

impl QueueConfig {
    /// Configuration without limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration of a queue running one task at a time.
    pub fn serial() -> Self {
        QueueConfig {
            max_pending: Some(1),
            max_queued: None,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = Some(max_queued);
        self
    }

    /// Effective limit of running tasks, `usize::MAX` if unbounded.
    pub fn max_pending(&self) -> usize {
        self.max_pending.unwrap_or(usize::MAX)
    }

    /// Effective limit of waiting tasks, `usize::MAX` if unbounded.
    pub fn max_queued(&self) -> usize {
        self.max_queued.unwrap_or(usize::MAX)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::new(
                ErrorType::ParseError,
                format!("Failed to parse YAML queue configuration: {}", e),
            )
        })
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            Error::new(
                ErrorType::ParseError,
                format!("Failed to parse JSON queue configuration: {}", e),
            )
        })
    }

    /// Serialize configuration to YAML string.
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::new(
                ErrorType::General,
                format!("Failed to serialize queue configuration to YAML: {}", e),
            )
        })
    }

    /// Serialize configuration to JSON string.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::new(
                ErrorType::General,
                format!("Failed to serialize queue configuration to JSON: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let config = QueueConfig::from_yaml("max_pending: 1\nmax_queued: 2\n").unwrap();
        assert_eq!(config.max_pending(), 1);
        assert_eq!(config.max_queued(), 2);
    }

    #[test]
    fn test_missing_limits_are_unbounded() {
        let config = QueueConfig::from_json("{}").unwrap();
        assert_eq!(config.max_pending(), usize::MAX);
        assert_eq!(config.max_queued(), usize::MAX);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = QueueConfig::from_yaml("max_pending: [").unwrap_err();
        assert_eq!(err.error_type, ErrorType::ParseError);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = QueueConfig::serial().with_max_queued(5);
        let back = QueueConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
