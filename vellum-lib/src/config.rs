//! Service object configuration.

use vellum_core::error::{Error, ErrorType};

/// Configuration of a [ServiceObjectWithActions](crate::service_object::ServiceObjectWithActions).
///
/// # Example (YAML)
/// ```yaml
/// max_queued_work: 16
/// notification_duration_ms: 3000
/// action_names:
///   - save
///   - reload
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceObjectConfig {
    /// Maximal number of work items waiting behind the running one, unbounded if missing.
    #[serde(default)]
    pub max_queued_work: Option<usize>,

    /// Display duration of notifications set without an explicit duration.
    #[serde(default)]
    pub notification_duration_ms: Option<u64>,

    /// Actions created with the service object, in this order.
    #[serde(default)]
    pub action_names: Vec<String>,
}

impl ServiceObjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_queued_work(mut self, max_queued_work: usize) -> Self {
        self.max_queued_work = Some(max_queued_work);
        self
    }

    pub fn with_notification_duration_ms(mut self, duration_ms: u64) -> Self {
        self.notification_duration_ms = Some(duration_ms);
        self
    }

    pub fn with_action(mut self, name: &str) -> Self {
        self.action_names.push(name.to_string());
        self
    }

    pub fn max_queued_work(&self) -> usize {
        self.max_queued_work.unwrap_or(usize::MAX)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::new(
                ErrorType::ParseError,
                format!("Failed to parse YAML service object configuration: {}", e),
            )
        })
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            Error::new(
                ErrorType::ParseError,
                format!("Failed to parse JSON service object configuration: {}", e),
            )
        })
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::new(
                ErrorType::General,
                format!("Failed to serialize service object configuration to YAML: {}", e),
            )
        })
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::new(
                ErrorType::General,
                format!("Failed to serialize service object configuration to JSON: {}", e),
            )
        })
    }
}
