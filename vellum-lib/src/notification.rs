use serde_json::Value;

use vellum_core::error::Error;

/// Severity of a notification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Error,
    #[default]
    Notice,
    Ok,
    Warning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Error => "error",
            NotificationType::Notice => "notice",
            NotificationType::Ok => "ok",
            NotificationType::Warning => "warning",
        }
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.as_str().to_string())
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification state of a service object.
///
/// `message` is `None` when there is nothing to show. `duration_ms` is how long the notification
/// should be presented; `None` means until it is replaced or cleared.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    pub message: Option<String>,
    pub notification_type: NotificationType,
    pub duration_ms: Option<u64>,
}

impl Notification {
    pub fn new(message: &str, notification_type: NotificationType, duration_ms: Option<u64>) -> Self {
        Notification {
            message: Some(message.to_string()),
            notification_type,
            duration_ms,
        }
    }

    /// Notification reporting an error. It is shown until cleared.
    pub fn from_error(error: &Error) -> Self {
        Notification {
            message: Some(error.message.clone()),
            notification_type: NotificationType::Error,
            duration_ms: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    pub(crate) fn message_value(&self) -> Value {
        self.message.clone().map(Value::String).unwrap_or(Value::Null)
    }

    pub(crate) fn duration_value(&self) -> Value {
        self.duration_ms.map(Value::from).unwrap_or(Value::Null)
    }
}
