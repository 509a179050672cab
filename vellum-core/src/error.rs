use itertools::Itertools;

use std::fmt::Display;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum ErrorType {
    QueueLimitReached,
    TaskPanicked,
    TaskDropped,
    IndexOutOfRange,
    ActionNotFound,
    ActionNotExecutable,
    ParseError,
    SerializationError,
    NotSupported,
    ExecutionError,
    General,
    UnexpectedError,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub error_type: ErrorType,
    pub message: String,
}

impl Error {
    pub fn new(error_type: ErrorType, message: String) -> Self {
        Error {
            error_type,
            message,
        }
    }

    pub fn from_error<E: Display>(error_type: ErrorType, error: E) -> Self {
        Error {
            error_type,
            message: error.to_string(),
        }
    }

    pub fn from_result<T, E: Display>(error_type: ErrorType, result: Result<T, E>) -> Result<T, Self> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(Error::from_error(error_type, e)),
        }
    }

    /// Raised by [Queue::add](crate::queue::Queue::add) when the backlog of not-yet-started
    /// tasks is already at its ceiling. The rejected task is never invoked.
    pub fn queue_limit_reached(max_queued: usize) -> Self {
        Error {
            error_type: ErrorType::QueueLimitReached,
            message: format!("Queue limit reached ({} queued tasks)", max_queued),
        }
    }

    /// Returns true if the error was produced by a full queue backlog.
    pub fn is_queue_limit_reached(&self) -> bool {
        self.error_type == ErrorType::QueueLimitReached
    }

    pub fn task_panicked(message: &str) -> Self {
        Error {
            error_type: ErrorType::TaskPanicked,
            message: format!("Queued task panicked: {}", message),
        }
    }

    /// The task result channel was closed before a result was delivered.
    pub fn task_dropped() -> Self {
        Error {
            error_type: ErrorType::TaskDropped,
            message: "Queued task was dropped before producing a result".to_string(),
        }
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Error {
            error_type: ErrorType::IndexOutOfRange,
            message: format!("Index {} out of range for array of length {}", index, len),
        }
    }

    pub fn action_not_found(name: &str, available: &[String]) -> Self {
        Error {
            error_type: ErrorType::ActionNotFound,
            message: format!(
                "Action '{}' not found, available actions: {}",
                name,
                available.iter().map(|a| format!("'{}'", a)).join(", ")
            ),
        }
    }

    pub fn action_not_executable(name: &str) -> Self {
        Error {
            error_type: ErrorType::ActionNotExecutable,
            message: format!("Action '{}' can't be executed", name),
        }
    }

    pub fn parse_error(what: &str, err: impl Display) -> Self {
        Error {
            error_type: ErrorType::ParseError,
            message: format!("Failed to parse {}: {}", what, err),
        }
    }

    pub fn serialization_error(err: impl Display) -> Self {
        Error {
            error_type: ErrorType::SerializationError,
            message: format!("Serialization failed: {}", err),
        }
    }

    pub fn not_supported(message: String) -> Self {
        Error {
            error_type: ErrorType::NotSupported,
            message,
        }
    }

    pub fn execution_error(message: String) -> Self {
        Error {
            error_type: ErrorType::ExecutionError,
            message,
        }
    }

    pub fn general_error(message: String) -> Self {
        Error {
            error_type: ErrorType::General,
            message,
        }
    }

    pub fn unexpected_error(message: String) -> Self {
        Error {
            error_type: ErrorType::UnexpectedError,
            message,
        }
    }
}
