use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Message used when a failure carries no text of its own.
pub const UNSPECIFIED_ERROR: &str = "unspecified error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Reply produced by every operation: `{status: "ok", output?}` or `{status: "error", message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(output: Option<String>) -> Self {
        Self {
            status: Status::Ok,
            output,
            message: None,
        }
    }

    /// An error reply. The message is never empty.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNSPECIFIED_ERROR.to_string()
        } else {
            message
        };

        Self {
            status: Status::Error,
            output: None,
            message: Some(message),
        }
    }

    pub fn from_error(error: &WorkerError) -> Self {
        Self::error(error.to_string())
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_without_output_omits_fields() {
        let value = serde_json::to_value(ResponseEnvelope::ok(None)).unwrap();
        assert_eq!(value, json!({"status": "ok"}));
    }

    #[test]
    fn test_ok_with_output() {
        let envelope = ResponseEnvelope::ok(Some("<toto/>".to_string()));
        assert!(envelope.is_ok());
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"status": "ok", "output": "<toto/>"})
        );
    }

    #[test]
    fn test_error_message_never_empty() {
        let envelope = ResponseEnvelope::error("");
        assert!(!envelope.is_ok());
        assert_eq!(envelope.message.as_deref(), Some(UNSPECIFIED_ERROR));

        let envelope = ResponseEnvelope::error("  \n");
        assert_eq!(envelope.message.as_deref(), Some(UNSPECIFIED_ERROR));
    }

    #[test]
    fn test_from_worker_error() {
        let envelope = ResponseEnvelope::from_error(&WorkerError::Compile(
            "Failed to compile stylesheet".to_string(),
        ));
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"status": "error", "message": "Failed to compile stylesheet"})
        );
    }
}
