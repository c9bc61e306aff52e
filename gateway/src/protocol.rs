//! Messages exchanged over the WebSocket.

use orchestrator::{NamespaceReport, TestRequest, TestResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One per accepted request: the namespace outcome plus the run result.
    TestResults {
        #[serde(rename = "namespaceStatus")]
        namespace_status: NamespaceReport,
        #[serde(flatten)]
        result: TestResult,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn test_results(namespace_status: NamespaceReport, result: TestResult) -> Self {
        ServerMessage::TestResults {
            namespace_status,
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

pub fn parse_request(text: &str) -> Result<TestRequest, String> {
    serde_json::from_str(text).map_err(|err| format!("Invalid message format: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::{NamespaceState, ProvisionOutcome, SandboxMode, TestStatus};

    #[test]
    fn test_results_are_flattened_next_to_namespace_status() {
        let mut result = TestResult::new("abc1234", "im-c-u", SandboxMode::Ephemeral);
        result.set_status(TestStatus::Failed);
        let report = NamespaceReport::from_outcome(&ProvisionOutcome {
            namespace: "im-c-u".to_string(),
            state: NamespaceState::Created,
        });

        let json = serde_json::to_value(ServerMessage::test_results(report, result)).unwrap();

        assert_eq!(json["type"], "test_results");
        assert_eq!(json["namespaceStatus"]["status"], "created");
        assert_eq!(json["commit"], "abc1234");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn error_message_shape() {
        let json = serde_json::to_value(ServerMessage::error("Invalid message format")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "Invalid message format"}));
    }

    #[test]
    fn rejects_requests_missing_fields() {
        let err = parse_request(r#"{"userId":"u","chatId":"c"}"#).unwrap_err();
        assert!(err.starts_with("Invalid message format"));
        assert!(parse_request("not json").is_err());
    }
}
