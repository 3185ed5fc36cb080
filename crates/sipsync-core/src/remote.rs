//! Remote authoritative store client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::models::{LogKind, LogPayload, QueuedLogRecord};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::Error;

/// Why a submission did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SubmitError {
    /// Network trouble, timeouts, 5xx; try again next cycle
    #[error("{0}")]
    Retryable(String),
    /// Rejected for good (validation, missing event/drink); needs user action
    #[error("{0}")]
    Permanent(String),
}

impl SubmitError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(message) | Self::Permanent(message) => message,
        }
    }
}

/// Remote store the engine reconciles against.
///
/// Implementations must upsert by `record.id` so a resubmission after a lost
/// acknowledgement never creates a second row.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn submit(&self, kind: LogKind, record: &QueuedLogRecord) -> Result<(), SubmitError>;
}

/// Body sent for each submission.
#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    id: &'a str,
    created_at: i64,
    #[serde(flatten)]
    payload: &'a LogPayload,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// HTTP implementation talking to the sipsync API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                Error::InvalidInput("remote base URL must include http:// or https://".into())
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(auth_token),
            client,
        })
    }

    fn endpoint(&self, kind: LogKind, record: &QueuedLogRecord) -> String {
        let collection = match kind {
            LogKind::Personal => "personal-logs",
            LogKind::Event => "event-logs",
        };
        format!("{}/v1/{collection}/{}", self.base_url, record.id)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn submit(&self, kind: LogKind, record: &QueuedLogRecord) -> Result<(), SubmitError> {
        let body = SubmitBody {
            id: record.id.as_str(),
            created_at: record.created_at,
            payload: &record.payload,
        };

        let mut request = self
            .client
            .put(self.endpoint(kind, record))
            .header("Idempotency-Key", record.id.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);
        if let Some(token) = self.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

fn classify_transport_error(error: reqwest::Error) -> SubmitError {
    if error.is_timeout() {
        SubmitError::retryable("timeout")
    } else if error.is_connect() {
        SubmitError::retryable(format!("connection failed: {error}"))
    } else if error.is_builder() {
        SubmitError::permanent(format!("invalid request: {error}"))
    } else {
        SubmitError::retryable(format!("request failed: {error}"))
    }
}

/// Map a non-success HTTP status onto the retry taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> SubmitError {
    let message = parse_error_message(status, body);
    // 408 request timeout, 425 too early, 429 too many requests
    let retryable = status.is_server_error() || matches!(status.as_u16(), 408 | 425 | 429);

    if retryable {
        SubmitError::Retryable(message)
    } else {
        SubmitError::Permanent(message)
    }
}

fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RemoteErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrinkLog, DrinkRef};

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(!classify_status(status, "").is_permanent(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::CONFLICT,
            StatusCode::GONE,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(classify_status(status, "").is_permanent(), "{status}");
        }
    }

    #[test]
    fn error_message_prefers_json_body() {
        let error = classify_status(
            StatusCode::NOT_FOUND,
            r#"{"message":"event evt-1 no longer exists"}"#,
        );
        assert_eq!(error.message(), "event evt-1 no longer exists (404)");

        let error = classify_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(error.message(), "HTTP 502");

        let error = classify_status(StatusCode::BAD_REQUEST, "  bad quantity ");
        assert_eq!(error.message(), "bad quantity (400)");
    }

    #[test]
    fn new_rejects_non_http_base_url() {
        assert!(HttpRemoteStore::new("api.example.com", None, Duration::from_secs(5)).is_err());
        assert!(HttpRemoteStore::new("  ", None, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn endpoint_uses_record_id_per_kind() {
        let store = HttpRemoteStore::new(
            "https://api.example.com/",
            Some("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let drink = DrinkRef::new("lager-330", 330, 5.0);
        let record = QueuedLogRecord::with_id(
            "p1".parse().unwrap(),
            LogPayload::Personal(DrinkLog::new("u1", &drink, 1, 0, None).unwrap()),
        );

        assert_eq!(
            store.endpoint(LogKind::Personal, &record),
            "https://api.example.com/v1/personal-logs/p1"
        );
        assert_eq!(
            store.endpoint(LogKind::Event, &record),
            "https://api.example.com/v1/event-logs/p1"
        );
    }

    #[test]
    fn submit_body_flattens_payload() {
        let drink = DrinkRef::new("lager-330", 330, 5.0);
        let record = QueuedLogRecord::with_id(
            "p1".parse().unwrap(),
            LogPayload::Personal(DrinkLog::new("u1", &drink, 2, 5, None).unwrap()),
        );
        let body = SubmitBody {
            id: record.id.as_str(),
            created_at: record.created_at,
            payload: &record.payload,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["kind"], "personal");
        assert_eq!(json["quantity"], 2);
    }
}
