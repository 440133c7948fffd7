// HTTP sync executor
// Ships operations to a remote sync endpoint as JSON and classifies
// transport failures for the retry policy.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use opsync_core::domain::operation::{ErrorClass, Operation};
use opsync_core::port::sync_executor::{SyncError, SyncExecutor};

/// POSTs each operation to a configured endpoint.
///
/// The remote target must tolerate duplicate delivery: retries re-send
/// the same operation id.
pub struct HttpSyncExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSyncExecutor {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn classify_status(status: reqwest::StatusCode) -> ErrorClass {
        match status.as_u16() {
            408 => ErrorClass::Timeout,
            409 => ErrorClass::Conflict,
            429 => ErrorClass::RateLimit,
            500..=599 => ErrorClass::ServerError,
            _ => ErrorClass::Unclassified,
        }
    }
}

#[async_trait]
impl SyncExecutor for HttpSyncExecutor {
    async fn execute(&self, operation: &Operation) -> Result<(), SyncError> {
        debug!(kind = %operation.kind, endpoint = %self.endpoint, "Shipping operation");

        let response = self
            .client
            .post(&self.endpoint)
            .json(operation)
            .send()
            .await
            .map_err(|e| {
                let class = if e.is_timeout() {
                    ErrorClass::Timeout
                } else if e.is_connect() {
                    ErrorClass::NetworkError
                } else {
                    ErrorClass::Unclassified
                };
                SyncError::new(class, e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(SyncError::new(
            Self::classify_status(status),
            format!("sync endpoint returned {}", status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            HttpSyncExecutor::classify_status(reqwest::StatusCode::REQUEST_TIMEOUT),
            ErrorClass::Timeout
        );
        assert_eq!(
            HttpSyncExecutor::classify_status(reqwest::StatusCode::CONFLICT),
            ErrorClass::Conflict
        );
        assert_eq!(
            HttpSyncExecutor::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ErrorClass::RateLimit
        );
        assert_eq!(
            HttpSyncExecutor::classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ErrorClass::ServerError
        );
        assert_eq!(
            HttpSyncExecutor::classify_status(reqwest::StatusCode::BAD_REQUEST),
            ErrorClass::Unclassified
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let executor = HttpSyncExecutor::new(
            "http://127.0.0.1:1/sync",
            Duration::from_millis(500),
        );
        let operation = Operation::new(
            opsync_core::domain::OperationKind::new("upload"),
            opsync_core::domain::OperationPayload::new(serde_json::json!({})),
        );

        let err = executor.execute(&operation).await.unwrap_err();
        assert!(matches!(
            err.class,
            ErrorClass::NetworkError | ErrorClass::Timeout
        ));
    }
}
