//! HTTP processor that hands each task to a configured endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::processor::{ProcessorError, ProcessorRegistry, TaskProcessor};
use super::types::TaskUnit;
use crate::config::WebhookConfig;

/// Request body POSTed for every attempt.
#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    task_id: &'a str,
    payload: &'a serde_json::Value,
    retry_count: u32,
}

/// POSTs tasks to a webhook. Non-2xx responses and transport errors are task
/// errors, so the retry executor retries them.
pub struct WebhookProcessor {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl WebhookProcessor {
    pub fn new(config: &WebhookConfig) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ProcessorError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskProcessor for WebhookProcessor {
    async fn process(&self, task: &TaskUnit) -> Result<serde_json::Value, ProcessorError> {
        let body = WebhookRequest {
            task_id: &task.id,
            payload: &task.payload,
            retry_count: task.retry_count,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(task_id = %task.id, url = %self.url, "Calling webhook");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProcessorError::Request(format!("webhook timed out: {}", e))
            } else {
                ProcessorError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProcessorError::Request(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProcessorError::Request(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }
}

/// One [`WebhookProcessor`] per configured job type.
pub fn webhook_registry(webhooks: &[WebhookConfig]) -> Result<ProcessorRegistry, ProcessorError> {
    let mut registry = ProcessorRegistry::new();
    for webhook in webhooks {
        registry.register(
            webhook.job_type.clone(),
            Arc::new(WebhookProcessor::new(webhook)?),
        );
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::types::TaskSpec;
    use axum::{
        extract::State,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// What the fake webhook saw for one request.
    #[derive(Debug)]
    struct Received {
        authorization: Option<String>,
        body: serde_json::Value,
    }

    #[derive(Clone)]
    struct Hook {
        status: StatusCode,
        body: &'static str,
        received: mpsc::UnboundedSender<Received>,
    }

    async fn hook(
        State(hook): State<Hook>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, &'static str) {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = hook.received.send(Received {
            authorization,
            body,
        });
        (hook.status, hook.body)
    }

    /// Serves `/hook` answering every request with `status` and `body`.
    async fn serve(
        status: StatusCode,
        body: &'static str,
    ) -> (String, mpsc::UnboundedReceiver<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let app = Router::new().route("/hook", post(hook)).with_state(Hook {
            status,
            body,
            received: tx,
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/hook", addr), rx)
    }

    fn webhook(url: &str, token: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            job_type: "archive".to_string(),
            url: url.to_string(),
            timeout_secs: 5,
            auth_token: token.map(str::to_string),
        }
    }

    fn task() -> TaskUnit {
        TaskUnit::from(TaskSpec::new("slide-1", json!({ "deck": 7 })))
    }

    #[tokio::test]
    async fn test_posts_task_and_returns_json() {
        let (url, mut received) = serve(StatusCode::OK, r#"{"archived":true}"#).await;
        let processor = WebhookProcessor::new(&webhook(&url, Some("secret"))).unwrap();

        let result = processor.process(&task()).await.unwrap();
        assert_eq!(result, json!({ "archived": true }));

        let request = received.recv().await.unwrap();
        assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(
            request.body,
            json!({ "task_id": "slide-1", "payload": { "deck": 7 }, "retry_count": 0 })
        );
    }

    #[tokio::test]
    async fn test_missing_token_sends_no_authorization() {
        let (url, mut received) = serve(StatusCode::OK, "").await;
        let processor = WebhookProcessor::new(&webhook(&url, None)).unwrap();

        let result = processor.process(&task()).await.unwrap();
        assert_eq!(result, serde_json::Value::Null);
        assert!(received.recv().await.unwrap().authorization.is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_is_task_error() {
        let (url, _received) = serve(StatusCode::SERVICE_UNAVAILABLE, "busy").await;
        let processor = WebhookProcessor::new(&webhook(&url, None)).unwrap();

        let err = processor.process(&task()).await.unwrap_err();
        match err {
            ProcessorError::Request(message) => {
                assert!(message.contains("503"));
                assert!(message.contains("busy"));
            }
            other => panic!("expected request error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_task_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let processor =
            WebhookProcessor::new(&webhook(&format!("http://{}/hook", addr), None)).unwrap();
        let err = processor.process(&task()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Request(_)));
    }

    #[test]
    fn test_registry_from_config() {
        let registry = webhook_registry(&[
            webhook("http://localhost:1/a", None),
            WebhookConfig {
                job_type: "thumbnail".to_string(),
                ..webhook("http://localhost:1/b", None)
            },
        ])
        .unwrap();

        assert_eq!(registry.job_types(), vec!["archive", "thumbnail"]);
    }
}
