//! Push-notification provider client.
//!
//! The dispatcher only needs two things from a provider: authorize once per
//! run, then push a plain-text message to a recipient. [`PushClient`] is that
//! seam; [`MessagingApiClient`] implements it over HTTP.
//!
//! # Protocol
//!
//! - `POST {base}/oauth2/v3/token` with a client-credentials form issues a
//!   short-lived bearer token.
//! - `POST {base}/v2/bot/message/push` with
//!   `{"to": ..., "messages": [{"type": "text", "text": ...}]}` sends a message.
//!
//! No call is retried. A failed send is reported to the caller and dropped.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Default base URL for the messaging API.
pub const DEFAULT_PUSH_API_BASE: &str = "https://api.line.me";

#[derive(Debug, Error)]
pub enum PushError {
    /// The recipient has blocked or never accepted messages from us.
    #[error("recipient {0} has not accepted messages")]
    NotAccepting(String),

    #[error("push provider authorization failed: {0}")]
    Unauthorized(String),

    #[error("push provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A provider that can deliver plain-text pushes.
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Called once before a dispatch run. A failure here aborts the run.
    async fn prepare(&self) -> Result<(), PushError> {
        Ok(())
    }

    /// Deliver `text` to a single recipient.
    async fn push_text(&self, recipient: &str, text: &str) -> Result<(), PushError>;
}

/// HTTP client for the messaging API.
pub struct MessagingApiClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    access_token: RwLock<Option<SecretString>>,
}

impl MessagingApiClient {
    /// Create a client against the default API base.
    pub fn new(client_id: &str, client_secret: SecretString) -> Self {
        Self::with_base_url(DEFAULT_PUSH_API_BASE, client_id, client_secret)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, client_id: &str, client_secret: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret,
            access_token: RwLock::new(None),
        }
    }

    async fn issue_token(&self) -> Result<SecretString, PushError> {
        let url = format!("{}/oauth2/v3/token", self.base_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Unauthorized(format!(
                "{}: {}",
                status.as_u16(),
                provider_message(&body)
            )));
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(SecretString::from(token.access_token))
    }

    async fn current_token(&self) -> Result<SecretString, PushError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let token = self.issue_token().await?;
        *self.access_token.write().await = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl PushClient for MessagingApiClient {
    async fn prepare(&self) -> Result<(), PushError> {
        let token = self.issue_token().await?;
        *self.access_token.write().await = Some(token);
        Ok(())
    }

    async fn push_text(&self, recipient: &str, text: &str) -> Result<(), PushError> {
        let token = self.current_token().await?;
        let url = format!("{}/v2/bot/message/push", self.base_url);
        let body = PushRequest {
            to: recipient,
            messages: vec![TextMessage {
                kind: "text",
                text,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(recipient, status, &body))
    }
}

/// Map a failed push response to a [`PushError`].
///
/// A 403, or any error body saying the recipient has not accepted messages, is
/// reported as [`PushError::NotAccepting`].
pub fn classify_failure(recipient: &str, status: StatusCode, body: &str) -> PushError {
    let message = provider_message(body);
    let lowered = message.to_lowercase();

    if status == StatusCode::FORBIDDEN
        || lowered.contains("not accepted")
        || lowered.contains("hasn't added")
    {
        return PushError::NotAccepting(recipient.to_string());
    }
    if status == StatusCode::UNAUTHORIZED {
        return PushError::Unauthorized(message);
    }

    PushError::Rejected {
        status: status.as_u16(),
        message,
    }
}

/// Pull the human-readable message out of a provider error body.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{Form, Json, Router, http::HeaderMap, routing::post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct FakeProvider {
        pushes: Arc<Mutex<Vec<(String, Value)>>>,
    }

    async fn token(Form(form): Form<Vec<(String, String)>>) -> (StatusCode, Json<Value>) {
        let secret_ok = form
            .iter()
            .any(|(k, v)| k == "client_secret" && v == "top-secret");
        if secret_ok {
            (StatusCode::OK, Json(json!({"access_token": "tok-1", "expires_in": 900})))
        } else {
            (StatusCode::BAD_REQUEST, Json(json!({"message": "invalid client"})))
        }
    }

    async fn spawn_provider(provider: FakeProvider) -> String {
        let pushes = provider.pushes.clone();
        let app = Router::new().route("/oauth2/v3/token", post(token)).route(
            "/v2/bot/message/push",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let pushes = pushes.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if body["to"] == "U-blocked" {
                        return (
                            StatusCode::FORBIDDEN,
                            Json(json!({"message": "The user has not accepted messages"})),
                        );
                    }
                    pushes.lock().unwrap().push((auth, body));
                    (StatusCode::OK, Json(json!({})))
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_prepare_and_push() {
        let provider = FakeProvider::default();
        let base = spawn_provider(provider.clone()).await;
        let client =
            MessagingApiClient::with_base_url(&base, "client-1", SecretString::from("top-secret".to_string()));

        client.prepare().await.unwrap();
        client.push_text("U-1", "こんにちは").await.unwrap();

        let pushes = provider.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "Bearer tok-1");
        assert_eq!(pushes[0].1["to"], "U-1");
        assert_eq!(pushes[0].1["messages"][0]["type"], "text");
        assert_eq!(pushes[0].1["messages"][0]["text"], "こんにちは");
    }

    #[tokio::test]
    async fn test_prepare_fails_with_bad_credentials() {
        let base = spawn_provider(FakeProvider::default()).await;
        let client =
            MessagingApiClient::with_base_url(&base, "client-1", SecretString::from("wrong".to_string()));

        let err = client.prepare().await.unwrap_err();
        assert!(matches!(err, PushError::Unauthorized(ref m) if m.contains("invalid client")));
    }

    #[tokio::test]
    async fn test_blocked_recipient_is_not_accepting() {
        let base = spawn_provider(FakeProvider::default()).await;
        let client =
            MessagingApiClient::with_base_url(&base, "client-1", SecretString::from("top-secret".to_string()));

        // no explicit prepare: the token is fetched lazily
        let err = client.push_text("U-blocked", "hi").await.unwrap_err();
        assert!(matches!(err, PushError::NotAccepting(ref r) if r == "U-blocked"));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("U", StatusCode::BAD_REQUEST, r#"{"message":"recipient has not accepted messages"}"#),
            PushError::NotAccepting(_)
        ));
        assert!(matches!(
            classify_failure("U", StatusCode::UNAUTHORIZED, r#"{"message":"expired token"}"#),
            PushError::Unauthorized(ref m) if m == "expired token"
        ));
        assert!(matches!(
            classify_failure("U", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            PushError::Rejected { status: 429, ref message } if message == "slow down"
        ));
    }
}
