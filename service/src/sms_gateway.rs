//! HTTP SMS provider client.
//!
//! Posts a JSON message to the provider endpoint with a bearer key. The
//! provider answers with `{ "success": bool, "message_id": "...", "error": "..." }`.

use crate::config::SmsConfig;
use receipt_desk_core::notification::{
    GatewayError, GatewayFuture, GatewayReceipt, NotificationGateway,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    from: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    success: Option<bool>,
    message_id: Option<String>,
    error: Option<String>,
}

/// [`NotificationGateway`] backed by an HTTP SMS provider.
#[derive(Clone, Debug)]
pub struct HttpSmsGateway {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
    sender_id: String,
}

impl HttpSmsGateway {
    /// Create a gateway from configuration.
    ///
    /// Missing URL or key leaves the gateway unconfigured rather than failing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &SmsConfig) -> Result<Self, GatewayError> {
        // Upper bound for detached sends; the dispatcher applies the real budget
        let client = Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs.saturating_mul(2).max(1)))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender_id: config.sender_id.clone(),
        })
    }

    fn credentials(&self) -> Option<(String, String)> {
        match (&self.api_url, &self.api_key) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Some((url.clone(), key.clone()))
            }
            _ => None,
        }
    }
}

impl NotificationGateway for HttpSmsGateway {
    fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    fn send(&self, phone_number: String, body: String) -> GatewayFuture {
        let client = self.client.clone();
        let sender_id = self.sender_id.clone();
        let credentials = self.credentials();

        Box::pin(async move {
            let (url, key) = credentials.ok_or(GatewayError::NotConfigured)?;

            let response = client
                .post(&url)
                .bearer_auth(&key)
                .json(&SendRequest {
                    to: &phone_number,
                    from: &sender_id,
                    text: &body,
                })
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            receipt_from_response(status, &text)
        })
    }
}

/// Interpret a provider answer.
fn receipt_from_response(status: StatusCode, body: &str) -> Result<GatewayReceipt, GatewayError> {
    if status.is_success() {
        let parsed: SendResponse = if body.trim().is_empty() {
            SendResponse::default()
        } else {
            serde_json::from_str(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?
        };
        return Ok(GatewayReceipt {
            delivered: parsed.success.unwrap_or(parsed.error.is_none()),
            provider_id: parsed.message_id,
            error: parsed.error,
        });
    }

    match status {
        status if status.is_server_error() => Err(GatewayError::Transport(format!(
            "provider returned {}: {body}",
            status.as_u16()
        ))),
        status => Ok(GatewayReceipt::refused(format!(
            "provider returned {}: {body}",
            status.as_u16()
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn config(url: Option<&str>, key: Option<&str>) -> SmsConfig {
        SmsConfig {
            api_url: url.map(str::to_string),
            api_key: key.map(str::to_string),
            sender_id: "RECEIPTS".to_string(),
            send_timeout_secs: 30,
        }
    }

    #[test]
    fn test_needs_url_and_key() {
        let full = HttpSmsGateway::from_config(&config(Some("https://sms.test/send"), Some("k")));
        assert!(full.unwrap().is_configured());

        let no_key = HttpSmsGateway::from_config(&config(Some("https://sms.test/send"), None));
        assert!(!no_key.unwrap().is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_send_fails_without_network() {
        let gateway = HttpSmsGateway::from_config(&config(None, None)).unwrap();
        let err = gateway.send("+255700000001".into(), "hi".into()).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured);
    }

    #[test]
    fn test_success_body_is_parsed() {
        let receipt =
            receipt_from_response(StatusCode::OK, r#"{"success":true,"message_id":"m-1"}"#)
                .unwrap();
        assert_eq!(receipt, GatewayReceipt::accepted("m-1"));
    }

    #[test]
    fn test_reported_failure_keeps_provider_id() {
        let receipt = receipt_from_response(
            StatusCode::OK,
            r#"{"success":false,"message_id":"m-2","error":"queued"}"#,
        )
        .unwrap();
        assert!(!receipt.delivered);
        assert_eq!(receipt.provider_id.as_deref(), Some("m-2"));
    }

    #[test]
    fn test_error_statuses() {
        assert!(matches!(
            receipt_from_response(StatusCode::BAD_GATEWAY, "down"),
            Err(GatewayError::Transport(_))
        ));
        let refused = receipt_from_response(StatusCode::BAD_REQUEST, "bad number").unwrap();
        assert!(!refused.delivered);
        assert!(receipt_from_response(StatusCode::OK, "not json").is_err());
    }
}
