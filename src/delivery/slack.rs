//! Slack Web API client.
//!
//! Text goes through `chat.postMessage`. Images use the external upload
//! flow: `files.getUploadURLExternal`, a raw upload to the returned URL,
//! then `files.completeUploadExternal` to share it in the channel.

use super::Delivery;
use crate::error::ReportError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const IMAGE_FILENAME: &str = "usage_report.png";

/// Envelope shared by every Web API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
}

impl ApiResponse {
    fn check(self, method: &str) -> Result<Self, ReportError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ReportError::Delivery(format!(
                "{} failed: {}",
                method,
                self.error.as_deref().unwrap_or("unknown error")
            )))
        }
    }
}

/// Build the `chat.postMessage` payload: one mrkdwn section block.
fn message_payload(channel: &str, text: &str) -> Value {
    json!({
        "channel": channel,
        "text": text,
        "blocks": [
            {"type": "section", "text": {"type": "mrkdwn", "text": text}}
        ]
    })
}

/// Slack-backed [`Delivery`].
pub struct SlackDelivery {
    api_url: String,
    token: String,
    http_client: reqwest::Client,
}

impl SlackDelivery {
    pub fn new(api_url: String, token: String, timeout_seconds: u64) -> Result<Self, ReportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ReportError::Delivery(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            http_client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    async fn read_response(
        method: &str,
        response: reqwest::Response,
    ) -> Result<ApiResponse, ReportError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Delivery(format!(
                "Slack API error {} on {}: {}",
                status, method, body
            )));
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| ReportError::Delivery(format!("failed to parse {} response: {}", method, e)))?
            .check(method)
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<ApiResponse, ReportError> {
        let response = self
            .http_client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ReportError::Delivery(format!("failed to call {}: {}", method, e)))?;

        Self::read_response(method, response).await
    }
}

#[async_trait]
impl Delivery for SlackDelivery {
    async fn send_text(&self, channel: &str, markdown: &str) -> Result<(), ReportError> {
        debug!("Posting message to {}", channel);
        self.post_json("chat.postMessage", &message_payload(channel, markdown))
            .await?;
        Ok(())
    }

    async fn send_image(&self, channel: &str, image: &[u8], caption: &str) -> Result<(), ReportError> {
        let method = "files.getUploadURLExternal";
        let length = image.len().to_string();
        let response = self
            .http_client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .form(&[("filename", IMAGE_FILENAME), ("length", length.as_str())])
            .send()
            .await
            .map_err(|e| ReportError::Delivery(format!("failed to call {}: {}", method, e)))?;
        let ticket = Self::read_response(method, response).await?;

        let (upload_url, file_id) = match (ticket.upload_url, ticket.file_id) {
            (Some(url), Some(id)) => (url, id),
            _ => {
                return Err(ReportError::Delivery(format!(
                    "{} returned no upload URL",
                    method
                )))
            }
        };

        let upload = self
            .http_client
            .post(&upload_url)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| ReportError::Delivery(format!("image upload failed: {}", e)))?;
        if !upload.status().is_success() {
            return Err(ReportError::Delivery(format!(
                "image upload failed with status {}",
                upload.status()
            )));
        }

        let complete = json!({
            "files": [{"id": file_id, "title": caption}],
            "channel_id": channel,
            "initial_comment": caption,
        });
        self.post_json("files.completeUploadExternal", &complete)
            .await?;

        info!("Uploaded {} byte image to {}", image.len(), channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_payload() {
        let payload = message_payload("C123", "*hello*");
        assert_eq!(payload["channel"], "C123");
        assert_eq!(payload["blocks"][0]["type"], "section");
        assert_eq!(payload["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(payload["blocks"][0]["text"]["text"], "*hello*");
    }

    #[test]
    fn test_api_error_maps_to_delivery_error() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        let err = response.check("chat.postMessage").unwrap_err();
        assert!(matches!(err, ReportError::Delivery(msg) if msg.contains("channel_not_found")));
    }

    #[test]
    fn test_upload_ticket_parses() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"ok": true, "upload_url": "https://files.example/upload", "file_id": "F1"}"#,
        )
        .unwrap();
        let ticket = response.check("files.getUploadURLExternal").unwrap();
        assert_eq!(ticket.file_id.as_deref(), Some("F1"));
    }

    #[test]
    fn test_method_url_trims_slash() {
        let slack = SlackDelivery::new("https://slack.com/api/".into(), "t".into(), 5).unwrap();
        assert_eq!(slack.method_url("chat.postMessage"), "https://slack.com/api/chat.postMessage");
    }
}
