//! One-shot video frame description.
//!
//! Video frames do not join the live stream; each one goes through a
//! single-turn `generateContent` call and comes back as text. The trait
//! seam exists so the gateway can be tested without network access.

use async_trait::async_trait;
use base64::Engine;

/// Fixed prompt attached to every described frame.
const DESCRIBE_PROMPT: &str = "What do you see in this frame?";

/// Turns one JPEG frame into a short text description.
#[async_trait]
pub trait FrameDescriber: Send + Sync {
    async fn describe(&self, jpeg: &[u8]) -> anyhow::Result<String>;
}

/// [`FrameDescriber`] backed by the Gemini REST `generateContent` endpoint.
pub struct HttpDescriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl HttpDescriber {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl FrameDescriber for HttpDescriber {
    async fn describe(&self, jpeg: &[u8]) -> anyhow::Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": base64::engine::general_purpose::STANDARD.encode(jpeg),
                        }
                    },
                    { "text": DESCRIBE_PROMPT },
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: serde_json::Value = response.json().await?;

        payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("describe response carried no text candidate"))
    }
}
