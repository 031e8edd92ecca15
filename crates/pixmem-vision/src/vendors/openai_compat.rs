use super::{analyze_prompt, expand_prompt, VisionVendor, EXPAND_TIMEOUT, PREDICT_TIMEOUT};
use crate::contract::VisionContract;
use async_trait::async_trait;
use pixmem_core::{PixmemError, PixmemResult};
use std::time::Duration;

const VISION_ID_HINTS: &[&str] = &["vision", "llava", "moondream", "clip", "minicpm"];

/// OpenAI-compatible backend: `/v1/models` for discovery,
/// `/v1/chat/completions` with a data-URI image part for inference.
/// Covers LM Studio, llama.cpp server, vLLM, and friends.
pub struct OpenAiCompatVendor {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiCompatVendor {
    /// Creates a vendor against the given base URL, with an optional
    /// bearer token.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    async fn chat(&self, body: serde_json::Value, timeout: Duration) -> PixmemResult<String> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let resp = self
            .authorize(self.http.post(&url))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PixmemError::Vision(format!(
                "chat completions returned {}",
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| PixmemError::Vision("no choices in completion response".into()))?;
        Ok(content.to_string())
    }
}

#[async_trait]
impl VisionVendor for OpenAiCompatVendor {
    async fn list_models(&self) -> PixmemResult<Vec<String>> {
        let url = format!("{}/v1/models", self.endpoint);
        let resp = self
            .authorize(self.http.get(&url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PixmemError::Vision(format!(
                "models endpoint returned {}",
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        let models = value["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["id"].as_str())
                    .filter(|id| {
                        let lowered = id.to_lowercase();
                        VISION_ID_HINTS.iter().any(|hint| lowered.contains(hint))
                    })
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn predict(
        &self,
        model: &str,
        image_b64: &str,
        context: Option<&str>,
    ) -> PixmemResult<VisionContract> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": analyze_prompt(context) },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{image_b64}") }
                    }
                ]
            }],
            "temperature": 0.0,
            "max_tokens": 512,
            "stream": false,
        });
        let completion = self.chat(body, PREDICT_TIMEOUT).await?;
        VisionContract::from_completion(&completion)
    }

    async fn expand_query(&self, model: &str, query: &str) -> PixmemResult<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": expand_prompt(query) }],
            "temperature": 0.3,
            "max_tokens": 128,
            "stream": false,
        });
        let completion = self.chat(body, EXPAND_TIMEOUT).await?;
        Ok(completion.trim().to_string())
    }
}
