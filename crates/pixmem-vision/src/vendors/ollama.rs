use super::{analyze_prompt, expand_prompt, VisionVendor, EXPAND_TIMEOUT, PREDICT_TIMEOUT};
use crate::contract::VisionContract;
use async_trait::async_trait;
use pixmem_core::{PixmemError, PixmemResult};
use std::time::Duration;

/// Model name fragments that mark an Ollama model as vision-capable.
const VISION_NAME_HINTS: &[&str] = &["llava", "vision", "moondream", "minicpm", "bakllava"];

/// Ollama backend: `/api/tags` for discovery, `/api/generate` for
/// inference with `format: "json"` forced.
pub struct OllamaVendor {
    endpoint: String,
    http: reqwest::Client,
}

impl OllamaVendor {
    /// Creates a vendor against the given base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn generate(&self, body: serde_json::Value, timeout: Duration) -> PixmemResult<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PixmemError::Vision(format!(
                "ollama generate returned {}",
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;
        Ok(value["response"].as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl VisionVendor for OllamaVendor {
    async fn list_models(&self) -> PixmemResult<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PixmemError::Vision(format!(
                "ollama tags returned {}",
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        let mut models = Vec::new();
        for m in value["models"].as_array().unwrap_or(&Vec::new()) {
            let name = m["name"].as_str().unwrap_or_default();
            let families = m["details"]["families"]
                .as_array()
                .map(|fs| fs.iter().filter_map(|f| f.as_str()).collect::<Vec<_>>())
                .unwrap_or_default();

            let lowered = name.to_lowercase();
            let is_vision = families.contains(&"clip")
                || VISION_NAME_HINTS.iter().any(|hint| lowered.contains(hint));
            if is_vision && !name.is_empty() {
                models.push(name.to_string());
            }
        }
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
            "prompt": analyze_prompt(context),
            "images": [image_b64],
            "stream": false,
            "format": "json",
        });
        let completion = self.generate(body, PREDICT_TIMEOUT).await?;
        VisionContract::from_completion(&completion)
    }

    async fn expand_query(&self, model: &str, query: &str) -> PixmemResult<String> {
        let body = serde_json::json!({
            "model": model,
            "prompt": expand_prompt(query),
            "stream": false,
        });
        let completion = self.generate(body, EXPAND_TIMEOUT).await?;
        Ok(completion.trim().to_string())
    }
}
