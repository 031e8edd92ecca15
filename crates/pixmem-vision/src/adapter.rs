use crate::contract::VisionContract;
use crate::vendors::{OllamaVendor, OpenAiCompatVendor, VisionVendor, DISCOVERY_TIMEOUT};
use base64::Engine as _;
use pixmem_core::{PixmemError, PixmemResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Known-good 1x1 PNG used by the configuration validation gate. Tiny but
/// decodable by every backend, so a gate failure points at the endpoint or
/// model, not at the probe image.
const VALIDATION_IMAGE: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// The supported vision backend kinds, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorKind {
    /// Native Ollama API (`/api/tags`, `/api/generate`).
    Ollama,
    /// Any server speaking the OpenAI chat-completions API.
    OpenAiCompat,
}

impl VendorKind {
    /// Stable string form, as persisted in the vision configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            VendorKind::Ollama => "ollama",
            VendorKind::OpenAiCompat => "openai",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ollama" => Some(VendorKind::Ollama),
            "openai" => Some(VendorKind::OpenAiCompat),
            _ => None,
        }
    }
}

/// Detects and talks to one of the interchangeable vision backends.
///
/// Detection happens exactly once, at construction: candidate kinds are
/// probed in priority order against their discovery endpoints with a short
/// timeout, and the first responder is bound. An adapter that bound no
/// vendor fails every `predict` fast with a "no compatible backend" error;
/// it is never silently degraded.
pub struct VisionAdapter {
    endpoint: String,
    kind: Option<VendorKind>,
    vendor: Option<Box<dyn VisionVendor>>,
}

impl VisionAdapter {
    /// Probes the endpoint and binds the first backend kind that answers.
    pub async fn detect(endpoint: &str, api_key: Option<String>) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let http = reqwest::Client::new();

        if probe(&http, &format!("{endpoint}/api/tags"), None).await {
            info!(%endpoint, "detected ollama vision backend");
            return Self::bind(endpoint, api_key, VendorKind::Ollama);
        }

        if probe(&http, &format!("{endpoint}/v1/models"), api_key.as_deref()).await {
            info!(%endpoint, "detected openai-compatible vision backend");
            return Self::bind(endpoint, api_key, VendorKind::OpenAiCompat);
        }

        warn!(%endpoint, "no compatible vision backend detected");
        Self {
            endpoint,
            kind: None,
            vendor: None,
        }
    }

    /// Binds a known vendor kind without probing. Used when a previously
    /// validated configuration already names the kind.
    pub fn bind(endpoint: impl Into<String>, api_key: Option<String>, kind: VendorKind) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let vendor: Box<dyn VisionVendor> = match kind {
            VendorKind::Ollama => Box::new(OllamaVendor::new(&endpoint)),
            VendorKind::OpenAiCompat => Box::new(OpenAiCompatVendor::new(&endpoint, api_key)),
        };
        Self {
            endpoint,
            kind: Some(kind),
            vendor: Some(vendor),
        }
    }

    /// The bound backend kind, if detection succeeded.
    pub fn kind(&self) -> Option<VendorKind> {
        self.kind
    }

    /// The endpoint this adapter was constructed for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Lists vision-capable models at the endpoint. No vendor bound means
    /// an empty list.
    pub async fn list_models(&self) -> PixmemResult<Vec<String>> {
        match &self.vendor {
            Some(vendor) => vendor.list_models().await,
            None => Ok(Vec::new()),
        }
    }

    /// Analyzes one image into a validated [`VisionContract`].
    ///
    /// Fails fast when no vendor was detected; contract violations come
    /// back as [`PixmemError::Vision`] and are the caller's to downgrade
    /// (the ingestion pipeline records them as `vision_status = failed`).
    /// `context` carries auxiliary facts about the photo (capture date,
    /// location) that the model should fold into its analysis.
    pub async fn predict(
        &self,
        model: &str,
        image: &[u8],
        context: Option<&str>,
    ) -> PixmemResult<VisionContract> {
        let vendor = self.vendor.as_ref().ok_or_else(|| {
            PixmemError::Vision(format!(
                "no compatible vision backend detected at {}",
                self.endpoint
            ))
        })?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);
        vendor.predict(model, &image_b64, context).await
    }

    /// Best-effort rewrite of a short search query into a fuller
    /// descriptive sentence. Any failure returns the original query
    /// unmodified; expansion is an optimization, never a requirement.
    pub async fn expand_query(&self, model: &str, query: &str) -> String {
        let Some(vendor) = &self.vendor else {
            return query.to_string();
        };
        match vendor.expand_query(model, query).await {
            Ok(expanded) => expanded,
            Err(e) => {
                debug!(error = %e, "query expansion failed, using original query");
                query.to_string()
            }
        }
    }

    /// Configuration validation gate: one real inference call against the
    /// embedded known-good test image. Only a contract-valid response
    /// allows the caller to persist the configuration.
    pub async fn validate_model(&self, model: &str) -> PixmemResult<VisionContract> {
        self.predict(model, VALIDATION_IMAGE, None).await
    }
}

async fn probe(http: &reqwest::Client, url: &str, api_key: Option<&str>) -> bool {
    let mut request = http.get(url).timeout(DISCOVERY_TIMEOUT);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
