use crate::contract::VisionContract;
use async_trait::async_trait;
use pixmem_core::PixmemResult;
use std::time::Duration;

/// Concrete Ollama backend.
pub mod ollama;
/// OpenAI-compatible chat-completions backend (LM Studio, llama.cpp, ...).
pub mod openai_compat;

pub use ollama::OllamaVendor;
pub use openai_compat::OpenAiCompatVendor;

/// Timeout for discovery-endpoint probes.
pub(crate) const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for a single inference call.
pub(crate) const PREDICT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for a query-expansion call.
pub(crate) const EXPAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Instruction sent with every image analysis request. Demands one bare
/// JSON object matching [`VisionContract`]; parsing still tolerates models
/// that fence or pad it anyway.
pub(crate) const ANALYZE_PROMPT: &str = "Analyze the image and return ONLY valid JSON.\n\
Do not explain anything.\n\
Required fields:\n\
summary, activity, setting, social_context, objects, people_count\n\n\
No markdown. No commentary. JSON only.";

/// Builds the analysis prompt, appending whatever auxiliary context the
/// pipeline already knows (capture date, resolved location).
pub(crate) fn analyze_prompt(context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{ANALYZE_PROMPT}\n\nKnown about this photo: {context}"),
        None => ANALYZE_PROMPT.to_string(),
    }
}

pub(crate) fn expand_prompt(query: &str) -> String {
    format!(
        "Rewrite this short photo search query as one fuller descriptive \
         sentence of the scene being looked for. Reply with the sentence \
         only.\n\nQuery: {query}"
    )
}

/// One concrete kind of vision-inference backend.
///
/// Each vendor owns its wire format; all of them funnel completions
/// through [`VisionContract::from_completion`] so the output contract is
/// enforced uniformly.
#[async_trait]
pub trait VisionVendor: Send + Sync {
    /// Lists vision-capable model identifiers available at the endpoint.
    async fn list_models(&self) -> PixmemResult<Vec<String>>;

    /// Analyzes one image (base64-encoded) into a validated contract.
    /// `context` carries auxiliary facts already known about the photo.
    async fn predict(
        &self,
        model: &str,
        image_b64: &str,
        context: Option<&str>,
    ) -> PixmemResult<VisionContract>;

    /// Rewrites a short search query into a fuller descriptive sentence.
    async fn expand_query(&self, model: &str, query: &str) -> PixmemResult<String>;
}
