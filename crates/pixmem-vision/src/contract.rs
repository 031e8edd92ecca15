use pixmem_core::{PixmemError, PixmemResult};
use serde::{Deserialize, Serialize};

/// The structured output every vision vendor must return.
///
/// `summary`, `activity`, `setting`, `social_context`, `objects`, and
/// `people_count` are required; a response missing any of them (or with an
/// empty `summary`) is rejected outright. The remaining fields are
/// optional extensions some models volunteer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionContract {
    /// One-sentence description of the image. Must be non-empty.
    pub summary: String,
    /// What is happening in the image.
    pub activity: String,
    /// Where the image takes place (indoor, beach, office...).
    pub setting: String,
    /// Social framing (alone, friends, family, crowd...).
    pub social_context: String,
    /// Salient objects, most prominent first.
    pub objects: Vec<String>,
    /// Number of people visible.
    pub people_count: u32,
    /// Longer free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Text visible in the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Dominant colors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_colors: Option<Vec<String>>,
    /// Weather, when discernible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    /// Time of day, when discernible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
}

impl VisionContract {
    /// Parses a raw model completion into a validated contract.
    ///
    /// Models wrap their JSON in markdown fences and prose more often than
    /// not, so this strips fences, locates the outermost `{...}` span, and
    /// parses that. Any parse failure, missing required field, or empty
    /// `summary` is a hard rejection of the response.
    pub fn from_completion(text: &str) -> PixmemResult<Self> {
        let mut cleaned = text.trim();
        if let Some(rest) = cleaned.strip_prefix("```json") {
            cleaned = rest;
        } else if let Some(rest) = cleaned.strip_prefix("```") {
            cleaned = rest;
        }
        if let Some(rest) = cleaned.strip_suffix("```") {
            cleaned = rest;
        }
        let cleaned = cleaned.trim();

        let start = cleaned.find('{');
        let end = cleaned.rfind('}');
        let json_span = match (start, end) {
            (Some(s), Some(e)) if s < e => &cleaned[s..=e],
            _ => {
                return Err(PixmemError::Vision(
                    "no JSON object found in vendor response".into(),
                ))
            }
        };

        let contract: VisionContract = serde_json::from_str(json_span)
            .map_err(|e| PixmemError::Vision(format!("contract violation: {e}")))?;

        if contract.summary.trim().is_empty() {
            return Err(PixmemError::Vision(
                "contract violation: summary is empty".into(),
            ));
        }

        Ok(contract)
    }
}
