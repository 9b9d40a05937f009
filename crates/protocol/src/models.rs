//! Model-listing responses (§B.1) — a pure mapping from a caller-supplied
//! model id list to each wire format's `GET /v1/models` shape. Fetching or
//! caching the list from a provider is a caller concern; this module only
//! knows how to format one.

use serde::Serialize;

/// One entry the caller supplies to a listing endpoint: the model id as the
/// provider knows it, and the Unix timestamp of its `created` field where the
/// wire format expects one.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Serialize)]
pub struct OpenAiModelsResponse {
    pub object: &'static str,
    pub data: Vec<OpenAiModel>,
}

#[derive(Serialize)]
pub struct OpenAiModel {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
}

/// Builds the `GET /v1/models` body shared by the Chat and Responses formats.
pub fn openai_models(models: &[ModelInfo]) -> OpenAiModelsResponse {
    OpenAiModelsResponse {
        object: "list",
        data: models
            .iter()
            .map(|m| OpenAiModel {
                id: m.id.clone(),
                object: "model",
                created: m.created,
                owned_by: m.owned_by.clone(),
            })
            .collect(),
    }
}

#[derive(Serialize)]
pub struct AnthropicModelsResponse {
    pub data: Vec<AnthropicModel>,
    pub has_more: bool,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}

#[derive(Serialize)]
pub struct AnthropicModel {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub display_name: String,
    pub created_at: String,
}

/// Builds the `GET /v1/models` body for the Messages (Anthropic) format.
/// Anthropic uses an ISO-8601 `created_at` string rather than a Unix epoch,
/// and reports pagination cursors; since the caller hands us the full list
/// up front there is never a second page.
pub fn anthropic_models(models: &[ModelInfo]) -> AnthropicModelsResponse {
    let data: Vec<AnthropicModel> = models
        .iter()
        .map(|m| AnthropicModel {
            id: m.id.clone(),
            r#type: "model",
            display_name: m.id.clone(),
            created_at: unix_to_iso8601(m.created),
        })
        .collect();

    AnthropicModelsResponse {
        first_id: data.first().map(|m| m.id.clone()),
        last_id: data.last().map(|m| m.id.clone()),
        has_more: false,
        data,
    }
}

#[derive(Serialize)]
pub struct GeminiModelsResponse {
    pub models: Vec<GeminiModel>,
}

#[derive(Serialize)]
pub struct GeminiModel {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "supportedGenerationMethods")]
    pub supported_generation_methods: Vec<&'static str>,
}

/// Builds the `GET /v1/models` body for the Gemini format. Gemini names
/// models as resource paths (`models/gemini-1.5-pro`); a caller-supplied id
/// that doesn't already carry the `models/` prefix gets one.
pub fn gemini_models(models: &[ModelInfo]) -> GeminiModelsResponse {
    GeminiModelsResponse {
        models: models
            .iter()
            .map(|m| {
                let name = if m.id.starts_with("models/") { m.id.clone() } else { format!("models/{}", m.id) };
                GeminiModel {
                    display_name: m.id.clone(),
                    name,
                    supported_generation_methods: vec!["generateContent", "streamGenerateContent"],
                }
            })
            .collect(),
    }
}

/// Unix seconds to a minimal ISO-8601 UTC timestamp, without pulling in a
/// date/time dependency the rest of the crate has no other use for.
fn unix_to_iso8601(secs: i64) -> String {
    const SECS_PER_DAY: i64 = 86_400;
    let days_since_epoch = secs.div_euclid(SECS_PER_DAY);
    let time_of_day = secs.rem_euclid(SECS_PER_DAY);

    let (year, month, day) = civil_from_days(days_since_epoch);
    let hour = time_of_day / 3600;
    let minute = (time_of_day % 3600) / 60;
    let second = time_of_day % 60;

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Howard Hinnant's civil-from-days algorithm, proleptic Gregorian calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ModelInfo> {
        vec![ModelInfo { id: "gpt-4o".to_string(), created: 1_700_000_000, owned_by: "openai".to_string() }]
    }

    #[test]
    fn openai_listing_wraps_each_model() {
        let response = openai_models(&sample());
        assert_eq!(response.object, "list");
        assert_eq!(response.data[0].id, "gpt-4o");
        assert_eq!(response.data[0].object, "model");
    }

    #[test]
    fn anthropic_listing_reports_first_and_last_id() {
        let response = anthropic_models(&sample());
        assert_eq!(response.first_id.as_deref(), Some("gpt-4o"));
        assert_eq!(response.last_id.as_deref(), Some("gpt-4o"));
        assert!(!response.has_more);
    }

    #[test]
    fn gemini_listing_adds_resource_prefix() {
        let response = gemini_models(&sample());
        assert_eq!(response.models[0].name, "models/gpt-4o");
    }

    #[test]
    fn gemini_listing_leaves_existing_prefix_alone() {
        let models = vec![ModelInfo { id: "models/gemini-1.5-pro".to_string(), created: 0, owned_by: "google".to_string() }];
        let response = gemini_models(&models);
        assert_eq!(response.models[0].name, "models/gemini-1.5-pro");
    }

    #[test]
    fn unix_epoch_formats_as_1970() {
        assert_eq!(unix_to_iso8601(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn known_timestamp_formats_correctly() {
        // 2023-11-14T22:13:20Z
        assert_eq!(unix_to_iso8601(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
