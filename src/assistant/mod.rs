//! Text assistant endpoint with web-search grounding
//!
//! Request/response wrapper around the hosted generateContent API used by
//! the chat and market views. Answers come back with an ordered list of
//! cited web sources.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// User coordinates attached to location-aware questions
#[derive(Debug, Clone, Copy)]
pub struct Location {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

/// A cited web reference returned alongside a grounded answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingSource {
    /// Page title (falls back to "Reference")
    pub title: String,
    /// Page URI
    pub uri: String,
}

/// A grounded answer
#[derive(Debug, Clone)]
pub struct Answer {
    /// Answer text
    pub text: String,
    /// Cited sources, deduplicated by URI, order preserved
    pub sources: Vec<GroundingSource>,
}

/// Standing market-trends question for the market insight view
pub const MARKET_PROMPT: &str = "Provide a summary of the latest global and \
regional agricultural market trends for major commodities like wheat, corn, \
and soy. Mention any significant price shifts or supply chain alerts.";

/// Client for the text assistant endpoint
pub struct Assistant {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    system_instruction: String,
}

impl Assistant {
    /// Create a new assistant client
    #[must_use]
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            system_instruction: system_instruction.into(),
        }
    }

    /// Ask a grounded question, optionally anchored to the user's location
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed
    pub async fn ask(&self, prompt: &str, location: Option<Location>) -> Result<Answer> {
        let contents = location.map_or_else(
            || prompt.to_string(),
            |loc| {
                format!(
                    "User current location: Latitude {}, Longitude {}. {prompt}",
                    loc.lat, loc.lng
                )
            },
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: contents }],
            }],
            system_instruction: Content {
                parts: vec![Part {
                    text: self.system_instruction.clone(),
                }],
            },
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Assistant(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Assistant(format!("API error: {status} - {body}")));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Assistant(format!("failed to parse response: {e}")))?;

        Ok(parse_answer(result))
    }

    /// Fetch the standing market-trends summary
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn market_summary(&self, location: Option<Location>) -> Result<Answer> {
        self.ask(MARKET_PROMPT, location).await
    }
}

/// Flatten a response into answer text plus deduplicated sources
fn parse_answer(response: GenerateContentResponse) -> Answer {
    let candidate = response.candidates.into_iter().next();

    let text = candidate
        .as_ref()
        .map(|c| {
            c.content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "I'm sorry, I couldn't process that request.".to_string());

    let mut sources = Vec::new();
    if let Some(chunks) = candidate.and_then(|c| c.grounding_metadata.map(|m| m.grounding_chunks)) {
        for chunk in chunks {
            let Some(web) = chunk.web else { continue };
            let Some(uri) = web.uri else { continue };
            if sources.iter().any(|s: &GroundingSource| s.uri == uri) {
                continue;
            }
            sources.push(GroundingSource {
                title: web.title.unwrap_or_else(|| "Reference".to_string()),
                uri,
            });
        }
    }

    Answer { text, sources }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_from_json(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_text_and_sources() {
        let response = response_from_json(
            r#"{
                "candidates": [{
                    "content": { "parts": [{ "text": "Wheat is up." }] },
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "web": { "title": "USDA", "uri": "https://usda.gov/a" } },
                            { "web": { "uri": "https://example.com/b" } },
                            { "web": { "title": "USDA again", "uri": "https://usda.gov/a" } }
                        ]
                    }
                }]
            }"#,
        );

        let answer = parse_answer(response);
        assert_eq!(answer.text, "Wheat is up.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].title, "USDA");
        assert_eq!(answer.sources[1].title, "Reference");
    }

    #[test]
    fn empty_candidates_fall_back_to_apology() {
        let answer = parse_answer(response_from_json("{}"));
        assert!(answer.text.starts_with("I'm sorry"));
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn non_web_chunks_are_skipped() {
        let response = response_from_json(
            r#"{
                "candidates": [{
                    "content": { "parts": [{ "text": "ok" }] },
                    "groundingMetadata": { "groundingChunks": [ {} ] }
                }]
            }"#,
        );
        assert!(parse_answer(response).sources.is_empty());
    }
}
