use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::backend::{BackendError, ModelBackend, PromptId};
use crate::config::Config;
use crate::contract::strip_code_fence;
use crate::prompts::{self, RenderedPrompt};
use crate::stages::{AlternativesRequest, ExtractRequest};

pub const DEMO_KEY: &str = "DEMO_KEY";

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        let total = s.chars().count();
                        if total > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = Value::String(format!("{head}...[truncated {} chars]", total - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_base.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }

    fn request_body(rendered: &RenderedPrompt) -> Result<Value, BackendError> {
        let mut parts = vec![json!({ "text": rendered.text })];
        if let Some(uri) = &rendered.image_data_uri {
            let (mime_type, data) = split_data_uri(uri)
                .ok_or_else(|| BackendError::Malformed("image is not a base64 data URI".into()))?;
            parts.push(json!({ "inlineData": { "mimeType": mime_type, "data": data } }));
        }
        Ok(json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseJsonSchema": rendered.response_schema,
                "temperature": 0.4,
                "topP": 0.95,
                "candidateCount": 1
            }
        }))
    }

    async fn perform_api_call(&self, prompt: PromptId, body: &Value) -> Result<String, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        info!("🔗 [{}] Making request to: {}", prompt.as_str(), url);

        let mut logged = body.clone();
        truncate_base64_in_json(&mut logged);
        info!("📤 Request body: {}", serde_json::to_string(&logged).unwrap_or_default());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await.map_err(|e| BackendError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(BackendError::Unavailable(format!("status={status}")));
            }
            return Err(BackendError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| BackendError::Malformed(format!("parse error: {e}")))?;
        first_text(&parsed).ok_or_else(|| BackendError::Malformed("no text content in response".into()))
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    async fn invoke(&self, prompt: PromptId, input: Value) -> Result<Value, BackendError> {
        if self.is_demo() {
            info!("Using demo mode - returning canned {} response", prompt.as_str());
            return demo_response(prompt, &input);
        }

        let rendered = prompts::render(prompt, input).map_err(|e| BackendError::Malformed(e.to_string()))?;
        let body = Self::request_body(&rendered)?;
        let text = self.perform_api_call(prompt, &body).await?;
        serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            warn!("⚠️ [{}] model returned non-JSON text ({} chars)", prompt.as_str(), text.len());
            BackendError::Malformed(format!("model output is not JSON: {e}"))
        })
    }
}

fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    Some((header.strip_suffix(";base64")?, data))
}

/// Deterministic, contract-valid responses for running without an API key.
fn demo_response(prompt: PromptId, input: &Value) -> Result<Value, BackendError> {
    let bad_input = |e: serde_json::Error| BackendError::Malformed(e.to_string());
    let value = match prompt {
        PromptId::ExtractProductInfo => {
            let req: ExtractRequest = serde_json::from_value(input.clone()).map_err(bad_input)?;
            let domain = reqwest::Url::parse(&req.product_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "an unknown site".to_string());
            json!({
                "productName": format!("Product from {domain}"),
                "productDescription": format!(
                    "Unable to extract detailed product information from the provided URL. \
                    The URL appears to be a product page on {domain}."
                )
            })
        }
        PromptId::AnalyzeProduct => {
            let has_image = input.get("imageDataUri").is_some_and(|v| !v.is_null());
            let mut analysis = json!({
                "environmentalImpactAnalysis": "Demo analysis: the product has a moderate overall footprint.",
                "keyFactors": "Manufacturing energy, material origin and end-of-life handling.",
                "detailedAnalysis": {
                    "carbonFootprint": { "analysis": "Demo: manufacturing and shipping drive most emissions.", "impactLevel": "medium" },
                    "waterUsage": { "analysis": "Demo: no water data was available for this product.", "impactLevel": "unknown" },
                    "materialSourcing": { "analysis": "Demo: materials appear to be mostly virgin.", "impactLevel": "medium" },
                    "recyclability": { "analysis": "Demo: parts are recyclable where facilities exist.", "impactLevel": "medium" }
                },
                "overallSustainabilityScore": 50
            });
            if has_image {
                analysis["productIdentificationGuess"] = json!("Demo: identification from the photo is unclear.");
            }
            analysis
        }
        PromptId::GenerateInsights => json!({
            "actionableTips": ["Demo: prefer products with published lifecycle data."],
            "positiveHighlights": [],
            "areasForConsideration": ["Demo: consider durability and repairability."]
        }),
        PromptId::SuggestAlternatives => {
            let req: AlternativesRequest = serde_json::from_value(input.clone()).map_err(bad_input)?;
            json!({
                "alternatives": [
                    "Demo: second-hand equivalent",
                    "Demo: recycled-content equivalent",
                    "Demo: locally made equivalent"
                ],
                "reasoning": format!(
                    "Demo reasoning for \"{}\": reuse avoids new production, recycled content reduces virgin \
                    material demand, local manufacture shortens transport.",
                    req.product_query
                )
            })
        }
    };
    Ok(value)
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    #[allow(dead_code)]
    Other(Value),
}

fn first_text(resp: &GeminiResponse) -> Option<String> {
    resp.candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| match p {
            Part::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
}
