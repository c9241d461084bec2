//! The generative-model backend as seen by the pipeline: an opaque,
//! latency-variable function from (prompt, typed input) to JSON.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::contract::{self, Contract};
use crate::error::{FailureCause, StageError, StageName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptId {
    ExtractProductInfo,
    AnalyzeProduct,
    GenerateInsights,
    SuggestAlternatives,
}

impl PromptId {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptId::ExtractProductInfo => "extractProductInfoFromUrl",
            PromptId::AnalyzeProduct => "analyzeProductDescription",
            PromptId::GenerateInsights => "generateProductInsights",
            PromptId::SuggestAlternatives => "suggestSustainableAlternatives",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable backend response: {0}")]
    Malformed(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run the named prompt with a JSON-encoded typed input. The returned
    /// value is untrusted until it passes the contract.
    async fn invoke(&self, prompt: PromptId, input: Value) -> Result<Value, BackendError>;
}

/// Call the backend under `timeout` and validate the response as `T`.
/// Every failure mode is reported as a failure of `stage`.
pub async fn invoke_validated<I, T>(
    backend: &dyn ModelBackend,
    stage: StageName,
    prompt: PromptId,
    input: &I,
    timeout: Duration,
) -> Result<T, StageError>
where
    I: Serialize + ?Sized,
    T: Contract,
{
    let input = serde_json::to_value(input)
        .map_err(|e| StageError::new(stage, FailureCause::InvalidInput(e.to_string())))?;

    debug!(prompt = prompt.as_str(), ?timeout, "invoking model backend");
    let raw = match tokio::time::timeout(timeout, backend.invoke(prompt, input)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return Err(StageError::new(stage, e)),
        Err(_) => {
            warn!(prompt = prompt.as_str(), ?timeout, "⏱️ model call timed out");
            return Err(StageError::new(stage, FailureCause::Timeout(timeout)));
        }
    };

    contract::validate::<T>(&raw).map_err(|e| {
        warn!(prompt = prompt.as_str(), error = %e, "model output rejected by contract");
        StageError::new(stage, e)
    })
}
