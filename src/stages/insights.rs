use serde::{Deserialize, Serialize};
use tracing::info;

use super::{EnrichmentInput, Stages};
use crate::backend::{invoke_validated, PromptId};
use crate::contract::{AnalysisResult, InsightsResult};
use crate::error::{StageError, StageName};
use crate::models::preference_labels;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest {
    pub product_query: String,
    pub analysis_result: AnalysisResult,
    pub sustainability_preferences: Vec<String>,
}

impl Stages {
    /// Consumer tips, highlights and broader considerations. Empty lists
    /// mean there is nothing to say for that section.
    pub async fn insights(&self, input: EnrichmentInput<'_>) -> Result<InsightsResult, StageError> {
        info!(preferences = input.preferences.len(), "💡 Generating product insights");
        let request = InsightsRequest {
            product_query: input.original_query.to_string(),
            analysis_result: input.analysis.clone(),
            sustainability_preferences: preference_labels(input.preferences),
        };
        let insights: InsightsResult = invoke_validated(
            self.backend(),
            StageName::Insights,
            PromptId::GenerateInsights,
            &request,
            self.timeout(),
        )
        .await?;
        info!(
            tips = insights.actionable_tips.len(),
            highlights = insights.positive_highlights.len(),
            considerations = insights.areas_for_consideration.len(),
            "✅ Insights generated"
        );
        Ok(insights)
    }
}
