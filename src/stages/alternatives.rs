use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{EnrichmentInput, Stages};
use crate::backend::{invoke_validated, PromptId};
use crate::contract::{AlternativesResult, AnalysisResult};
use crate::error::{FailureCause, StageError, StageName};
use crate::models::preference_labels;

pub const TARGET_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativesRequest {
    pub product_query: String,
    pub environmental_impact_score: f64,
    pub breakdown: String,
    pub sustainability_preferences: Vec<String>,
}

/// Summary plus one line per category, e.g. `Water Usage (low): ...`.
pub fn impact_breakdown(analysis: &AnalysisResult) -> String {
    let mut lines = vec![analysis.environmental_impact_analysis.clone()];
    for (name, category) in analysis.detailed_analysis.categories() {
        lines.push(format!("{} ({}): {}", name.label(), category.impact_level, category.analysis));
    }
    if let Some(ia) = &analysis.detailed_analysis.ingredient_analysis {
        lines.push(format!("Ingredients ({}): {}", ia.ingredient_impact_level, ia.overall_ingredient_summary));
    }
    lines.join("\n")
}

impl Stages {
    pub async fn alternatives(&self, input: EnrichmentInput<'_>) -> Result<AlternativesResult, StageError> {
        info!(
            score = input.analysis.overall_sustainability_score,
            preferences = input.preferences.len(),
            "🌱 Suggesting sustainable alternatives"
        );
        let request = AlternativesRequest {
            product_query: input.original_query.to_string(),
            environmental_impact_score: input.analysis.overall_sustainability_score,
            breakdown: impact_breakdown(input.analysis),
            sustainability_preferences: preference_labels(input.preferences),
        };
        let result: AlternativesResult = invoke_validated(
            self.backend(),
            StageName::Alternatives,
            PromptId::SuggestAlternatives,
            &request,
            self.timeout(),
        )
        .await?;

        if result.alternatives.is_empty() {
            return Err(StageError::new(StageName::Alternatives, FailureCause::EmptyResult));
        }
        if result.alternatives.len() < TARGET_ALTERNATIVES {
            warn!(count = result.alternatives.len(), "fewer alternatives than requested");
        }
        info!(count = result.alternatives.len(), "✅ Alternatives suggested");
        Ok(result)
    }
}
