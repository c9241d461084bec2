use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Stages;
use crate::backend::{invoke_validated, PromptId};
use crate::contract::AnalysisResult;
use crate::error::{FailureCause, StageError, StageName};
use crate::models::{truncate_chars, ProductImage, DESCRIPTION_MAX_CHARS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub product_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data_uri: Option<String>,
}

impl Stages {
    pub async fn analyze(
        &self,
        description: &str,
        image: Option<&ProductImage>,
    ) -> Result<AnalysisResult, StageError> {
        // Length bounds apply to what a user submits. Extracted text only has to say something.
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return Err(StageError::new(
                StageName::Analysis,
                FailureCause::InvalidInput("product description is blank".into()),
            ));
        }
        let product_description = truncate_chars(trimmed, DESCRIPTION_MAX_CHARS).to_string();

        info!(with_image = image.is_some(), "🔬 Analyzing product");
        let request = AnalysisRequest {
            product_description,
            image_data_uri: image.map(ProductImage::to_data_uri),
        };
        let mut result: AnalysisResult = invoke_validated(
            self.backend(),
            StageName::Analysis,
            PromptId::AnalyzeProduct,
            &request,
            self.timeout(),
        )
        .await?;

        // The identification guess comes from the photo alone.
        match (image, &result.product_identification_guess) {
            (None, Some(_)) => {
                debug!("discarding identification guess from a text-only analysis");
                result.product_identification_guess = None;
            }
            (Some(_), None) => warn!("analysis with an image returned no identification guess"),
            _ => {}
        }

        info!(score = result.overall_sustainability_score, "✅ Analysis complete");
        Ok(result)
    }
}
