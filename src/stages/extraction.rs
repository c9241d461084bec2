use serde::{Deserialize, Serialize};
use tracing::info;

use super::Stages;
use crate::backend::{invoke_validated, PromptId};
use crate::contract::ExtractedProduct;
use crate::error::{StageError, StageName};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub product_url: String,
}

impl Stages {
    /// Best-effort product description for a URL. A description that only
    /// states the page could not be read is still a success.
    pub async fn extract(&self, url: &str) -> Result<ExtractedProduct, StageError> {
        info!("🔗 Extracting product information from {}", url);
        let request = ExtractRequest { product_url: url.to_string() };
        let product: ExtractedProduct = invoke_validated(
            self.backend(),
            StageName::Extraction,
            PromptId::ExtractProductInfo,
            &request,
            self.timeout(),
        )
        .await?;
        info!(
            product_name = product.product_name.as_deref().unwrap_or("<unnamed>"),
            chars = product.product_description.chars().count(),
            "✅ Extraction complete"
        );
        Ok(product)
    }
}
