//! Prompt text for each model call, rendered from the stage's typed request.

use serde_json::Value;

use crate::backend::PromptId;
use crate::contract::{
    self, AlternativesResult, AnalysisResult, ExtractedProduct, InsightsResult,
};
use crate::stages::{AlternativesRequest, AnalysisRequest, ExtractRequest, InsightsRequest};

#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub text: String,
    /// Sent alongside the text as inline media.
    pub image_data_uri: Option<String>,
    pub response_schema: Value,
}

pub fn render(prompt: PromptId, input: Value) -> Result<RenderedPrompt, serde_json::Error> {
    let rendered = match prompt {
        PromptId::ExtractProductInfo => {
            let req: ExtractRequest = serde_json::from_value(input)?;
            RenderedPrompt {
                text: extraction_prompt(&req),
                image_data_uri: None,
                response_schema: contract::response_schema::<ExtractedProduct>(),
            }
        }
        PromptId::AnalyzeProduct => {
            let req: AnalysisRequest = serde_json::from_value(input)?;
            RenderedPrompt {
                text: analysis_prompt(&req),
                image_data_uri: req.image_data_uri,
                response_schema: contract::response_schema::<AnalysisResult>(),
            }
        }
        PromptId::GenerateInsights => {
            let req: InsightsRequest = serde_json::from_value(input)?;
            RenderedPrompt {
                text: insights_prompt(&req),
                image_data_uri: None,
                response_schema: contract::response_schema::<InsightsResult>(),
            }
        }
        PromptId::SuggestAlternatives => {
            let req: AlternativesRequest = serde_json::from_value(input)?;
            RenderedPrompt {
                text: alternatives_prompt(&req),
                image_data_uri: None,
                response_schema: contract::response_schema::<AlternativesResult>(),
            }
        }
    };
    Ok(rendered)
}

fn preference_block(preferences: &[String], when_empty: &str) -> String {
    if preferences.is_empty() {
        return when_empty.to_string();
    }
    let list: Vec<String> = preferences.iter().map(|p| format!("- {p}")).collect();
    format!("The user's sustainability preferences:\n{}", list.join("\n"))
}

pub fn extraction_prompt(req: &ExtractRequest) -> String {
    format!(
        "You extract product information from a product page URL for a later environmental impact assessment.\n\
        Product URL: {url}\n\n\
        Infer the product name (use \"Unknown Product\" if it cannot be identified) and write a description \
        covering product type, materials and any manufacturing indicators. Use what you know about common \
        e-commerce page structures when the domain is recognizable. If you cannot read the page, say so \
        explicitly and base the description on the URL alone. If nothing meaningful can be determined, the \
        description must start with \"Unable to extract detailed product information from the provided URL.\" \
        Never invent specifics you cannot support. Respond with JSON only.",
        url = req.product_url
    )
}

pub fn analysis_prompt(req: &AnalysisRequest) -> String {
    let image_section = if req.image_data_uri.is_some() {
        "A product photo is attached. Based only on the photo, give your best guess of what the product is in \
        productIdentificationGuess, and say so plainly if identification is unclear. The guess complements the \
        description; it must not replace it.\n\n"
    } else {
        "No photo was provided. Omit productIdentificationGuess.\n\n"
    };
    format!(
        "You are a meticulous environmental impact assessor.\n\
        Product description: {description}\n\n\
        {image_section}\
        Assess carbon footprint (full lifecycle), water usage (direct and indirect), material sourcing \
        (virgin vs recycled, renewable, certifications) and recyclability (end-of-life options). For each give \
        an analysis and an impactLevel of low, medium, high or unknown; for recyclability, low means highly \
        recyclable. When a level is unknown, explain why in that category's own words. If the product has \
        ingredients (food, cosmetics, cleaning products), add ingredientAnalysis with each ingredient's \
        assessment (Generally Safe, Use with Caution, Potential Concern, Unknown).\n\
        Finish with overallSustainabilityScore, a number from 0 (very unsustainable) to 100 (highly \
        sustainable) that aggregates the category findings. Respond with JSON only.",
        description = req.product_description
    )
}

pub fn insights_prompt(req: &InsightsRequest) -> String {
    let a = &req.analysis_result;
    let d = &a.detailed_analysis;
    let mut analysis_lines = vec![
        format!("Overall score: {}/100", a.overall_sustainability_score),
        format!("Summary: {}", a.environmental_impact_analysis),
        format!("Key factors: {}", a.key_factors),
    ];
    for (name, category) in d.categories() {
        analysis_lines.push(format!("{}: {} (impact: {})", name.label(), category.analysis, category.impact_level));
    }
    if let Some(ia) = &d.ingredient_analysis {
        analysis_lines.push(format!(
            "Ingredients: {} (impact: {})",
            ia.overall_ingredient_summary, ia.ingredient_impact_level
        ));
    }
    if let Some(guess) = &a.product_identification_guess {
        analysis_lines.push(format!("Identified from photo: {guess}"));
    }

    format!(
        "You give consumers clear, encouraging sustainability insights.\n\
        Original product query: {query}\n\n\
        {preferences}\n\n\
        Environmental impact analysis:\n{analysis}\n\n\
        Return actionableTips (at most 3 practical actions), positiveHighlights (at most 2) and \
        areasForConsideration (at most 2 broader points for this type of product). Every item must visibly \
        connect to at least one stated preference when preferences are given. Use an empty list when a \
        section has nothing to say; never use placeholder text such as \"N/A\". Respond with JSON only.",
        query = req.product_query,
        preferences = preference_block(
            &req.sustainability_preferences,
            "The user has not stated preferences. Keep the insights general."
        ),
        analysis = analysis_lines.join("\n"),
    )
}

pub fn alternatives_prompt(req: &AlternativesRequest) -> String {
    let high_score_note = if req.environmental_impact_score > 70.0 {
        "The original product already scores well. Acknowledge this and suggest comparably good or \
        complementary options that improve on specific aspects.\n"
    } else {
        ""
    };
    format!(
        "You suggest more sustainable alternatives to a product.\n\
        Product query: {query}\n\
        Sustainability score of the original (0-100, higher is better): {score}\n\
        Impact breakdown:\n{breakdown}\n\n\
        {preferences}\n\n\
        {high_score_note}\
        Suggest at least three named alternatives. In reasoning, explain for each alternative why it is more \
        sustainable, and tie each one explicitly to the relevant preference when preferences are given. \
        Respond with JSON only.",
        query = req.product_query,
        score = req.environmental_impact_score,
        breakdown = req.breakdown,
        preferences = preference_block(
            &req.sustainability_preferences,
            "The user has not stated preferences. Explain the broad benefits of each alternative."
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_prompt_carries_image_separately() {
        let input = json!({
            "productDescription": "Cotton t-shirt, made in Bangladesh",
            "imageDataUri": "data:image/png;base64,AAAA"
        });
        let rendered = render(PromptId::AnalyzeProduct, input).unwrap();
        assert_eq!(rendered.image_data_uri.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(rendered.text.contains("Cotton t-shirt"));
        assert!(!rendered.text.contains("base64"));
    }

    #[test]
    fn preferences_shape_the_alternatives_prompt() {
        let req = AlternativesRequest {
            product_query: "Plastic toothbrush".into(),
            environmental_impact_score: 82.0,
            breakdown: "Summary".into(),
            sustainability_preferences: vec!["Recycled Materials".into()],
        };
        let text = alternatives_prompt(&req);
        assert!(text.contains("- Recycled Materials"));
        assert!(text.contains("already scores well"));
    }

    #[test]
    fn render_rejects_mismatched_input() {
        assert!(render(PromptId::ExtractProductInfo, json!({ "url": 3 })).is_err());
    }
}
