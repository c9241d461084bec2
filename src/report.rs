//! Flat CSV export of one analysis.

use crate::contract::AnalysisResult;

pub const CSV_HEADERS: [&str; 5] = ["Category", "Sub Category", "Detail", "Impact Level", "Value"];

/// Quote a cell when it contains a comma, quote or line break; embedded
/// quotes are doubled.
pub fn escape_csv_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn row(category: &str, sub: &str, detail: &str, level: &str, value: &str) -> [String; 5] {
    [category, sub, detail, level, value].map(str::to_string)
}

pub fn analysis_rows(analysis: &AnalysisResult) -> Vec<[String; 5]> {
    let mut rows = vec![
        row("Overall", "Sustainability Score", "", "", &analysis.overall_sustainability_score.to_string()),
        row("Overall", "Environmental Impact Analysis", "", "", &analysis.environmental_impact_analysis),
        row("Overall", "Key Factors", "", "", &analysis.key_factors),
    ];
    if let Some(guess) = &analysis.product_identification_guess {
        rows.push(row("Overall", "Product Identification (Image)", "", "", guess));
    }

    let detailed = &analysis.detailed_analysis;
    for (name, category) in detailed.categories() {
        rows.push(row("Detailed Analysis", name.label(), "Analysis", category.impact_level.as_str(), &category.analysis));
    }

    if let Some(ia) = &detailed.ingredient_analysis {
        rows.push(row(
            "Ingredient Analysis",
            "Overall Summary",
            "",
            ia.ingredient_impact_level.as_str(),
            &ia.overall_ingredient_summary,
        ));
        for (i, ing) in ia.identified_ingredients.iter().enumerate() {
            let n = i + 1;
            rows.push(row("Ingredient Analysis", &format!("Ingredient {n} Name"), "", ing.assessment.as_str(), &ing.name));
            rows.push(row(
                "Ingredient Analysis",
                &format!("Ingredient {n} Health Hazards"),
                "",
                "",
                ing.health_hazards.as_deref().unwrap_or("N/A"),
            ));
            rows.push(row(
                "Ingredient Analysis",
                &format!("Ingredient {n} Environmental Impact"),
                "",
                "",
                ing.environmental_impact.as_deref().unwrap_or("N/A"),
            ));
        }
    }
    rows
}

pub fn analysis_csv(analysis: &AnalysisResult) -> String {
    let header = CSV_HEADERS.map(escape_csv_cell).join(",");
    let body = analysis_rows(analysis)
        .into_iter()
        .map(|r| r.iter().map(|c| escape_csv_cell(c)).collect::<Vec<_>>().join(","));
    std::iter::once(header).chain(body).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        DetailedAnalysis, ImpactCategory, ImpactLevel, IngredientAnalysis, IngredientAssessment, IngredientDetail,
    };
    use pretty_assertions::assert_eq;

    fn category(level: ImpactLevel, text: &str) -> ImpactCategory {
        ImpactCategory { analysis: text.into(), impact_level: level }
    }

    fn sample() -> AnalysisResult {
        AnalysisResult {
            environmental_impact_analysis: "Moderate impact, mostly from \"fast\" shipping".into(),
            key_factors: "Energy, water".into(),
            product_identification_guess: None,
            detailed_analysis: DetailedAnalysis {
                carbon_footprint: category(ImpactLevel::High, "Air freight"),
                water_usage: category(ImpactLevel::Low, "Minimal"),
                material_sourcing: category(ImpactLevel::Medium, "Mixed\nsources"),
                recyclability: category(ImpactLevel::Unknown, "No recycling data for this resin"),
                ingredient_analysis: None,
            },
            overall_sustainability_score: 64.0,
        }
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_csv_cell("plain"), "plain");
        assert_eq!(escape_csv_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_cell("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_has_header_and_flattened_rows() {
        let csv = analysis_csv(&sample());
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Category,Sub Category,Detail,Impact Level,Value"));
        assert_eq!(lines.next(), Some("Overall,Sustainability Score,,,64"));
        assert_eq!(
            lines.next(),
            Some("Overall,Environmental Impact Analysis,,,\"Moderate impact, mostly from \"\"fast\"\" shipping\"")
        );
        assert!(csv.contains("Detailed Analysis,Carbon Footprint,Analysis,high,Air freight"));
        assert!(csv.contains("Detailed Analysis,Material Sourcing,Analysis,medium,\"Mixed\nsources\""));
        assert!(csv.contains("Detailed Analysis,Recyclability,Analysis,unknown,No recycling data for this resin"));
        assert_eq!(analysis_rows(&sample()).len(), 7);
    }

    #[test]
    fn ingredients_expand_to_three_rows_each() {
        let mut analysis = sample();
        analysis.detailed_analysis.ingredient_analysis = Some(IngredientAnalysis {
            identified_ingredients: vec![IngredientDetail {
                name: "Parabens".into(),
                health_hazards: Some("Possible endocrine disruption".into()),
                environmental_impact: None,
                assessment: IngredientAssessment::PotentialConcern,
            }],
            overall_ingredient_summary: "One ingredient of concern".into(),
            ingredient_impact_level: ImpactLevel::Medium,
        });
        let csv = analysis_csv(&analysis);
        assert!(csv.contains("Ingredient Analysis,Overall Summary,,medium,One ingredient of concern"));
        assert!(csv.contains("Ingredient Analysis,Ingredient 1 Name,,Potential Concern,Parabens"));
        assert!(csv.contains("Ingredient Analysis,Ingredient 1 Environmental Impact,,,N/A"));
        assert_eq!(analysis_rows(&analysis).len(), 11);
    }
}
