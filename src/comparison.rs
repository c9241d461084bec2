use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::contract::{AnalysisResult, CategoryName, ImpactLevel};
use crate::models::{Preferences, ProductInput};
use crate::orchestrator::{Orchestrator, PipelineRun, Stage};
use crate::stages::Stages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotId {
    #[serde(alias = "1")]
    First,
    #[serde(alias = "2")]
    Second,
}

impl SlotId {
    pub fn default_name(self) -> &'static str {
        match self {
            SlotId::First => "Product 1",
            SlotId::Second => "Product 2",
        }
    }
}

impl FromStr for SlotId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "first" => Ok(SlotId::First),
            "2" | "second" => Ok(SlotId::Second),
            other => Err(format!("unknown slot `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ComparisonOutcome {
    Awaiting { pending: Vec<SlotId> },
    FirstMoreSustainable,
    SecondMoreSustainable,
    Tie,
}

/// One row of the side-by-side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryComparison {
    pub aspect: &'static str,
    pub first: Option<ImpactLevel>,
    pub second: Option<ImpactLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonView {
    pub run1: Option<PipelineRun>,
    pub run2: Option<PipelineRun>,
    pub outcome: ComparisonOutcome,
    pub summary: String,
    pub categories: Vec<CategoryComparison>,
}

fn display_name(run: Option<&PipelineRun>, slot: SlotId) -> String {
    run.and_then(PipelineRun::product_name)
        .unwrap_or(slot.default_name())
        .to_string()
}

fn finished_analysis(run: Option<&PipelineRun>) -> Option<&AnalysisResult> {
    run.filter(|r| r.stage() == Stage::Done).and_then(PipelineRun::analysis)
}

/// Compare two runs. Scores are compared as reported; a winner is only
/// named once both runs are `Done`.
pub fn compare(run1: Option<PipelineRun>, run2: Option<PipelineRun>) -> ComparisonView {
    let name1 = display_name(run1.as_ref(), SlotId::First);
    let name2 = display_name(run2.as_ref(), SlotId::Second);

    let (outcome, summary) = match (finished_analysis(run1.as_ref()), finished_analysis(run2.as_ref())) {
        (Some(a), Some(b)) => {
            match a.overall_sustainability_score.partial_cmp(&b.overall_sustainability_score) {
                Some(Ordering::Greater) => (
                    ComparisonOutcome::FirstMoreSustainable,
                    format!("{name1} appears to be more sustainable overall."),
                ),
                Some(Ordering::Less) => (
                    ComparisonOutcome::SecondMoreSustainable,
                    format!("{name2} appears to be more sustainable overall."),
                ),
                _ => (
                    ComparisonOutcome::Tie,
                    "Both products have similar overall sustainability scores based on the analysis.".to_string(),
                ),
            }
        }
        (Some(_), None) => (
            ComparisonOutcome::Awaiting { pending: vec![SlotId::Second] },
            format!("Awaiting analysis for {name2} to compare."),
        ),
        (None, Some(_)) => (
            ComparisonOutcome::Awaiting { pending: vec![SlotId::First] },
            format!("Awaiting analysis for {name1} to compare."),
        ),
        (None, None) => (
            ComparisonOutcome::Awaiting { pending: vec![SlotId::First, SlotId::Second] },
            "Awaiting analysis for both products to provide a comparison summary.".to_string(),
        ),
    };

    let categories = category_rows(
        run1.as_ref().and_then(PipelineRun::analysis),
        run2.as_ref().and_then(PipelineRun::analysis),
    );
    ComparisonView { run1, run2, outcome, summary, categories }
}

fn category_rows(a: Option<&AnalysisResult>, b: Option<&AnalysisResult>) -> Vec<CategoryComparison> {
    if a.is_none() && b.is_none() {
        return Vec::new();
    }
    let level = |r: Option<&AnalysisResult>, name| r.map(|r| r.detailed_analysis.category(name).impact_level);
    let mut rows: Vec<CategoryComparison> = CategoryName::ALL
        .into_iter()
        .map(|name| CategoryComparison { aspect: name.label(), first: level(a, name), second: level(b, name) })
        .collect();

    let ingredient_level = |r: Option<&AnalysisResult>| {
        r.and_then(|r| r.detailed_analysis.ingredient_analysis.as_ref())
            .map(|ia| ia.ingredient_impact_level)
    };
    let (first, second) = (ingredient_level(a), ingredient_level(b));
    if first.is_some() || second.is_some() {
        rows.push(CategoryComparison { aspect: "Overall Ingredient Impact", first, second });
    }
    rows
}

/// Two independent orchestrators, one per product.
#[derive(Clone)]
pub struct ComparisonCoordinator {
    first: Orchestrator,
    second: Orchestrator,
}

impl ComparisonCoordinator {
    pub fn new(stages: Stages) -> Self {
        Self { first: Orchestrator::new(stages.clone()), second: Orchestrator::new(stages) }
    }

    pub fn orchestrator(&self, slot: SlotId) -> &Orchestrator {
        match slot {
            SlotId::First => &self.first,
            SlotId::Second => &self.second,
        }
    }

    pub fn submit(
        &self,
        slot: SlotId,
        input: ProductInput,
        preferences: Preferences,
    ) -> UnboundedReceiverStream<PipelineRun> {
        self.orchestrator(slot).run(input, preferences)
    }

    /// Run both products concurrently and return the view once both runs
    /// have settled.
    pub async fn run_both(
        &self,
        first: (ProductInput, Preferences),
        second: (ProductInput, Preferences),
    ) -> ComparisonView {
        info!("⚖️ Running comparison of two products");
        tokio::join!(
            self.first.run_to_end(first.0, first.1),
            self.second.run_to_end(second.0, second.1)
        );
        self.view()
    }

    pub fn view(&self) -> ComparisonView {
        compare(self.first.current(), self.second.current())
    }

    /// Stop both slots' in-flight runs.
    pub fn cancel(&self) {
        self.first.slot().cancel();
        self.second.slot().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DetailedAnalysis, ImpactCategory, IngredientAnalysis};
    use crate::error::{ErrorInfo, StageErrorKind, StageName};
    use crate::orchestrator::RunState;
    use pretty_assertions::assert_eq;

    fn category(level: ImpactLevel, text: &str) -> ImpactCategory {
        ImpactCategory { analysis: text.to_string(), impact_level: level }
    }

    fn analysis(score: f64, carbon: ImpactLevel) -> AnalysisResult {
        AnalysisResult {
            environmental_impact_analysis: "summary".into(),
            key_factors: "factors".into(),
            product_identification_guess: None,
            detailed_analysis: DetailedAnalysis {
                carbon_footprint: category(carbon, "carbon"),
                water_usage: category(ImpactLevel::Low, "water"),
                material_sourcing: category(ImpactLevel::Medium, "materials"),
                recyclability: category(ImpactLevel::High, "recycling"),
                ingredient_analysis: None,
            },
            overall_sustainability_score: score,
        }
    }

    fn done(score: f64) -> PipelineRun {
        let mut run = PipelineRun::new(
            ProductInput::describe("a product description", None).unwrap(),
            Preferences::new(),
            1,
        );
        run.state = RunState::Done {
            analysis: analysis(score, ImpactLevel::Medium),
            insights: None,
            alternatives: None,
        };
        run
    }

    fn failed() -> PipelineRun {
        let mut run = done(0.0);
        run.state = RunState::Failed { failed_stage: StageName::Analysis };
        run.errors.insert(
            StageName::Analysis,
            ErrorInfo {
                kind: StageErrorKind::AnalysisFailed,
                message: StageErrorKind::AnalysisFailed.user_message().into(),
                timed_out: false,
            },
        );
        run
    }

    #[test]
    fn higher_score_wins() {
        let view = compare(Some(done(80.0)), Some(done(40.0)));
        assert_eq!(view.outcome, ComparisonOutcome::FirstMoreSustainable);
        assert_eq!(view.summary, "Product 1 appears to be more sustainable overall.");

        let view = compare(Some(done(40.0)), Some(done(80.0)));
        assert_eq!(view.outcome, ComparisonOutcome::SecondMoreSustainable);
    }

    #[test]
    fn equal_scores_tie() {
        let view = compare(Some(done(55.0)), Some(done(55.0)));
        assert_eq!(view.outcome, ComparisonOutcome::Tie);
    }

    #[test]
    fn failed_side_leaves_comparison_awaiting() {
        let view = compare(Some(done(80.0)), Some(failed()));
        assert_eq!(view.outcome, ComparisonOutcome::Awaiting { pending: vec![SlotId::Second] });
        assert_eq!(view.summary, "Awaiting analysis for Product 2 to compare.");
        // the finished side is still tabulated
        assert_eq!(view.categories.len(), 4);
        assert_eq!(view.categories[0].first, Some(ImpactLevel::Medium));
        assert_eq!(view.categories[0].second, None);
    }

    #[test]
    fn enriching_run_is_not_compared_yet() {
        let mut enriching = done(90.0);
        enriching.state = RunState::Enriching { analysis: analysis(90.0, ImpactLevel::Low) };
        let view = compare(Some(done(10.0)), Some(enriching));
        assert_eq!(view.outcome, ComparisonOutcome::Awaiting { pending: vec![SlotId::Second] });
    }

    #[test]
    fn nothing_submitted() {
        let view = compare(None, None);
        assert_eq!(
            view.outcome,
            ComparisonOutcome::Awaiting { pending: vec![SlotId::First, SlotId::Second] }
        );
        assert!(view.categories.is_empty());
    }

    #[test]
    fn ingredient_row_appears_when_either_side_has_it() {
        let mut first = done(60.0);
        if let RunState::Done { analysis, .. } = &mut first.state {
            analysis.detailed_analysis.ingredient_analysis = Some(IngredientAnalysis {
                identified_ingredients: vec![],
                overall_ingredient_summary: "mild".into(),
                ingredient_impact_level: ImpactLevel::Low,
            });
        }
        let view = compare(Some(first), Some(done(50.0)));
        let last = view.categories.last().unwrap();
        assert_eq!(last.aspect, "Overall Ingredient Impact");
        assert_eq!((last.first, last.second), (Some(ImpactLevel::Low), None));
    }

    #[test]
    fn extracted_name_is_used_in_summary() {
        let mut first = done(70.0);
        first.extracted = Some(crate::contract::ExtractedProduct {
            product_name: Some("Bamboo Toothbrush".into()),
            product_description: "A bamboo toothbrush".into(),
        });
        let view = compare(Some(first), Some(done(20.0)));
        assert_eq!(view.summary, "Bamboo Toothbrush appears to be more sustainable overall.");
    }

    #[test]
    fn slot_ids_parse_from_paths() {
        assert_eq!("1".parse::<SlotId>().unwrap(), SlotId::First);
        assert_eq!("second".parse::<SlotId>().unwrap(), SlotId::Second);
        assert!("3".parse::<SlotId>().is_err());
    }
}
