//! Pipeline orchestration for one product slot.
//!
//! A run moves through
//! `Idle -> (Extracting ->) Analyzing -> Enriching -> Done`, or to `Failed`
//! when extraction or analysis fails. Enrichment failures are recorded in
//! `errors` and the run still ends `Done` with its analysis.
//!
//! Each [`Slot`] carries a generation counter. Submitting new input bumps
//! the generation and every write from a run is a compare-and-commit on it,
//! so a superseded run can never overwrite a fresher one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contract::{AlternativesResult, AnalysisResult, ExtractedProduct, InsightsResult};
use crate::error::{ErrorInfo, StageError, StageName};
use crate::models::{truncate_chars, Preferences, ProductInput, DESCRIPTION_MAX_CHARS};
use crate::stages::{EnrichmentInput, Stages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Idle,
    Extracting,
    Analyzing,
    Enriching,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn allowed_transitions(self) -> &'static [Stage] {
        use Stage::*;
        match self {
            Idle => &[Extracting, Analyzing],
            Extracting => &[Analyzing, Failed],
            Analyzing => &[Enriching, Failed],
            Enriching => &[Done],
            Done | Failed => &[],
        }
    }

    pub fn can_transition(self, to: Stage) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Stage plus whatever results that stage guarantees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage")]
pub enum RunState {
    Idle,
    Extracting,
    Analyzing,
    Enriching {
        analysis: AnalysisResult,
    },
    Done {
        analysis: AnalysisResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        insights: Option<InsightsResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        alternatives: Option<AlternativesResult>,
    },
    Failed {
        #[serde(rename = "failedStage")]
        failed_stage: StageName,
    },
}

impl RunState {
    pub fn stage(&self) -> Stage {
        match self {
            RunState::Idle => Stage::Idle,
            RunState::Extracting => Stage::Extracting,
            RunState::Analyzing => Stage::Analyzing,
            RunState::Enriching { .. } => Stage::Enriching,
            RunState::Done { .. } => Stage::Done,
            RunState::Failed { .. } => Stage::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: Uuid,
    pub generation: u64,
    pub input: ProductInput,
    pub preferences: Preferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedProduct>,
    #[serde(flatten)]
    pub state: RunState,
    pub errors: BTreeMap<StageName, ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(input: ProductInput, preferences: Preferences, generation: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            generation,
            input,
            preferences,
            extracted: None,
            state: RunState::Idle,
            errors: BTreeMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_terminal()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match &self.state {
            RunState::Enriching { analysis } | RunState::Done { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    pub fn insights(&self) -> Option<&InsightsResult> {
        match &self.state {
            RunState::Done { insights, .. } => insights.as_ref(),
            _ => None,
        }
    }

    pub fn alternatives(&self) -> Option<&AlternativesResult> {
        match &self.state {
            RunState::Done { alternatives, .. } => alternatives.as_ref(),
            _ => None,
        }
    }

    /// Name inferred during extraction, if any.
    pub fn product_name(&self) -> Option<&str> {
        self.extracted.as_ref().and_then(|p| p.product_name.as_deref())
    }

    fn transition(&mut self, next: RunState) {
        let (from, to) = (self.stage(), next.stage());
        debug_assert!(from.can_transition(to), "illegal transition {from:?} -> {to:?}");
        debug!(run = %self.id, ?from, ?to, "run transition");
        self.state = next;
        self.updated_at = Utc::now();
    }

    fn record_error(&mut self, stage: StageName, err: &StageError) {
        warn!(run = %self.id, %stage, error = %err, "❌ stage failed");
        self.errors.insert(stage, ErrorInfo::from(err));
    }

    fn fail(&mut self, stage: StageName, err: &StageError) {
        self.record_error(stage, err);
        self.transition(RunState::Failed { failed_stage: stage });
    }
}

/// Drive `run` to a terminal state. `commit` is called after every
/// transition; when it returns false the run has been superseded and
/// execution stops. Returns the terminal run, or `None` if superseded.
pub async fn execute<F>(stages: &Stages, mut run: PipelineRun, mut commit: F) -> Option<PipelineRun>
where
    F: FnMut(&PipelineRun) -> bool,
{
    let description = match run.input.clone() {
        ProductInput::Url { source_url } => {
            run.transition(RunState::Extracting);
            if !commit(&run) {
                return None;
            }
            match stages.extract(&source_url).await {
                Ok(product) => {
                    let description =
                        truncate_chars(&product.product_description, DESCRIPTION_MAX_CHARS).to_string();
                    run.extracted = Some(product);
                    description
                }
                Err(e) => {
                    run.fail(StageName::Extraction, &e);
                    commit(&run);
                    return Some(run);
                }
            }
        }
        ProductInput::Description { description, .. } => description,
    };

    run.transition(RunState::Analyzing);
    if !commit(&run) {
        return None;
    }
    let image = run.input.image().cloned();
    let analysis = match stages.analyze(&description, image.as_ref()).await {
        Ok(analysis) => analysis,
        Err(e) => {
            run.fail(StageName::Analysis, &e);
            commit(&run);
            return Some(run);
        }
    };

    run.transition(RunState::Enriching { analysis: analysis.clone() });
    if !commit(&run) {
        return None;
    }
    let preferences = run.preferences.clone();
    let enrichment = EnrichmentInput { original_query: &description, analysis: &analysis, preferences: &preferences };
    let (insights, alternatives) = tokio::join!(stages.insights(enrichment), stages.alternatives(enrichment));

    let insights = insights.map_err(|e| run.record_error(StageName::Insights, &e)).ok();
    let alternatives = alternatives.map_err(|e| run.record_error(StageName::Alternatives, &e)).ok();
    run.transition(RunState::Done { analysis, insights, alternatives });
    if !commit(&run) {
        return None;
    }
    info!(run = %run.id, errors = run.errors.len(), "🏁 Pipeline run finished");
    Some(run)
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    run: Option<PipelineRun>,
    task: Option<JoinHandle<()>>,
}

/// Holder of the latest run for one product position.
#[derive(Clone, Default)]
pub struct Slot {
    inner: Arc<RwLock<SlotState>>,
}

impl Slot {
    pub fn current(&self) -> Option<PipelineRun> {
        self.inner.read().run.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Start a new generation: prior results are discarded and any
    /// in-flight task is aborted.
    fn begin(&self, input: ProductInput, preferences: Preferences) -> PipelineRun {
        let mut state = self.inner.write();
        state.generation += 1;
        if let Some(task) = state.task.take() {
            info!(generation = state.generation - 1, "superseding in-flight run");
            task.abort();
        }
        let run = PipelineRun::new(input, preferences, state.generation);
        state.run = Some(run.clone());
        run
    }

    /// Store `run` if it still belongs to the current generation.
    pub fn commit(&self, run: &PipelineRun) -> bool {
        let mut state = self.inner.write();
        if state.generation != run.generation {
            debug!(stale = run.generation, current = state.generation, "dropping superseded run update");
            return false;
        }
        state.run = Some(run.clone());
        true
    }

    /// Abort the in-flight task, if any. Writes that slip through are dropped.
    pub fn cancel(&self) {
        let mut state = self.inner.write();
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    fn attach(&self, generation: u64, task: JoinHandle<()>) {
        let mut state = self.inner.write();
        if state.generation == generation {
            state.task = Some(task);
        } else {
            task.abort();
        }
    }
}

/// Runs the pipeline for a single slot.
#[derive(Clone)]
pub struct Orchestrator {
    stages: Stages,
    slot: Slot,
}

impl Orchestrator {
    pub fn new(stages: Stages) -> Self {
        Self { stages, slot: Slot::default() }
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn current(&self) -> Option<PipelineRun> {
        self.slot.current()
    }

    /// Submit input and return the stream of run snapshots, ending with a
    /// `Done` or `Failed` snapshot. Supersedes any in-flight run on this
    /// slot; a superseded run's stream ends early. The run keeps going if
    /// the stream is dropped.
    pub fn run(&self, input: ProductInput, preferences: Preferences) -> UnboundedReceiverStream<PipelineRun> {
        let (tx, rx) = mpsc::unbounded_channel();
        let run = self.slot.begin(input, preferences);
        let generation = run.generation;
        info!(run = %run.id, generation, from_url = run.input.is_url(), "🚀 Starting pipeline run");
        let _ = tx.send(run.clone());

        let stages = self.stages.clone();
        let slot = self.slot.clone();
        let task = tokio::spawn(async move {
            let commit = |snapshot: &PipelineRun| {
                if !slot.commit(snapshot) {
                    return false;
                }
                let _ = tx.send(snapshot.clone());
                true
            };
            execute(&stages, run, commit).await;
        });
        self.slot.attach(generation, task);
        UnboundedReceiverStream::new(rx)
    }

    /// Submit and wait for the terminal snapshot. `None` when superseded.
    pub async fn run_to_end(&self, input: ProductInput, preferences: Preferences) -> Option<PipelineRun> {
        let mut stream = self.run(input, preferences);
        let mut last = None;
        while let Some(snapshot) = stream.next().await {
            last = Some(snapshot);
        }
        last.filter(PipelineRun::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductInput;
    use pretty_assertions::assert_eq;

    fn input(text: &str) -> ProductInput {
        ProductInput::describe(text, None).unwrap()
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        assert!(Stage::Idle.can_transition(Stage::Extracting));
        assert!(Stage::Idle.can_transition(Stage::Analyzing));
        assert!(Stage::Extracting.can_transition(Stage::Failed));
        assert!(Stage::Enriching.can_transition(Stage::Done));
        assert!(!Stage::Enriching.can_transition(Stage::Failed));
        assert!(!Stage::Idle.can_transition(Stage::Enriching));
        assert!(Stage::Done.allowed_transitions().is_empty());
    }

    #[test]
    fn stale_generation_cannot_overwrite_slot() {
        let slot = Slot::default();
        let mut stale = slot.begin(input("first product description"), Preferences::new());
        let fresh = slot.begin(input("second product description"), Preferences::new());
        assert_eq!(slot.generation(), 2);

        stale.state = RunState::Failed { failed_stage: StageName::Analysis };
        assert!(!slot.commit(&stale));
        assert_eq!(slot.current().unwrap().id, fresh.id);
        assert_eq!(slot.current().unwrap().stage(), Stage::Idle);

        assert!(slot.commit(&fresh));
    }

    #[test]
    fn new_submission_discards_prior_results() {
        let slot = Slot::default();
        let mut first = slot.begin(input("first product description"), Preferences::new());
        first.state = RunState::Failed { failed_stage: StageName::Analysis };
        assert!(slot.commit(&first));

        let second = slot.begin(input("second product description"), Preferences::new());
        let current = slot.current().unwrap();
        assert_eq!(current.id, second.id);
        assert!(current.errors.is_empty());
        assert_eq!(current.stage(), Stage::Idle);
    }

    #[test]
    fn run_serializes_stage_inline() {
        let run = PipelineRun::new(input("a glass jar of honey"), Preferences::new(), 1);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["stage"], "Idle");
        assert_eq!(json["generation"], 1);
        assert_eq!(json["input"]["source"], "description");
    }
}
