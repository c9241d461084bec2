//! Model-backed pipeline stages.
//!
//! Each stage builds a typed request, invokes the backend under the shared
//! timeout and returns a contract-validated result or a [`StageError`]
//! tagged with the stage that failed.
//!
//! [`StageError`]: crate::error::StageError

use std::sync::Arc;
use std::time::Duration;

use crate::backend::ModelBackend;
use crate::contract::AnalysisResult;
use crate::models::Preferences;

pub mod alternatives;
pub mod analysis;
pub mod extraction;
pub mod insights;

pub use alternatives::AlternativesRequest;
pub use analysis::AnalysisRequest;
pub use extraction::ExtractRequest;
pub use insights::InsightsRequest;

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Stages {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
}

impl Stages {
    pub fn new(backend: Arc<dyn ModelBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// What both enrichment stages consume.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentInput<'a> {
    /// The description that was actually analyzed.
    pub original_query: &'a str,
    pub analysis: &'a AnalysisResult,
    pub preferences: &'a Preferences,
}
