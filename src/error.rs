use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;
use crate::contract::ValidationError;

/// The four model-backed stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageName {
    Extraction,
    Analysis,
    Insights,
    Alternatives,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Extraction => "extraction",
            StageName::Analysis => "analysis",
            StageName::Insights => "insights",
            StageName::Alternatives => "alternatives",
        }
    }

    /// Extraction and Analysis failures end the run; enrichment failures do not.
    pub fn is_fatal(self) -> bool {
        matches!(self, StageName::Extraction | StageName::Analysis)
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageErrorKind {
    ExtractionFailed,
    AnalysisFailed,
    InsightsFailed,
    AlternativesFailed,
    ImageProcessingFailed,
}

impl StageErrorKind {
    pub fn for_stage(stage: StageName) -> Self {
        match stage {
            StageName::Extraction => StageErrorKind::ExtractionFailed,
            StageName::Analysis => StageErrorKind::AnalysisFailed,
            StageName::Insights => StageErrorKind::InsightsFailed,
            StageName::Alternatives => StageErrorKind::AlternativesFailed,
        }
    }

    /// Text shown to the user. Never includes model output or backend detail.
    pub fn user_message(self) -> &'static str {
        match self {
            StageErrorKind::ExtractionFailed => {
                "Could not extract product information from the URL. Please try again or describe the product instead."
            }
            StageErrorKind::AnalysisFailed => "Could not analyze the product. Please try again.",
            StageErrorKind::InsightsFailed => "Could not generate product insights. Please try again.",
            StageErrorKind::AlternativesFailed => {
                "Could not generate sustainable alternatives. Please try again."
            }
            StageErrorKind::ImageProcessingFailed => {
                "Could not process the uploaded image. Please try again or proceed without an image."
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    #[error("model backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("malformed model output: {0}")]
    Validation(#[from] ValidationError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid stage input: {0}")]
    InvalidInput(String),
    #[error("model returned no usable content")]
    EmptyResult,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {cause}")]
pub struct StageError {
    pub kind: StageErrorKind,
    pub cause: FailureCause,
}

impl StageError {
    pub fn new(stage: StageName, cause: impl Into<FailureCause>) -> Self {
        Self { kind: StageErrorKind::for_stage(stage), cause: cause.into() }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, FailureCause::Timeout(_))
    }
}

/// What a run records about a failed stage. Safe to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: StageErrorKind,
    pub message: String,
    pub timed_out: bool,
}

impl From<&StageError> for ErrorInfo {
    fn from(err: &StageError) -> Self {
        Self {
            kind: err.kind,
            message: err.user_message().to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image must be a base64 data URI")]
    NotDataUri,
    #[error("unsupported image type `{0}` (accepted: jpeg, jpg, png, webp)")]
    UnsupportedType(String),
    #[error("image is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("image payload could not be decoded: {0}")]
    Decode(String),
    #[error("payload is not a recognizable image")]
    NotAnImage,
}

/// Rejected user submissions. Raised before any pipeline run exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("product description must be between {min} and {max} characters (got {actual})")]
    DescriptionLength { min: usize, max: usize, actual: usize },
    #[error("provide either a product description or a product URL")]
    MissingSource,
    #[error("provide a product description or a product URL, not both")]
    AmbiguousSource,
    #[error("an image can only accompany a product description")]
    ImageWithoutDescription,
    #[error("invalid product URL: {0}")]
    InvalidUrl(String),
    #[error("unknown sustainability preference `{0}`")]
    UnknownPreference(String),
    #[error("feedback must be between {min} and {max} characters")]
    FeedbackLength { min: usize, max: usize },
    #[error("image processing failed: {0}")]
    Image(#[from] ImageError),
}

impl InputError {
    pub fn stage_kind(&self) -> Option<StageErrorKind> {
        match self {
            InputError::Image(_) => Some(StageErrorKind::ImageProcessingFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no analysis available to export")]
    NoAnalysis,
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}
