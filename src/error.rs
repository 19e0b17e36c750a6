use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Precheck,
    Extract,
    Fusion,
    Classify,
    Semantics,
    Generate,
    Validate,
    Diversity,
    Rank,
    Place,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Precheck => "precheck",
            Stage::Extract => "extract",
            Stage::Fusion => "fusion",
            Stage::Classify => "classify",
            Stage::Semantics => "semantics",
            Stage::Generate => "generate",
            Stage::Validate => "validate",
            Stage::Diversity => "diversity",
            Stage::Rank => "rank",
            Stage::Place => "place",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Timeout,
    Malformed,
    RateLimited,
    Unavailable,
    EngineFailed,
    NoTextDetected,
    Internal,
}

/// A recoverable fault scoped to one unit of work (an engine, an angle).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFault {
    pub stage: Stage,
    pub unit_id: String,
    pub kind: FaultKind,
    pub message: String,
}

impl StageFault {
    pub fn new(
        stage: Stage,
        unit_id: impl Into<String>,
        kind: FaultKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            unit_id: unit_id.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {:?}: {}",
            self.stage, self.unit_id, self.kind, self.message
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationFault {
    #[error("generation call timed out")]
    Timeout,
    #[error("malformed generation output: {0}")]
    Malformed(String),
    #[error("generation rate limited: {0}")]
    RateLimited(String),
    #[error("generation capability unavailable: {0}")]
    Unavailable(String),
}

impl GenerationFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            GenerationFault::Timeout => FaultKind::Timeout,
            GenerationFault::Malformed(_) => FaultKind::Malformed,
            GenerationFault::RateLimited(_) => FaultKind::RateLimited,
            GenerationFault::Unavailable(_) => FaultKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineFault {
    #[error("recognition engine timed out")]
    Timeout,
    #[error("recognition engine failed: {0}")]
    Failed(String),
}

impl EngineFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            EngineFault::Timeout => FaultKind::Timeout,
            EngineFault::Failed(_) => FaultKind::EngineFailed,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbedFault {
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("embedding failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoreFault {
    #[error(transparent)]
    Embed(#[from] EmbedFault),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("max_chars for {0} must be positive")]
    ZeroCap(&'static str),
    #[error("constraint locale is empty")]
    EmptyLocale,
    #[error("unknown risk mode '{0}' (expected lenient, standard or strict)")]
    UnknownRiskMode(String),
}

#[derive(Debug, Clone, Error)]
pub enum PipelineFault {
    #[error("no text detected and no product name to write about")]
    NoTextDetected { faults: Vec<StageFault> },
    #[error("all {attempted} angles failed to yield an accepted candidate")]
    AllAnglesFailed {
        attempted: usize,
        faults: Vec<StageFault>,
    },
    #[error("internal invariant violated in {stage}: {detail}")]
    InternalInvariantViolation { stage: Stage, detail: String },
}

impl PipelineFault {
    pub fn kind_str(&self) -> &'static str {
        match self {
            PipelineFault::NoTextDetected { .. } => "no_text_detected",
            PipelineFault::AllAnglesFailed { .. } => "all_angles_failed",
            PipelineFault::InternalInvariantViolation { .. } => "internal_invariant_violation",
        }
    }

    pub fn faults(&self) -> &[StageFault] {
        match self {
            PipelineFault::NoTextDetected { faults } => faults,
            PipelineFault::AllAnglesFailed { faults, .. } => faults,
            PipelineFault::InternalInvariantViolation { .. } => &[],
        }
    }

    pub(crate) fn invariant(stage: Stage, detail: impl Into<String>) -> Self {
        PipelineFault::InternalInvariantViolation {
            stage,
            detail: detail.into(),
        }
    }
}

/// Runs `f`, turning both returned errors and panics into a message.
pub(crate) fn contain<T, E, F>(f: F) -> Result<T, String>
where
    E: fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
