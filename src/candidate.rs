use serde::{Deserialize, Serialize};

use crate::angles::Angle;
use crate::constraint::CopyField;
use crate::error::{PipelineFault, Stage};

pub const NEUTRAL_SCORE: f64 = 0.5;

/// Shape the generator is asked to return for every candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyDraft {
    pub headline: String,
    #[serde(default)]
    pub subhead: String,
    #[serde(default)]
    pub cta: String,
    #[serde(default)]
    pub legal: String,
}

/// Fixed-shape score record; every field is always populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub readability: f64,
    pub policy: f64,
    pub brand_voice: f64,
    pub cta_validity: f64,
    pub style: f64,
    pub must_include: f64,
    pub composite: f64,
}

impl ScoreRecord {
    pub fn neutral() -> Self {
        Self {
            readability: NEUTRAL_SCORE,
            policy: NEUTRAL_SCORE,
            brand_voice: NEUTRAL_SCORE,
            cta_validity: NEUTRAL_SCORE,
            style: NEUTRAL_SCORE,
            must_include: NEUTRAL_SCORE,
            composite: NEUTRAL_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    BelowThreshold { composite: f64, threshold: f64 },
    MissingRequiredTerms { terms: Vec<String> },
    PolicyViolation { words: Vec<String> },
    NearDuplicate { of: usize, similarity: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Accepted,
    Rejected { reason: RejectReason },
}

impl CandidateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CandidateStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    id: usize,
    angle: Angle,
    headline: String,
    subhead: String,
    cta: String,
    legal: String,
    scores: ScoreRecord,
    status: CandidateStatus,
    warnings: Vec<String>,
}

impl Candidate {
    pub(crate) fn new(id: usize, angle: Angle, draft: CopyDraft) -> Self {
        Self {
            id,
            angle,
            headline: draft.headline.trim().to_string(),
            subhead: draft.subhead.trim().to_string(),
            cta: draft.cta.trim().to_string(),
            legal: draft.legal.trim().to_string(),
            scores: ScoreRecord::neutral(),
            status: CandidateStatus::Pending,
            warnings: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn angle(&self) -> Angle {
        self.angle
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn subhead(&self) -> &str {
        &self.subhead
    }

    pub fn cta(&self) -> &str {
        &self.cta
    }

    pub fn legal(&self) -> &str {
        &self.legal
    }

    pub fn field(&self, field: CopyField) -> &str {
        match field {
            CopyField::Headline => &self.headline,
            CopyField::Subhead => &self.subhead,
            CopyField::Cta => &self.cta,
            CopyField::Legal => &self.legal,
        }
    }

    /// Non-empty fields joined in reading order.
    pub fn full_text(&self) -> String {
        CopyField::ALL
            .iter()
            .map(|field| self.field(*field))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn scores(&self) -> &ScoreRecord {
        &self.scores
    }

    pub fn status(&self) -> &CandidateStatus {
        &self.status
    }

    pub fn is_accepted(&self) -> bool {
        self.status == CandidateStatus::Accepted
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn set_scores(&mut self, scores: ScoreRecord) -> Result<(), PipelineFault> {
        self.ensure_pending(Stage::Validate, "rescore")?;
        self.scores = scores;
        Ok(())
    }

    pub(crate) fn accept(&mut self, stage: Stage) -> Result<(), PipelineFault> {
        self.ensure_pending(stage, "accept")?;
        self.status = CandidateStatus::Accepted;
        Ok(())
    }

    pub(crate) fn reject(&mut self, stage: Stage, reason: RejectReason) -> Result<(), PipelineFault> {
        self.ensure_pending(stage, "reject")?;
        self.status = CandidateStatus::Rejected { reason };
        Ok(())
    }

    pub(crate) fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    fn ensure_pending(&self, stage: Stage, action: &str) -> Result<(), PipelineFault> {
        if self.status.is_terminal() {
            return Err(PipelineFault::invariant(
                stage,
                format!("cannot {} candidate {} in terminal state", action, self.id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    fn draft() -> CopyDraft {
        CopyDraft {
            headline: " Evenings, softened ".to_string(),
            subhead: String::new(),
            cta: "Find yours".to_string(),
            legal: String::new(),
        }
    }

    #[test]
    fn terminal_states_are_final() {
        let mut candidate = Candidate::new(3, Angle::Curiosity, draft());
        assert_eq!(candidate.headline(), "Evenings, softened");
        assert_eq!(candidate.full_text(), "Evenings, softened\nFind yours");

        candidate.accept(Stage::Validate).expect("accept");
        let err = candidate
            .reject(
                Stage::Validate,
                RejectReason::PolicyViolation {
                    words: vec!["cheap".to_string()],
                },
            )
            .unwrap_err();
        assert_eq!(err.kind_str(), "internal_invariant_violation");
        assert!(candidate.set_scores(ScoreRecord::neutral()).is_err());
        assert!(candidate.is_accepted());

        assert!(candidate.accept(Stage::Diversity).is_err());
        assert_eq!(candidate.status(), &CandidateStatus::Accepted);
    }

    #[test]
    fn draft_requires_headline_only() {
        let parsed: CopyDraft = serde_json::from_str(r#"{"headline":"Hi"}"#).expect("draft");
        assert_eq!(parsed.cta, "");
        assert!(serde_json::from_str::<CopyDraft>(r#"{"cta":"Buy"}"#).is_err());
    }

    #[test]
    fn neutral_record_shape() {
        assert_json_snapshot!(ScoreRecord::neutral(), @r###"
        {
          "readability": 0.5,
          "policy": 0.5,
          "brand_voice": 0.5,
          "cta_validity": 0.5,
          "style": 0.5,
          "must_include": 0.5,
          "composite": 0.5
        }
        "###);
    }

    #[test]
    fn rejection_serializes_with_kind_tag() {
        let status = CandidateStatus::Rejected {
            reason: RejectReason::MissingRequiredTerms {
                terms: vec!["warranty".to_string()],
            },
        };
        assert_eq!(
            serde_json::to_value(&status).expect("json"),
            serde_json::json!({
                "state": "rejected",
                "reason": {"kind": "missing_required_terms", "terms": ["warranty"]}
            })
        );
    }
}
