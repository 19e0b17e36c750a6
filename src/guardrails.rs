use tracing::{debug, warn};

use crate::campaign::BrandVoice;
use crate::candidate::{Candidate, RejectReason, ScoreRecord, NEUTRAL_SCORE};
use crate::constraint::{Constraint, CopyField, RiskMode};
use crate::error::{contain, PipelineFault, ScoreFault, Stage};
use crate::lexicon::{contains_cue, contains_term, normalize_text, word_count};
use crate::providers::{cosine_similarity, Embedder};
use crate::settings::{GuardrailSettings, Settings, ZoneSettings};
use crate::zones::is_call_to_action;

const NON_IMPERATIVE_CTA: f64 = 0.4;
const STYLE_HIT_PENALTY: f64 = 0.2;
const LONG_WORD_PENALTY: f64 = 0.5;
const LONG_SENTENCE_PENALTY: f64 = 0.2;

/// Scores candidates on independent axes and applies the risk-mode rules.
/// Candidates that pass stay pending for the diversity pass.
pub struct GuardrailValidator<'a> {
    constraint: &'a Constraint,
    settings: &'a GuardrailSettings,
    zones: &'a ZoneSettings,
    embedder: &'a dyn Embedder,
    reference: Option<Result<Vec<f32>, String>>,
    allowed_ctas: Vec<String>,
}

struct MustIncludeCheck {
    score: f64,
    missing: Vec<String>,
}

impl<'a> GuardrailValidator<'a> {
    pub fn new(
        constraint: &'a Constraint,
        settings: &'a Settings,
        embedder: &'a dyn Embedder,
        brand_voice: Option<&BrandVoice>,
    ) -> Self {
        let reference = brand_voice
            .and_then(BrandVoice::reference_text)
            .map(|text| contain(|| embedder.embed(&text)));
        let mut allowed_ctas = settings
            .guardrails
            .allowed_ctas
            .iter()
            .map(|cta| normalize_text(cta))
            .collect::<Vec<_>>();
        if let Some(voice) = brand_voice {
            allowed_ctas.extend(voice.allowed_ctas.iter().map(|cta| normalize_text(cta)));
        }
        Self {
            constraint,
            settings: &settings.guardrails,
            zones: &settings.zones,
            embedder,
            reference,
            allowed_ctas,
        }
    }

    pub fn validate(&self, candidates: &mut [Candidate]) -> Result<(), PipelineFault> {
        for candidate in candidates.iter_mut() {
            if candidate.status().is_terminal() {
                continue;
            }
            self.validate_one(candidate)?;
        }
        Ok(())
    }

    fn validate_one(&self, candidate: &mut Candidate) -> Result<(), PipelineFault> {
        let current: &Candidate = candidate;
        let mut faults = Vec::new();
        let mut guarded = |axis: &str, result: Result<f64, String>| match result {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(message) => {
                faults.push(format!("{} score unavailable: {}", axis, message));
                NEUTRAL_SCORE
            }
        };

        let readability = guarded("readability", contain(|| self.readability(current)));
        let policy_hits = contain(|| self.policy_hits(current));
        let policy = guarded(
            "policy",
            policy_hits
                .clone()
                .map(|hits| if hits.is_empty() { 1.0 } else { 0.0 }),
        );
        let brand_voice = guarded("brand_voice", contain(|| self.brand_voice(current)));
        let cta_validity = guarded("cta_validity", contain(|| self.cta_validity(current)));
        let style = guarded("style", contain(|| self.style(current)));
        let must_check = contain(|| self.must_include(current));
        let must_include = guarded(
            "must_include",
            must_check.as_ref().map(|check| check.score).map_err(Clone::clone),
        );

        let weights = &self.settings.weights;
        let weight_sum = weights.readability
            + weights.policy
            + weights.brand_voice
            + weights.cta_validity
            + weights.style;
        let base = if weight_sum > 0.0 {
            (weights.readability * readability
                + weights.policy * policy
                + weights.brand_voice * brand_voice
                + weights.cta_validity * cta_validity
                + weights.style * style)
                / weight_sum
        } else {
            NEUTRAL_SCORE
        };

        let risk_mode = self.constraint.risk_mode();
        let missing = must_check
            .as_ref()
            .map(|check| check.missing.clone())
            .unwrap_or_default();
        let term_count = self.constraint.must_include().len().max(1);
        let composite = if risk_mode == RiskMode::Lenient && !missing.is_empty() {
            let missing_fraction = missing.len() as f64 / term_count as f64;
            (base - self.settings.must_include_penalty * missing_fraction).max(0.0)
        } else {
            base
        };

        for fault in faults {
            warn!("validate: candidate {}: {}", candidate.id(), fault);
            candidate.add_warning(fault);
        }
        if risk_mode == RiskMode::Lenient && !missing.is_empty() {
            candidate.add_warning(format!("missing required terms: {}", missing.join(", ")));
        }

        candidate.set_scores(ScoreRecord {
            readability,
            policy,
            brand_voice,
            cta_validity,
            style,
            must_include,
            composite,
        })?;
        debug!(
            "validate: candidate {} composite {:.3} (base {:.3})",
            candidate.id(),
            composite,
            base
        );

        if risk_mode != RiskMode::Lenient {
            if !missing.is_empty() {
                return candidate.reject(
                    Stage::Validate,
                    RejectReason::MissingRequiredTerms { terms: missing },
                );
            }
            if let Ok(hits) = policy_hits {
                if !hits.is_empty() {
                    return candidate
                        .reject(Stage::Validate, RejectReason::PolicyViolation { words: hits });
                }
            }
        }
        let threshold = risk_mode.threshold();
        if base < threshold {
            return candidate.reject(
                Stage::Validate,
                RejectReason::BelowThreshold {
                    composite: base,
                    threshold,
                },
            );
        }
        Ok(())
    }

    /// Length against the field cap, less a penalty for long words and
    /// run-on sentences, averaged over the non-empty fields.
    fn readability(&self, candidate: &Candidate) -> Result<f64, ScoreFault> {
        let mut total = 0.0;
        let mut fields = 0usize;
        for field in CopyField::ALL {
            let text = candidate.field(field);
            if text.is_empty() {
                continue;
            }
            let cap = self.constraint.max_chars(field) as f64;
            let len = text.chars().count() as f64;
            let length_score = if len <= cap {
                1.0
            } else {
                (1.0 - (len - cap) / cap).max(0.0)
            };

            let words = text.split_whitespace().collect::<Vec<_>>();
            let long_words = words
                .iter()
                .filter(|word| {
                    word.chars().filter(|ch| ch.is_alphanumeric()).count()
                        > self.settings.max_word_chars
                })
                .count();
            let long_word_share = long_words as f64 / words.len().max(1) as f64;
            let run_on = text
                .split(['.', '!', '?'])
                .any(|sentence| word_count(sentence) > self.settings.max_sentence_words);
            let mut score = length_score - LONG_WORD_PENALTY * long_word_share;
            if run_on {
                score -= LONG_SENTENCE_PENALTY;
            }
            total += score.max(0.0);
            fields += 1;
        }
        if fields == 0 {
            return Err(ScoreFault::Invalid("candidate has no text".to_string()));
        }
        Ok(total / fields as f64)
    }

    fn policy_hits(&self, candidate: &Candidate) -> Result<Vec<String>, ScoreFault> {
        let text = candidate.full_text();
        Ok(self
            .constraint
            .banned_words()
            .iter()
            .filter(|word| contains_term(&text, word))
            .cloned()
            .collect())
    }

    fn brand_voice(&self, candidate: &Candidate) -> Result<f64, ScoreFault> {
        let Some(reference) = &self.reference else {
            return Ok(NEUTRAL_SCORE);
        };
        let reference = reference
            .as_ref()
            .map_err(|message| ScoreFault::Invalid(format!("reference embedding: {}", message)))?;
        let embedding = self.embedder.embed(&candidate.full_text())?;
        Ok(cosine_similarity(reference, &embedding) as f64)
    }

    fn cta_validity(&self, candidate: &Candidate) -> Result<f64, ScoreFault> {
        let cta = candidate.cta();
        if cta.trim().is_empty() {
            return Ok(NEUTRAL_SCORE);
        }
        let normalized = normalize_text(cta);
        if self.allowed_ctas.contains(&normalized) || is_call_to_action(cta, self.zones) {
            Ok(1.0)
        } else {
            Ok(NON_IMPERATIVE_CTA)
        }
    }

    fn style(&self, candidate: &Candidate) -> Result<f64, ScoreFault> {
        let text = candidate.full_text();
        let hits = self
            .settings
            .style_lexicon
            .iter()
            .filter(|phrase| contains_cue(&text, phrase))
            .count();
        Ok((1.0 - STYLE_HIT_PENALTY * hits as f64).max(0.0))
    }

    /// Terms count as present only in headline, subhead or legal.
    fn must_include(&self, candidate: &Candidate) -> Result<MustIncludeCheck, ScoreFault> {
        let terms = self.constraint.must_include();
        if terms.is_empty() {
            return Ok(MustIncludeCheck {
                score: NEUTRAL_SCORE,
                missing: Vec::new(),
            });
        }
        let searchable = [candidate.headline(), candidate.subhead(), candidate.legal()].join("\n");
        let missing = terms
            .iter()
            .filter(|term| !contains_term(&searchable, term))
            .cloned()
            .collect::<Vec<_>>();
        Ok(MustIncludeCheck {
            score: 1.0 - missing.len() as f64 / terms.len() as f64,
            missing,
        })
    }
}
