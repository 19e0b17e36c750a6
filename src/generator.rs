use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::time::Duration;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, info, warn};

use crate::angles::Angle;
use crate::campaign::CampaignParams;
use crate::candidate::{Candidate, CopyDraft};
use crate::constraint::{Constraint, CopyField};
use crate::error::{FaultKind, GenerationFault, Stage, StageFault};
use crate::providers::{CopyGenerator, GenerationRequest, RawCandidateText};
use crate::semantics::SemanticContext;
use crate::settings::GenerationSettings;

const PROMPT_TEMPLATE: &str = include_str!("prompts/generate_copy.tera");

/// Everything the prompt is built from, borrowed for one job.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub context: &'a SemanticContext,
    pub params: &'a CampaignParams,
    pub constraint: &'a Constraint,
    /// Text recognized on the source image, one line per zone.
    pub source_lines: &'a [String],
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub candidates: Vec<Candidate>,
    pub faults: Vec<StageFault>,
    pub angles_attempted: usize,
}

pub fn render_prompt(inputs: &PromptInputs<'_>, angle: Angle, n: usize, strict: bool) -> Result<String> {
    let mut context = TeraContext::new();
    let params = inputs.params;
    let product = if params.product_name.is_empty() {
        "the product shown in the image"
    } else {
        params.product_name.as_str()
    };
    context.insert("n", &n.max(1));
    context.insert("product", product);
    context.insert("angle", angle.id());
    context.insert("directive", angle.directive());
    context.insert("category", inputs.context.product_category());
    context.insert("intent", inputs.context.intent().as_str());
    context.insert("tones", &or_fallback(inputs.context.dominant_tones().join(", "), "neutral"));
    context.insert("persona", params.persona.as_deref().unwrap_or("general audience"));
    context.insert("platform", params.platform.as_deref().unwrap_or("any"));
    context.insert("locale", inputs.constraint.locale());
    let voice = params
        .brand_voice
        .as_ref()
        .map(|voice| voice.description.clone())
        .unwrap_or_default();
    context.insert("brand_voice", &or_fallback(voice, "none"));
    let source_text = inputs
        .source_lines
        .iter()
        .map(|line| format!("- {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    context.insert("source_text", &or_fallback(source_text, "- (none)"));
    context.insert("cap_headline", &inputs.constraint.max_chars(CopyField::Headline));
    context.insert("cap_subhead", &inputs.constraint.max_chars(CopyField::Subhead));
    context.insert("cap_cta", &inputs.constraint.max_chars(CopyField::Cta));
    context.insert("cap_legal", &inputs.constraint.max_chars(CopyField::Legal));
    context.insert("must_include", &join_terms(inputs.constraint.must_include().iter()));
    context.insert("banned", &join_terms(inputs.constraint.banned_words().iter()));
    let ctas = params
        .brand_voice
        .as_ref()
        .map(|voice| voice.allowed_ctas.join(", "))
        .unwrap_or_default();
    context.insert("ctas", &or_fallback(ctas, "any"));
    context.insert("strict", &strict);

    let rendered = Tera::one_off(PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render generation prompt")?;
    Ok(rendered.trim_end().to_string())
}

/// Runs every angle concurrently and collects candidates in angle order.
/// A failing angle is recorded as a fault and skipped.
pub async fn generate_candidates(
    generator: &dyn CopyGenerator,
    inputs: &PromptInputs<'_>,
    settings: &GenerationSettings,
) -> GenerationOutcome {
    let n = settings.candidates_per_angle.max(1);
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    let runs = Angle::ALL.iter().map(|angle| {
        run_angle(
            generator,
            inputs,
            *angle,
            n,
            angle.temperature(settings.base_temperature),
            timeout,
        )
    });
    let results = join_all(runs).await;

    let mut outcome = GenerationOutcome {
        angles_attempted: Angle::ALL.len(),
        ..GenerationOutcome::default()
    };
    for (angle, result) in Angle::ALL.iter().zip(results) {
        match result {
            Ok(drafts) => {
                debug!("generate: {} produced {} candidates", angle, drafts.len());
                for draft in drafts {
                    let id = outcome.candidates.len();
                    outcome.candidates.push(Candidate::new(id, *angle, draft));
                }
            }
            Err(fault) => {
                warn!("generate: skipping angle {}: {}", angle, fault.message);
                outcome.faults.push(fault);
            }
        }
    }
    info!(
        "generate: {} candidates from {} of {} angles",
        outcome.candidates.len(),
        outcome.angles_attempted - outcome.faults.len(),
        outcome.angles_attempted
    );
    outcome
}

async fn run_angle(
    generator: &dyn CopyGenerator,
    inputs: &PromptInputs<'_>,
    angle: Angle,
    n: usize,
    temperature: f32,
    timeout: Duration,
) -> Result<Vec<CopyDraft>, StageFault> {
    let internal = |err: anyhow::Error| {
        StageFault::new(Stage::Generate, angle.id(), FaultKind::Internal, format!("{:#}", err))
    };
    let prompt = render_prompt(inputs, angle, n, false).map_err(internal)?;
    let mut request = GenerationRequest {
        angle,
        prompt,
        temperature,
        n,
    };

    let first = match attempt(generator, &request, timeout).await {
        Ok(drafts) => return Ok(drafts),
        Err(fault) => fault,
    };
    debug!("generate: retrying {} after {}", angle, first);
    if matches!(first, GenerationFault::Malformed(_)) {
        request.prompt = render_prompt(inputs, angle, n, true).map_err(internal)?;
    }

    attempt(generator, &request, timeout).await.map_err(|fault| {
        StageFault::new(Stage::Generate, angle.id(), fault.kind(), fault.to_string())
    })
}

async fn attempt(
    generator: &dyn CopyGenerator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<Vec<CopyDraft>, GenerationFault> {
    let raw = match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(result) => result?,
        Err(_) => return Err(GenerationFault::Timeout),
    };
    let drafts = parse_batch(&raw, request.n);
    if drafts.is_empty() {
        return Err(GenerationFault::Malformed(format!(
            "no parseable candidate in a batch of {}",
            raw.len()
        )));
    }
    Ok(drafts)
}

/// Items that fail to parse are dropped; a batch only counts as malformed
/// when nothing in it parses.
pub(crate) fn parse_batch(raw: &[RawCandidateText], limit: usize) -> Vec<CopyDraft> {
    let mut drafts = Vec::new();
    for item in raw {
        let body = strip_code_fence(&item.text);
        if let Ok(draft) = serde_json::from_str::<CopyDraft>(body) {
            drafts.push(draft);
        } else if let Ok(batch) = serde_json::from_str::<Vec<CopyDraft>>(body) {
            drafts.extend(batch);
        }
    }
    drafts.retain(|draft| !draft.headline.trim().is_empty());
    drafts.truncate(limit);
    drafts
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim()
}

fn or_fallback(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn join_terms<'a>(terms: impl Iterator<Item = &'a String>) -> String {
    let joined = terms.map(String::as_str).collect::<Vec<_>>().join(", ");
    or_fallback(joined, "none")
}
