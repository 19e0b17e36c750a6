use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::campaign::CampaignParams;
use crate::candidate::Candidate;
use crate::constraint::{Constraint, RiskMode};
use crate::diversity::DiversityFilter;
use crate::error::{FaultKind, PipelineFault, Stage, StageFault};
use crate::generator::{generate_candidates, PromptInputs};
use crate::guardrails::GuardrailValidator;
use crate::ocr::{extract_regions, fuse_spans, preflight, PipelineImage, RecognitionEngine};
use crate::placement::{simulate_placement, PlacementPlan};
use crate::providers::{CopyGenerator, Embedder};
use crate::ranker::rank_candidates;
use crate::semantics::{extract_semantics, SemanticContext};
use crate::settings::Settings;
use crate::zones::{classify_zones, Zone, ZoneRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantResult {
    pub candidate: Candidate,
    pub final_score: f64,
    pub rank: usize,
    pub placement: PlacementPlan,
}

/// Everything a successful run produces. `variants` is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub variants: Vec<VariantResult>,
    pub candidates: Vec<Candidate>,
    pub zones: Vec<Zone>,
    pub context: SemanticContext,
    pub faults: Vec<StageFault>,
    pub warnings: Vec<String>,
}

/// One job: image in, ranked and placed copy variants out.
#[derive(Clone)]
pub struct Pipeline {
    engines: Vec<Arc<dyn RecognitionEngine>>,
    generator: Arc<dyn CopyGenerator>,
    embedder: Arc<dyn Embedder>,
    settings: Settings,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn CopyGenerator>,
        embedder: Arc<dyn Embedder>,
        settings: Settings,
    ) -> Self {
        Self {
            engines: Vec::new(),
            generator,
            embedder,
            settings,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn RecognitionEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(
        &self,
        image: &PipelineImage,
        params: &CampaignParams,
        constraint: Arc<Constraint>,
    ) -> Result<PipelineOutput, PipelineFault> {
        let mut faults = Vec::new();
        let (params, mut warnings) = params.normalized(
            &self.settings.semantics,
            self.settings.ranking.default_variants,
        );

        if !image.bytes().is_empty() {
            let report = preflight(image.bytes());
            debug!(
                "precheck: {}x{} contrast {:.2} busy {:.2}",
                report.width, report.height, report.contrast, report.busy_score
            );
            warnings.extend(report.warnings);
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        let timeout = Duration::from_secs(self.settings.recognition.timeout_secs.max(1));
        let extraction = extract_regions(&self.engines, image, timeout).await;
        faults.extend(extraction.faults);

        let fused = fuse_spans(&extraction.spans, constraint.locale(), &self.settings.fusion);
        info!(
            "fusion: {} spans from {} engine reports",
            fused.len(),
            extraction.spans.len()
        );
        if fused.is_empty() {
            let fault = StageFault::new(
                Stage::Fusion,
                "fusion",
                FaultKind::NoTextDetected,
                "no text detected in image",
            );
            warn!("{}", fault);
            faults.push(fault);
        }
        let no_evidence = fused.is_empty() && params.product_name.is_empty();

        let zones = classify_zones(&fused, image.height(), &self.settings.zones);
        let headlines = zones
            .iter()
            .filter(|zone| zone.role == ZoneRole::Headline)
            .count();
        if headlines > 1 {
            return Err(PipelineFault::invariant(
                Stage::Classify,
                format!("{} headline zones emitted", headlines),
            ));
        }

        let context = extract_semantics(&zones, &params, &constraint, &self.settings.semantics);
        info!(
            "semantics: intent {} category {}",
            context.intent().as_str(),
            context.product_category()
        );

        let source_lines = zones.iter().map(|zone| zone.text.clone()).collect::<Vec<_>>();
        let inputs = PromptInputs {
            context: &context,
            params: &params,
            constraint: &constraint,
            source_lines: &source_lines,
        };
        let generation =
            generate_candidates(self.generator.as_ref(), &inputs, &self.settings.generation).await;
        let attempted = generation.angles_attempted;
        faults.extend(generation.faults);
        let mut candidates = generation.candidates;

        GuardrailValidator::new(
            &constraint,
            &self.settings,
            self.embedder.as_ref(),
            params.brand_voice.as_ref(),
        )
        .validate(&mut candidates)?;
        DiversityFilter::new(self.embedder.as_ref(), self.settings.diversity.threshold)
            .filter(&mut candidates)?;

        let accepted = candidates
            .iter()
            .filter(|candidate| candidate.is_accepted())
            .count();
        info!(
            "validate: {} of {} candidates accepted",
            accepted,
            candidates.len()
        );
        if accepted == 0 {
            if no_evidence {
                return Err(PipelineFault::NoTextDetected { faults });
            }
            return Err(PipelineFault::AllAnglesFailed { attempted, faults });
        }

        let selections = rank_candidates(&candidates, params.variant_count());
        if selections.is_empty() {
            return Err(PipelineFault::invariant(
                Stage::Rank,
                "accepted candidates produced an empty selection",
            ));
        }

        let mut variants = Vec::with_capacity(selections.len());
        for selection in selections {
            let Some(candidate) = candidates
                .iter()
                .find(|candidate| candidate.id() == selection.candidate_id)
            else {
                return Err(PipelineFault::invariant(
                    Stage::Rank,
                    format!("selected unknown candidate {}", selection.candidate_id),
                ));
            };
            ensure_meets_threshold(candidate, &constraint)?;
            let placement = simulate_placement(
                candidate,
                &zones,
                image.width(),
                image.height(),
                &self.settings.placement,
            );
            if !placement.fits() {
                debug!("place: candidate {} overflows its safe area", candidate.id());
            }
            variants.push(VariantResult {
                candidate: candidate.clone(),
                final_score: selection.final_score,
                rank: selection.rank,
                placement,
            });
        }
        info!("rank: {} variants selected", variants.len());

        Ok(PipelineOutput {
            variants,
            candidates,
            zones,
            context,
            faults,
            warnings,
        })
    }
}

/// Lenient runs may report a composite lowered by missing required terms
/// below the threshold; every other selection must clear it.
fn ensure_meets_threshold(candidate: &Candidate, constraint: &Constraint) -> Result<(), PipelineFault> {
    let scores = candidate.scores();
    let threshold = constraint.risk_mode().threshold();
    let must_include_override = constraint.risk_mode() == RiskMode::Lenient
        && !constraint.must_include().is_empty()
        && scores.must_include < 1.0;
    if scores.composite >= threshold || must_include_override {
        return Ok(());
    }
    Err(PipelineFault::invariant(
        Stage::Rank,
        format!(
            "candidate {} composite {:.3} is below threshold {:.2}",
            candidate.id(),
            scores.composite,
            threshold
        ),
    ))
}

/// Runs one job with default settings.
pub async fn run_pipeline(
    engines: Vec<Arc<dyn RecognitionEngine>>,
    generator: Arc<dyn CopyGenerator>,
    embedder: Arc<dyn Embedder>,
    image: &PipelineImage,
    params: &CampaignParams,
    constraint: Arc<Constraint>,
) -> Result<PipelineOutput, PipelineFault> {
    let pipeline = engines.into_iter().fold(
        Pipeline::new(generator, embedder, Settings::default()),
        Pipeline::with_engine,
    );
    pipeline.run(image, params, constraint).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintSpec, CopyField};
    use crate::error::{EngineFault, GenerationFault};
    use crate::ocr::{BBoxPx, EngineFuture, TextSpan};
    use crate::providers::{GenerationFuture, GenerationRequest, HashingEmbedder, RawCandidateText};

    struct FixedEngine {
        spans: Vec<TextSpan>,
    }

    impl RecognitionEngine for FixedEngine {
        fn id(&self) -> &str {
            "fixed"
        }

        fn extract_text<'a>(&'a self, _image: &'a PipelineImage) -> EngineFuture<'a> {
            let spans = self.spans.clone();
            Box::pin(async move { Ok::<_, EngineFault>(spans) })
        }
    }

    /// Returns one distinct draft per angle.
    struct AngleGenerator;

    impl CopyGenerator for AngleGenerator {
        fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerationFuture<'a> {
            Box::pin(async move {
                let headline = match request.angle.id() {
                    "benefit_led" => "Warm light for long evenings",
                    "urgency" => "Last week of launch pricing",
                    "social_proof" => "Readers keep one by the bed",
                    "humor" => "Your ceiling light called, it is jealous",
                    "problem_solution" => "Harsh bulbs, meet gentle glass",
                    "curiosity" => "What changes when the lamp glows amber?",
                    "authority" => "Hand-blown by third-generation glassmakers",
                    _ => "Honest price, heirloom build",
                };
                Ok::<_, GenerationFault>(vec![RawCandidateText::new(
                    serde_json::json!({
                        "headline": headline,
                        "subhead": "",
                        "cta": "Shop now",
                        "legal": ""
                    })
                    .to_string(),
                )])
            })
        }
    }

    struct SilentGenerator;

    impl CopyGenerator for SilentGenerator {
        fn generate<'a>(&'a self, _request: &'a GenerationRequest) -> GenerationFuture<'a> {
            Box::pin(async {
                Err::<Vec<RawCandidateText>, _>(GenerationFault::Unavailable(
                    "service down".to_string(),
                ))
            })
        }
    }

    fn pipeline(spans: Vec<TextSpan>) -> Pipeline {
        Pipeline::new(
            Arc::new(AngleGenerator),
            Arc::new(HashingEmbedder::default()),
            Settings::default(),
        )
        .with_engine(Arc::new(FixedEngine { spans }))
    }

    fn constraint() -> Arc<Constraint> {
        Arc::new(Constraint::from_spec(ConstraintSpec::default()).expect("constraint"))
    }

    #[tokio::test]
    async fn blank_image_without_product_name_still_generates() {
        let output = pipeline(Vec::new())
            .run(
                &PipelineImage::from_dimensions(800, 800),
                &CampaignParams::default(),
                constraint(),
            )
            .await
            .expect("run");

        assert!(!output.variants.is_empty());
        assert_eq!(output.faults.len(), 1);
        assert_eq!(output.faults[0].kind, FaultKind::NoTextDetected);
        assert_eq!(output.context.intent().as_str(), "unknown");
        assert!(output
            .context
            .tone_axes()
            .values()
            .all(|score| (*score - 0.5).abs() < 1e-6));
    }

    #[tokio::test]
    async fn blank_image_and_silent_generator_is_no_text_detected() {
        let err = Pipeline::new(
            Arc::new(SilentGenerator),
            Arc::new(HashingEmbedder::default()),
            Settings::default(),
        )
        .with_engine(Arc::new(FixedEngine { spans: Vec::new() }))
        .run(
            &PipelineImage::from_dimensions(800, 800),
            &CampaignParams::default(),
            constraint(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind_str(), "no_text_detected");
        assert_eq!(err.faults()[0].kind, FaultKind::NoTextDetected);
        assert_eq!(
            err.faults()
                .iter()
                .filter(|fault| fault.stage == Stage::Generate)
                .count(),
            8
        );
    }

    #[tokio::test]
    async fn blank_image_with_product_name_still_yields_variants() {
        let params = CampaignParams {
            product_name: "Aurora Lamp".to_string(),
            n_variants: Some(4),
            ..CampaignParams::default()
        };
        let output = pipeline(Vec::new())
            .run(&PipelineImage::from_dimensions(800, 800), &params, constraint())
            .await
            .expect("run");

        assert_eq!(output.variants.len(), 4);
        assert_eq!(output.faults.len(), 1);
        assert_eq!(output.faults[0].stage, Stage::Fusion);
        let ranks = output.variants.iter().map(|variant| variant.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(output
            .variants
            .iter()
            .all(|variant| variant.placement.fields.contains_key(&CopyField::Headline)));
    }

    #[tokio::test]
    async fn recognized_text_flows_into_zones() {
        let spans = vec![
            TextSpan {
                engine_id: String::new(),
                text: "Aurora".to_string(),
                bbox: BBoxPx { x: 40, y: 60, w: 500, h: 90 },
                confidence: 0.9,
            },
            TextSpan {
                engine_id: String::new(),
                text: "Shop now".to_string(),
                bbox: BBoxPx { x: 300, y: 700, w: 200, h: 40 },
                confidence: 0.9,
            },
        ];
        let output = pipeline(spans)
            .run(
                &PipelineImage::from_dimensions(800, 800),
                &CampaignParams::default(),
                constraint(),
            )
            .await
            .expect("run");

        assert!(output.faults.is_empty());
        assert_eq!(output.zones.len(), 2);
        assert!(output.zones.iter().any(|zone| zone.role == ZoneRole::Cta));
        assert!(!output.variants.is_empty());
    }
}
