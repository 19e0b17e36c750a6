use std::sync::Arc;
use std::time::Duration;

use adcopy_pipeline::angles::Angle;
use adcopy_pipeline::candidate::{CandidateStatus, RejectReason};
use adcopy_pipeline::error::{EmbedFault, EngineFault, FaultKind, GenerationFault, Stage};
use adcopy_pipeline::ocr::{fuse_spans, BBoxPx, EngineFuture, RecognitionEngine, TextSpan};
use adcopy_pipeline::providers::{
    CopyGenerator, Embedder, GenerationFuture, GenerationRequest, HashingEmbedder, RawCandidateText,
};
use adcopy_pipeline::semantics::EntityKind;
use adcopy_pipeline::settings::{FusionSettings, Settings};
use adcopy_pipeline::zones::ZoneRole;
use adcopy_pipeline::{
    run_pipeline, BrandVoice, CampaignParams, Constraint, ConstraintSpec, Pipeline, PipelineImage,
};

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

/// One draft per angle; angles listed in `stalled` never answer in time and
/// angles in `failing` are unavailable.
struct ScriptedGenerator {
    stalled: Vec<Angle>,
    failing: Vec<Angle>,
    subhead: &'static str,
}

impl ScriptedGenerator {
    fn healthy() -> Self {
        Self {
            stalled: Vec::new(),
            failing: Vec::new(),
            subhead: "",
        }
    }
}

impl CopyGenerator for ScriptedGenerator {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerationFuture<'a> {
        Box::pin(async move {
            if self.stalled.contains(&request.angle) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.contains(&request.angle) {
                return Err(GenerationFault::Unavailable("service down".to_string()));
            }
            Ok(vec![RawCandidateText::new(
                serde_json::json!({
                    "headline": headline(request.angle),
                    "subhead": self.subhead,
                    "cta": "Shop now",
                    "legal": ""
                })
                .to_string(),
            )])
        })
    }
}

fn headline(angle: Angle) -> &'static str {
    match angle {
        Angle::BenefitLed => "Warm light for long evenings",
        Angle::Urgency => "Launch pricing ends Sunday",
        Angle::SocialProof => "Readers keep one by the bed",
        Angle::Humor => "Your ceiling light is jealous",
        Angle::ProblemSolution => "Harsh bulbs, meet gentle glass",
        Angle::Curiosity => "Why does amber feel calmer?",
        Angle::Authority => "Blown by master glassmakers",
        Angle::Value => "Honest price, heirloom build",
    }
}

/// Unit vector per angle headline, except Urgency which sits at cosine 0.92
/// from BenefitLed.
struct AngleEmbedder;

impl Embedder for AngleEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedFault> {
        let index = Angle::ALL
            .iter()
            .position(|angle| text.contains(headline(*angle)))
            .ok_or_else(|| EmbedFault::Failed(format!("unexpected text '{}'", text)))?;
        let mut vector = vec![0.0f32; Angle::ALL.len()];
        if Angle::ALL[index] == Angle::Urgency {
            vector[0] = 0.92;
            vector[1] = 0.39192;
        } else {
            vector[index] = 1.0;
        }
        Ok(vector)
    }
}

struct PanickingEmbedder;

impl Embedder for PanickingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedFault> {
        panic!("embedding backend exploded")
    }
}

fn span(text: &str, x: u32, y: u32, w: u32, h: u32, confidence: f32) -> TextSpan {
    TextSpan {
        engine_id: String::new(),
        text: text.to_string(),
        bbox: BBoxPx { x, y, w, h },
        confidence,
    }
}

fn creative_spans() -> Vec<TextSpan> {
    vec![
        span("Aurora Lamp", 80, 200, 640, 60, 0.92),
        span("Light that stays warm", 80, 290, 640, 36, 0.9),
        span("Shop now", 300, 680, 200, 40, 0.95),
    ]
}

fn constraint(risk_mode: &str, must_include: &[&str]) -> Arc<Constraint> {
    Arc::new(
        Constraint::from_spec(ConstraintSpec {
            must_include: must_include.iter().map(|term| term.to_string()).collect(),
            risk_mode: Some(risk_mode.to_string()),
            ..ConstraintSpec::default()
        })
        .unwrap(),
    )
}

fn params() -> CampaignParams {
    CampaignParams {
        product_name: "Aurora Lamp".to_string(),
        ..CampaignParams::default()
    }
}

fn image() -> PipelineImage {
    PipelineImage::from_dimensions(800, 800)
}

fn pipeline(generator: ScriptedGenerator, embedder: Arc<dyn Embedder>, settings: Settings) -> Pipeline {
    Pipeline::new(Arc::new(generator), embedder, settings).with_engine(Arc::new(FixedEngine {
        spans: creative_spans(),
    }))
}

#[tokio::test]
async fn timed_out_angles_are_skipped_and_recorded() {
    let mut settings = Settings::default();
    settings.generation.timeout_secs = 1;
    let stalled = vec![Angle::Humor, Angle::Curiosity, Angle::Value];
    let generator = ScriptedGenerator {
        stalled: stalled.clone(),
        ..ScriptedGenerator::healthy()
    };

    let output = pipeline(generator, Arc::new(HashingEmbedder::default()), settings)
        .run(&image(), &params(), constraint("standard", &[]))
        .await
        .unwrap();

    assert_eq!(output.variants.len(), 5);
    assert!(output
        .variants
        .iter()
        .all(|variant| !stalled.contains(&variant.candidate.angle())));
    assert_eq!(output.faults.len(), 3);
    for (fault, angle) in output.faults.iter().zip(&stalled) {
        assert_eq!(fault.stage, Stage::Generate);
        assert_eq!(fault.kind, FaultKind::Timeout);
        assert_eq!(fault.unit_id, angle.id());
    }
}

#[tokio::test]
async fn large_discount_near_top_is_price_not_headline() {
    let spans = vec![
        span("50% OFF", 100, 40, 600, 140, 0.93),
        span("Aurora Lamp", 80, 260, 640, 60, 0.92),
        span("Light that stays warm", 80, 340, 640, 36, 0.9),
        span("Shop now", 300, 680, 200, 40, 0.95),
    ];
    let output = Pipeline::new(
        Arc::new(ScriptedGenerator::healthy()),
        Arc::new(HashingEmbedder::default()),
        Settings::default(),
    )
    .with_engine(Arc::new(FixedEngine { spans }))
    .run(&image(), &params(), constraint("standard", &[]))
    .await
    .unwrap();

    let discount = output
        .zones
        .iter()
        .find(|zone| zone.text == "50% OFF")
        .unwrap();
    assert_eq!(discount.role, ZoneRole::Price);
    let headlines = output
        .zones
        .iter()
        .filter(|zone| zone.role == ZoneRole::Headline)
        .collect::<Vec<_>>();
    assert_eq!(headlines.len(), 1);
    assert_eq!(headlines[0].text, "Aurora Lamp");
    assert!(output
        .context
        .entities()
        .iter()
        .any(|entity| entity.kind == EntityKind::Price && entity.value == "50% OFF"));
}

#[tokio::test]
async fn missing_required_term_depends_on_risk_mode() {
    let standard = pipeline(
        ScriptedGenerator::healthy(),
        Arc::new(HashingEmbedder::default()),
        Settings::default(),
    )
    .run(&image(), &params(), constraint("standard", &["warranty"]))
    .await
    .unwrap_err();
    assert_eq!(standard.kind_str(), "all_angles_failed");

    let lenient = pipeline(
        ScriptedGenerator::healthy(),
        Arc::new(HashingEmbedder::default()),
        Settings::default(),
    )
    .run(&image(), &params(), constraint("lenient", &["warranty"]))
    .await
    .unwrap();
    assert!(!lenient.variants.is_empty());
    for variant in &lenient.variants {
        let scores = variant.candidate.scores();
        assert_eq!(scores.must_include, 0.0);
        assert!(variant.final_score < 0.9);
        assert!(variant
            .candidate
            .warnings()
            .iter()
            .any(|warning| warning == "missing required terms: warranty"));
    }

    let satisfied = pipeline(
        ScriptedGenerator {
            subhead: "Backed by our warranty",
            ..ScriptedGenerator::healthy()
        },
        Arc::new(HashingEmbedder::default()),
        Settings::default(),
    )
    .run(&image(), &params(), constraint("standard", &["warranty"]))
    .await
    .unwrap();
    assert!(!satisfied.variants.is_empty());
}

#[tokio::test]
async fn near_duplicate_keeps_only_the_first() {
    let output = pipeline(
        ScriptedGenerator::healthy(),
        Arc::new(AngleEmbedder),
        Settings::default(),
    )
    .run(&image(), &params(), constraint("standard", &[]))
    .await
    .unwrap();

    let benefit = output
        .candidates
        .iter()
        .find(|candidate| candidate.angle() == Angle::BenefitLed)
        .unwrap();
    let urgency = output
        .candidates
        .iter()
        .find(|candidate| candidate.angle() == Angle::Urgency)
        .unwrap();
    assert!(benefit.is_accepted());
    match urgency.status() {
        CandidateStatus::Rejected {
            reason: RejectReason::NearDuplicate { of, similarity },
        } => {
            assert_eq!(*of, benefit.id());
            assert!((similarity - 0.92).abs() < 1e-3);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(output
        .variants
        .iter()
        .all(|variant| variant.candidate.angle() != Angle::Urgency));
    assert_eq!(output.variants.len(), 7);
}

#[tokio::test]
async fn zero_accepted_candidates_is_never_an_empty_success() {
    let generator = ScriptedGenerator {
        failing: Angle::ALL.to_vec(),
        ..ScriptedGenerator::healthy()
    };
    let engine: Arc<dyn RecognitionEngine> = Arc::new(FixedEngine {
        spans: creative_spans(),
    });
    let err = run_pipeline(
        vec![engine],
        Arc::new(generator),
        Arc::new(HashingEmbedder::default()),
        &image(),
        &params(),
        constraint("standard", &[]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind_str(), "all_angles_failed");
    assert_eq!(err.faults().len(), 8);
    assert!(err
        .faults()
        .iter()
        .all(|fault| fault.kind == FaultKind::Unavailable && fault.stage == Stage::Generate));
}

#[tokio::test]
async fn panicking_embedder_degrades_scores_without_aborting() {
    let params = CampaignParams {
        brand_voice: Some(BrandVoice {
            description: "Warm, calm and honest".to_string(),
            ..BrandVoice::default()
        }),
        ..params()
    };
    let output = pipeline(
        ScriptedGenerator::healthy(),
        Arc::new(PanickingEmbedder),
        Settings::default(),
    )
    .run(&image(), &params, constraint("standard", &[]))
    .await
    .unwrap();

    assert_eq!(output.variants.len(), 8);
    for variant in &output.variants {
        assert_eq!(variant.candidate.scores().brand_voice, 0.5);
        assert!(variant
            .candidate
            .warnings()
            .iter()
            .any(|warning| warning.starts_with("brand_voice score unavailable")));
        assert!(variant
            .candidate
            .warnings()
            .iter()
            .any(|warning| warning.starts_with("similarity check unavailable")));
    }
}

#[test]
fn fusion_is_deterministic_across_input_order() {
    let mut spans = vec![
        TextSpan {
            engine_id: "psm6".to_string(),
            ..span("Aurora Lamp", 80, 200, 640, 60, 0.9)
        },
        TextSpan {
            engine_id: "psm11".to_string(),
            ..span("Aurora Larnp", 82, 201, 636, 60, 0.7)
        },
        TextSpan {
            engine_id: "psm6".to_string(),
            ..span("Shop now", 300, 680, 200, 40, 0.95)
        },
        TextSpan {
            engine_id: "psm11".to_string(),
            ..span("Sh0p now", 302, 681, 198, 40, 0.6)
        },
        TextSpan {
            engine_id: "psm11".to_string(),
            ..span("Free shipping", 80, 740, 300, 24, 0.5)
        },
    ];
    let settings = FusionSettings::default();
    let expected = fuse_spans(&spans, "en-US", &settings);
    assert_eq!(expected.len(), 3);

    for _ in 0..4 {
        spans.rotate_left(1);
        assert_eq!(fuse_spans(&spans, "en-US", &settings), expected);
        spans.reverse();
        assert_eq!(fuse_spans(&spans, "en-US", &settings), expected);
    }
}
