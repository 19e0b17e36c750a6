mod fusion;
mod geom;
mod precheck;
mod tesseract;
mod text;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use image::GenericImageView;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EngineFault, Stage, StageFault};

pub use fusion::{fuse_spans, FusedSpan, FusionStatus};
pub use precheck::{preflight, PrecheckReport};
pub use tesseract::TesseractEngine;
pub use text::{levenshtein, normalize_for_compare, normalized_edit_distance, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn area(&self) -> f32 {
        self.w as f32 * self.h as f32
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
}

/// One text region as reported by a single engine. Confidence is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpan {
    pub engine_id: String,
    pub text: String,
    pub bbox: BBoxPx,
    pub confidence: f32,
}

/// Immutable image shared by every engine for the duration of a job.
#[derive(Debug, Clone)]
pub struct PipelineImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl PipelineImage {
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let image =
            image::load_from_memory(&bytes).with_context(|| "failed to decode input image")?;
        let (width, height) = image.dimensions();
        Ok(Self {
            bytes: Arc::from(bytes),
            width,
            height,
        })
    }

    /// An image known only by its size, for engines that never read pixels.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            bytes: Arc::from(Vec::new()),
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

pub type EngineFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<Vec<TextSpan>, EngineFault>> + Send + 'a>>;

pub trait RecognitionEngine: Send + Sync {
    fn id(&self) -> &str;
    fn extract_text<'a>(&'a self, image: &'a PipelineImage) -> EngineFuture<'a>;
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub spans: Vec<TextSpan>,
    pub faults: Vec<StageFault>,
}

/// Runs every engine concurrently. Each engine gets one retry; an engine
/// that fails twice contributes a fault instead of spans.
pub async fn extract_regions(
    engines: &[Arc<dyn RecognitionEngine>],
    image: &PipelineImage,
    timeout: Duration,
) -> Extraction {
    let runs = engines
        .iter()
        .map(|engine| run_engine(engine.as_ref(), image, timeout));
    let results = join_all(runs).await;

    let mut extraction = Extraction::default();
    for (engine, result) in engines.iter().zip(results) {
        match result {
            Ok(spans) => {
                debug!("extract: {} returned {} spans", engine.id(), spans.len());
                extraction.spans.extend(spans);
            }
            Err(fault) => {
                warn!("extract: {} failed: {}", engine.id(), fault);
                extraction.faults.push(StageFault::new(
                    Stage::Extract,
                    engine.id(),
                    fault.kind(),
                    fault.to_string(),
                ));
            }
        }
    }
    extraction
}

async fn run_engine(
    engine: &dyn RecognitionEngine,
    image: &PipelineImage,
    timeout: Duration,
) -> std::result::Result<Vec<TextSpan>, EngineFault> {
    let mut last_fault = EngineFault::Timeout;
    for attempt in 0..2 {
        let outcome = match tokio::time::timeout(timeout, engine.extract_text(image)).await {
            Ok(result) => result,
            Err(_) => Err(EngineFault::Timeout),
        };
        match outcome {
            Ok(spans) => {
                return Ok(spans
                    .into_iter()
                    .map(|span| TextSpan {
                        engine_id: engine.id().to_string(),
                        confidence: sanitize_confidence(span.confidence),
                        ..span
                    })
                    .collect());
            }
            Err(fault) => {
                if attempt == 0 {
                    debug!("extract: retrying {} after {}", engine.id(), fault);
                }
                last_fault = fault;
            }
        }
    }
    Err(last_fault)
}

fn sanitize_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyEngine {
        id: String,
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyEngine {
        fn new(id: &str, failures: usize) -> Self {
            Self {
                id: id.to_string(),
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RecognitionEngine for FlakyEngine {
        fn id(&self) -> &str {
            &self.id
        }

        fn extract_text<'a>(&'a self, _image: &'a PipelineImage) -> EngineFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    return Err(EngineFault::Failed("blurry".to_string()));
                }
                Ok(vec![TextSpan {
                    engine_id: "whatever".to_string(),
                    text: "SALE".to_string(),
                    bbox: BBoxPx {
                        x: 0,
                        y: 0,
                        w: 40,
                        h: 10,
                    },
                    confidence: 1.7,
                }])
            })
        }
    }

    struct StuckEngine;

    impl RecognitionEngine for StuckEngine {
        fn id(&self) -> &str {
            "stuck"
        }

        fn extract_text<'a>(&'a self, _image: &'a PipelineImage) -> EngineFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            })
        }
    }

    #[tokio::test]
    async fn retries_once_and_tags_spans_with_engine_id() {
        let flaky = Arc::new(FlakyEngine::new("flaky", 1));
        let engines: Vec<Arc<dyn RecognitionEngine>> = vec![flaky.clone()];
        let image = PipelineImage::from_dimensions(100, 100);

        let extraction = extract_regions(&engines, &image, Duration::from_secs(1)).await;

        assert!(extraction.faults.is_empty());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(extraction.spans.len(), 1);
        assert_eq!(extraction.spans[0].engine_id, "flaky");
        assert_eq!(extraction.spans[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn failing_engines_become_faults_without_blocking_others() {
        let engines: Vec<Arc<dyn RecognitionEngine>> = vec![
            Arc::new(FlakyEngine::new("broken", 5)),
            Arc::new(StuckEngine),
            Arc::new(FlakyEngine::new("steady", 0)),
        ];
        let image = PipelineImage::from_dimensions(100, 100);

        let extraction = extract_regions(&engines, &image, Duration::from_millis(50)).await;

        assert_eq!(extraction.spans.len(), 1);
        assert_eq!(extraction.spans[0].engine_id, "steady");
        let kinds = extraction
            .faults
            .iter()
            .map(|fault| (fault.unit_id.as_str(), fault.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("broken", FaultKind::EngineFailed),
                ("stuck", FaultKind::Timeout)
            ]
        );
    }
}
