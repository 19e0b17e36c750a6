use tracing::{debug, warn};

use crate::candidate::{Candidate, RejectReason};
use crate::error::{contain, PipelineFault, Stage};
use crate::providers::{cosine_similarity, Embedder};

/// Accepts pending candidates in generation order unless they sit too close
/// to one already accepted in this job.
pub struct DiversityFilter<'a> {
    embedder: &'a dyn Embedder,
    threshold: f32,
    accepted: Vec<(usize, Vec<f32>)>,
}

impl<'a> DiversityFilter<'a> {
    pub fn new(embedder: &'a dyn Embedder, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
            accepted: Vec::new(),
        }
    }

    pub fn filter(&mut self, candidates: &mut [Candidate]) -> Result<(), PipelineFault> {
        for candidate in candidates.iter_mut() {
            if candidate.status().is_terminal() {
                continue;
            }
            let text = candidate.full_text();
            let embedding = match contain(|| self.embedder.embed(&text)) {
                Ok(embedding) => embedding,
                Err(message) => {
                    warn!(
                        "diversity: candidate {} kept without similarity check: {}",
                        candidate.id(),
                        message
                    );
                    candidate.add_warning(format!("similarity check unavailable: {}", message));
                    candidate.accept(Stage::Diversity)?;
                    continue;
                }
            };

            let duplicate = self.accepted.iter().find_map(|(id, other)| {
                let similarity = cosine_similarity(&embedding, other);
                (similarity >= self.threshold).then_some((*id, similarity))
            });
            match duplicate {
                Some((of, similarity)) => {
                    debug!(
                        "diversity: candidate {} duplicates {} ({:.3})",
                        candidate.id(),
                        of,
                        similarity
                    );
                    candidate.reject(
                        Stage::Diversity,
                        RejectReason::NearDuplicate { of, similarity },
                    )?;
                }
                None => {
                    candidate.accept(Stage::Diversity)?;
                    self.accepted.push((candidate.id(), embedding));
                }
            }
        }
        Ok(())
    }
}
