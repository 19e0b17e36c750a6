use crate::error::EmbedFault;
use crate::lexicon::{normalize_text, tokens};

use super::Embedder;

const DEFAULT_DIMENSIONS: usize = 256;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Local feature-hashing embedder: word tokens plus character trigrams,
/// hashed into a fixed number of buckets and L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedFault> {
        let words = tokens(text);
        if words.is_empty() {
            return Err(EmbedFault::EmptyInput);
        }

        let mut vector = vec![0f32; self.dimensions];
        for word in &words {
            vector[bucket(word, self.dimensions)] += 1.0;
        }
        let padded = format!(" {} ", normalize_text(text));
        let chars = padded.chars().collect::<Vec<_>>();
        for window in chars.windows(3) {
            let trigram = window.iter().collect::<String>();
            vector[bucket(&trigram, self.dimensions)] += TRIGRAM_WEIGHT;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(EmbedFault::Failed("degenerate embedding".to_string()));
        }
        for value in &mut vector {
            *value /= norm;
        }
        Ok(vector)
    }
}

fn bucket(feature: &str, dimensions: usize) -> usize {
    (fnv1a(feature.as_bytes()) % dimensions as u64) as usize
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0f32;
    let mut norm_a = 0f32;
    let mut norm_b = 0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
