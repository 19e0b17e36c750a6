use anyhow::{anyhow, Result};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::angles::Angle;
use crate::error::{EmbedFault, GenerationFault};

mod embedding;
mod openai;
mod retry;

pub use embedding::{cosine_similarity, HashingEmbedder};
pub use openai::OpenAI;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub angle: Angle,
    pub prompt: String,
    pub temperature: f32,
    /// Number of candidates asked for in this call.
    pub n: usize,
}

/// One candidate exactly as the generator returned it, before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCandidateText {
    pub text: String,
}

impl RawCandidateText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub type GenerationFuture<'a> = Pin<
    Box<dyn Future<Output = std::result::Result<Vec<RawCandidateText>, GenerationFault>> + Send + 'a>,
>;

/// External text-generation capability. Implementations make one attempt
/// per call; retries and timeouts belong to the caller.
pub trait CopyGenerator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerationFuture<'a>;
}

/// Text embedding capability. Must be deterministic for identical input.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedFault>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub model: String,
}

/// Accepts `provider:model`, a bare provider name, or a bare model name.
pub fn resolve_provider_selection(model_arg: Option<&str>) -> Result<ProviderSelection> {
    let Some(raw) = model_arg.map(str::trim) else {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            model: openai::DEFAULT_MODEL.to_string(),
        });
    };
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }

    if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
        return Ok(ProviderSelection {
            provider,
            model: openai::DEFAULT_MODEL.to_string(),
        });
    }

    match raw.split_once(':') {
        Some((provider_part, model_part)) => {
            let provider = provider_from_name(&provider_part.trim().to_lowercase())
                .ok_or_else(|| {
                    anyhow!(
                        "unknown provider '{}' in '{}'. Use openai:<model>",
                        provider_part.trim(),
                        raw
                    )
                })?;
            let model = model_part.trim();
            Ok(ProviderSelection {
                provider,
                model: if model.is_empty() {
                    openai::DEFAULT_MODEL.to_string()
                } else {
                    model.to_string()
                },
            })
        }
        None => Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            model: raw.to_string(),
        }),
    }
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
    }
    .ok_or_else(|| anyhow!("API key not found (set OPENAI_API_KEY or pass --key)"))
}

pub fn build_generator(selection: &ProviderSelection, key: String) -> OpenAI {
    match selection.provider {
        ProviderKind::OpenAI => OpenAI::new(key).with_model(selection.model.clone()),
    }
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
