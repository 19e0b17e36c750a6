use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod angles;
pub mod campaign;
pub mod candidate;
pub mod constraint;
pub mod diversity;
pub mod error;
pub mod generator;
pub mod guardrails;
mod lexicon;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod placement;
pub mod providers;
pub mod ranker;
pub mod semantics;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod zones;

pub use campaign::{BrandVoice, CampaignParams};
pub use constraint::{Constraint, ConstraintSpec};
pub use error::{PipelineFault, StageFault};
pub use ocr::PipelineImage;
pub use pipeline::{run_pipeline, Pipeline, PipelineOutput, VariantResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub image: String,
    pub params_path: Option<String>,
    pub constraint_path: Option<String>,
    pub engines: Vec<u32>,
    pub ocr_lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub json: bool,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    let params = match config.params_path.as_deref() {
        Some(path) => read_structured::<CampaignParams>(Path::new(path))
            .with_context(|| "failed to load campaign params")?,
        None => CampaignParams::default(),
    };
    let spec = match config.constraint_path.as_deref() {
        Some(path) => read_structured::<ConstraintSpec>(Path::new(path))
            .with_context(|| "failed to load constraints")?,
        None => ConstraintSpec::default(),
    };
    let constraint = Constraint::from_spec(spec).with_context(|| "invalid constraints")?;

    let bytes = std::fs::read(&config.image)
        .with_context(|| format!("failed to read image: {}", config.image))?;
    let image = PipelineImage::decode(bytes)?;

    let modes = if config.engines.is_empty() {
        settings.recognition.engines.clone()
    } else {
        config.engines.clone()
    };
    if modes.is_empty() {
        return Err(anyhow!("no recognition engines configured"));
    }
    let languages = config
        .ocr_lang
        .clone()
        .unwrap_or_else(|| settings.recognition.languages.clone());

    let selection = providers::resolve_provider_selection(config.model.as_deref())?;
    let key = providers::resolve_key(selection.provider, config.key.as_deref())
        .with_context(|| "no API key found for selected provider")?;
    info!(
        "generation provider {}:{}",
        selection.provider.as_str(),
        selection.model
    );
    let generator = providers::build_generator(&selection, key);

    let pipeline = modes.into_iter().fold(
        Pipeline::new(
            Arc::new(generator),
            Arc::new(providers::HashingEmbedder::default()),
            settings,
        ),
        |pipeline, psm| pipeline.with_engine(Arc::new(ocr::TesseractEngine::new(psm, &languages))),
    );
    let output = pipeline
        .run(&image, &params, Arc::new(constraint))
        .await
        .map_err(|fault| anyhow!(describe_fault(&fault)))?;

    if config.json {
        return serde_json::to_string_pretty(&output).with_context(|| "failed to serialize output");
    }
    Ok(format_output(&output))
}

/// JSON when the extension says so, TOML otherwise.
fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }
}

fn describe_fault(fault: &PipelineFault) -> String {
    let mut message = format!("{} ({})", fault, fault.kind_str());
    for stage_fault in fault.faults() {
        message.push_str("\n  - ");
        message.push_str(&stage_fault.to_string());
    }
    message
}

fn format_output(output: &PipelineOutput) -> String {
    let mut lines = Vec::new();
    for variant in &output.variants {
        let candidate = &variant.candidate;
        lines.push(format!(
            "#{} [{}] score {:.3}",
            variant.rank,
            candidate.angle(),
            variant.final_score
        ));
        for field in constraint::CopyField::ALL {
            let text = candidate.field(field);
            if !text.is_empty() {
                lines.push(format!("  {}: {}", field, text));
            }
        }
        let overflowing = variant
            .placement
            .fields
            .iter()
            .filter(|(_, placement)| !placement.fits)
            .map(|(field, _)| field.as_str())
            .collect::<Vec<_>>();
        if overflowing.is_empty() {
            lines.push("  placement: fits".to_string());
        } else {
            lines.push(format!("  placement: overflows {}", overflowing.join(", ")));
        }
        for warning in candidate.warnings() {
            lines.push(format!("  warning: {}", warning));
        }
    }
    if !output.warnings.is_empty() {
        lines.push("warnings:".to_string());
        lines.extend(output.warnings.iter().map(|warning| format!("  - {}", warning)));
    }
    if !output.faults.is_empty() {
        lines.push("faults:".to_string());
        lines.extend(output.faults.iter().map(|fault| format!("  - {}", fault)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_params_from_json_and_toml() {
        let mut json = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(json, r#"{{"product_name":"Aurora Lamp","n_variants":4}}"#).expect("write");
        let params: CampaignParams = read_structured(json.path()).expect("json params");
        assert_eq!(params.product_name, "Aurora Lamp");
        assert_eq!(params.n_variants, Some(4));

        let mut toml_file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        write!(
            toml_file,
            "must_include = [\"warranty\"]\nrisk_mode = \"lenient\"\n\n[max_chars]\nheadline = 30\n"
        )
        .expect("write");
        let spec: ConstraintSpec = read_structured(toml_file.path()).expect("toml constraint");
        let parsed = Constraint::from_spec(spec).expect("constraint");
        assert_eq!(parsed.max_chars(constraint::CopyField::Headline), 30);
        assert_eq!(parsed.risk_mode(), constraint::RiskMode::Lenient);
    }

    #[test]
    fn fault_description_lists_stage_faults() {
        let fault = PipelineFault::AllAnglesFailed {
            attempted: 8,
            faults: vec![StageFault::new(
                error::Stage::Generate,
                "humor",
                error::FaultKind::Timeout,
                "generation call timed out",
            )],
        };
        assert_eq!(
            describe_fault(&fault),
            "all 8 angles failed to yield an accepted candidate (all_angles_failed)\n  - generate[humor] Timeout: generation call timed out"
        );
    }
}
