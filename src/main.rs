use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "adcopy-pipeline",
    version,
    about = "Generate ranked ad-copy variants from a creative image"
)]
struct Cli {
    /// Creative image to read text from (PNG, JPEG, WebP, ...)
    #[arg(short = 'i', long = "image")]
    image: String,

    /// Campaign params file (.json or .toml)
    #[arg(short = 'p', long = "params")]
    params: Option<String>,

    /// Constraint file (.json or .toml)
    #[arg(short = 'c', long = "constraint")]
    constraint: Option<String>,

    /// Tesseract page-segmentation mode to run as an engine (repeatable)
    #[arg(short = 'e', long = "engine")]
    engines: Vec<u32>,

    /// Tesseract language list (e.g. eng+hin)
    #[arg(long = "ocr-lang")]
    ocr_lang: Option<String>,

    /// Model name or provider:model (e.g. openai:MODEL_ID)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings")]
    settings: Option<String>,

    /// Print the full result as JSON
    #[arg(long = "json")]
    json: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    adcopy_pipeline::logging::init(cli.verbose)?;

    let config = adcopy_pipeline::Config {
        image: cli.image,
        params_path: cli.params,
        constraint_path: cli.constraint,
        engines: cli.engines,
        ocr_lang: cli.ocr_lang,
        model: cli.model,
        key: cli.key,
        settings_path: cli.settings,
        json: cli.json,
    };
    let output = adcopy_pipeline::run(config).await?;
    println!("{}", output);
    Ok(())
}
