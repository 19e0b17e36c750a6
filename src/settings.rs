use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recognition: RecognitionSettings,
    pub fusion: FusionSettings,
    pub zones: ZoneSettings,
    pub semantics: SemanticSettings,
    pub generation: GenerationSettings,
    pub guardrails: GuardrailSettings,
    pub diversity: DiversitySettings,
    pub ranking: RankingSettings,
    pub placement: PlacementSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub timeout_secs: u64,
    pub languages: String,
    pub engines: Vec<u32>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            languages: "eng".to_string(),
            engines: vec![6, 11],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub iou_threshold: f32,
    pub min_confidence: f32,
    pub edit_distance_threshold: f32,
    pub corroboration_overlap: f32,
    pub corroboration_boost: f32,
    /// Engine ids per script, most reliable first.
    pub reliability: BTreeMap<String, Vec<String>>,
}

impl Default for FusionSettings {
    fn default() -> Self {
        let mut reliability = BTreeMap::new();
        reliability.insert(
            "latin".to_string(),
            strings(&["tesseract-psm6", "tesseract-psm11"]),
        );
        reliability.insert(
            "devanagari".to_string(),
            strings(&["tesseract-psm11", "tesseract-psm6"]),
        );
        reliability.insert(
            "cjk".to_string(),
            strings(&["tesseract-psm11", "tesseract-psm6"]),
        );
        Self {
            iou_threshold: 0.3,
            min_confidence: 0.2,
            edit_distance_threshold: 0.3,
            corroboration_overlap: 0.8,
            corroboration_boost: 0.1,
            reliability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    pub legal_min_chars: usize,
    pub cta_max_words: usize,
    pub imperative_verbs: Vec<String>,
    pub legal_markers: Vec<String>,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            legal_min_chars: 60,
            cta_max_words: 4,
            imperative_verbs: strings(&[
                "book", "buy", "call", "claim", "discover", "download", "explore", "find", "get",
                "grab", "join", "learn", "order", "register", "save", "see", "shop", "sign",
                "start", "subscribe", "treat", "try", "unlock", "upgrade", "visit",
            ]),
            legal_markers: strings(&[
                "*",
                "©",
                "®",
                "™",
                "terms",
                "conditions",
                "t&c",
                "apply",
                "subject to",
                "valid",
                "disclaimer",
                "rights reserved",
                "warranty",
                "while stocks last",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSettings {
    pub categories: BTreeMap<String, Vec<String>>,
    pub urgency_cues: Vec<String>,
    pub promo_cues: Vec<String>,
    pub tone_lexicon: BTreeMap<String, Vec<String>>,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            "apparel".to_string(),
            strings(&["shirt", "dress", "jacket", "denim", "cotton", "fit", "wear", "sneaker"]),
        );
        categories.insert(
            "beauty".to_string(),
            strings(&["skin", "serum", "glow", "cream", "lipstick", "fragrance", "hydrating"]),
        );
        categories.insert(
            "electronics".to_string(),
            strings(&["battery", "wireless", "bluetooth", "charging", "display", "smart", "usb"]),
        );
        categories.insert(
            "food".to_string(),
            strings(&["flavor", "fresh", "organic", "snack", "taste", "recipe", "protein"]),
        );
        categories.insert(
            "home".to_string(),
            strings(&["lamp", "sofa", "kitchen", "decor", "bedding", "candle", "furniture"]),
        );
        categories.insert(
            "wellness".to_string(),
            strings(&["massage", "relax", "sleep", "body-safe", "self-care", "stress", "calm"]),
        );

        let mut tone_lexicon = BTreeMap::new();
        tone_lexicon.insert(
            "authoritative".to_string(),
            strings(&["expert", "proven", "trusted", "certified", "official", "engineered"]),
        );
        tone_lexicon.insert(
            "friendly".to_string(),
            strings(&["you", "your", "together", "welcome", "easy", "love"]),
        );
        tone_lexicon.insert(
            "luxurious".to_string(),
            strings(&["premium", "luxury", "velvet", "exclusive", "crafted", "indulge"]),
        );
        tone_lexicon.insert(
            "playful".to_string(),
            strings(&["fun", "play", "cheeky", "wink", "adventure", "wild"]),
        );
        tone_lexicon.insert(
            "urgent".to_string(),
            strings(&["now", "today", "hurry", "limited", "last chance", "ends"]),
        );

        Self {
            categories,
            urgency_cues: strings(&[
                "now",
                "today",
                "hurry",
                "limited time",
                "last chance",
                "ends soon",
                "only",
                "tonight",
            ]),
            promo_cues: strings(&[
                "off", "sale", "deal", "discount", "free", "save", "offer", "bogo", "coupon",
            ]),
            tone_lexicon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub candidates_per_angle: usize,
    pub timeout_secs: u64,
    pub base_temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            candidates_per_angle: 3,
            timeout_secs: 30,
            base_temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub readability: f64,
    pub policy: f64,
    pub brand_voice: f64,
    pub cta_validity: f64,
    pub style: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            readability: 0.25,
            policy: 0.3,
            brand_voice: 0.2,
            cta_validity: 0.15,
            style: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailSettings {
    pub weights: ScoreWeights,
    pub must_include_penalty: f64,
    pub max_word_chars: usize,
    pub max_sentence_words: usize,
    pub allowed_ctas: Vec<String>,
    pub style_lexicon: Vec<String>,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            must_include_penalty: 0.3,
            max_word_chars: 12,
            max_sentence_words: 20,
            allowed_ctas: strings(&[
                "shop now",
                "buy now",
                "learn more",
                "try it now",
                "get yours",
                "order today",
                "discover more",
                "treat yourself",
            ]),
            style_lexicon: strings(&[
                "revolutionary",
                "best-in-class",
                "world-class",
                "cutting-edge",
                "state-of-the-art",
                "next-generation",
                "unparalleled",
                "leverages",
                "synergy",
                "clinically tested",
                "scientifically proven",
                "medical grade",
                "miracle",
                "transform your life",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversitySettings {
    pub threshold: f32,
}

impl Default for DiversitySettings {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    pub default_variants: usize,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            default_variants: 8,
        }
    }
}

/// Reference font heights as fractions of the image height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontFractions {
    pub headline: f32,
    pub subhead: f32,
    pub cta: f32,
    pub legal: f32,
}

impl Default for FontFractions {
    fn default() -> Self {
        Self {
            headline: 0.07,
            subhead: 0.045,
            cta: 0.04,
            legal: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    pub reference_font: FontFractions,
    pub scale_step: f32,
    pub scale_floor: f32,
    pub max_lines: usize,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            reference_font: FontFractions::default(),
            scale_step: 0.05,
            scale_floor: 0.6,
            max_lines: 3,
        }
    }
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    let mut merged = parse_layer(DEFAULT_SETTINGS_TOML, Path::new("<embedded>"))?;
    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let layer = parse_layer(&content, &path)?;
            merge_layer(&mut merged, layer);
        }
    }

    merged
        .try_into::<Settings>()
        .with_context(|| "failed to apply merged settings")
}

pub fn parse_settings(content: &str) -> Result<Settings> {
    toml::from_str(content).with_context(|| "failed to parse settings")
}

fn parse_layer(content: &str, path: &Path) -> Result<toml::Value> {
    toml::from_str::<toml::Value>(content)
        .with_context(|| format!("failed to parse settings: {}", path.display()))
}

/// Tables merge key by key; any other value replaces the earlier one.
fn merge_layer(base: &mut toml::Value, incoming: toml::Value) {
    match (base, incoming) {
        (toml::Value::Table(base_table), toml::Value::Table(incoming_table)) => {
            for (key, value) in incoming_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_layer(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".adcopy-pipeline"))
        }
    })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
