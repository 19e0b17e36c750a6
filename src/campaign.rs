use serde::{Deserialize, Serialize};

use crate::settings::SemanticSettings;

pub const MIN_VARIANTS: usize = 1;
pub const MAX_VARIANTS: usize = 12;
pub const DEFAULT_VARIANTS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandVoice {
    pub description: String,
    /// Approved copy the brand-voice score compares candidates against.
    pub reference_copy: Vec<String>,
    pub allowed_ctas: Vec<String>,
}

impl BrandVoice {
    /// Description and reference copy joined, or `None` when both are blank.
    pub fn reference_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.description.trim().is_empty() {
            parts.push(self.description.trim());
        }
        parts.extend(
            self.reference_copy
                .iter()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty()),
        );
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignParams {
    pub product_name: String,
    pub product_id: Option<String>,
    pub product_category: Option<String>,
    pub brand_voice: Option<BrandVoice>,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub platform: Option<String>,
    pub locales: Vec<String>,
    /// Falls back to the configured ranking default when absent.
    pub n_variants: Option<usize>,
}

impl Default for CampaignParams {
    fn default() -> Self {
        Self {
            product_name: String::new(),
            product_id: None,
            product_category: None,
            brand_voice: None,
            tone: None,
            persona: None,
            platform: None,
            locales: Vec::new(),
            n_variants: None,
        }
    }
}

impl CampaignParams {
    /// Requested number of variants, or the built-in default.
    pub fn variant_count(&self) -> usize {
        self.n_variants.unwrap_or(DEFAULT_VARIANTS)
    }

    /// Returns a cleaned copy plus one warning per adjustment made. The copy
    /// always carries an explicit `n_variants`.
    pub fn normalized(
        &self,
        settings: &SemanticSettings,
        default_variants: usize,
    ) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();

        let requested = self.n_variants.unwrap_or(default_variants);
        let n_variants = requested.clamp(MIN_VARIANTS, MAX_VARIANTS);
        if n_variants != requested {
            warnings.push(format!(
                "n_variants {} clamped to {}",
                requested, n_variants
            ));
        }

        let product_category = match clean(self.product_category.as_deref()) {
            Some(category) => {
                let category = category.to_lowercase();
                if settings.categories.contains_key(&category) {
                    Some(category)
                } else {
                    warnings.push(format!(
                        "unknown product category '{}'; detecting from image text",
                        category
                    ));
                    None
                }
            }
            None => None,
        };

        let brand_voice = self.brand_voice.as_ref().map(|voice| BrandVoice {
            description: voice.description.trim().to_string(),
            reference_copy: clean_list(&voice.reference_copy),
            allowed_ctas: clean_list(&voice.allowed_ctas),
        });

        let normalized = Self {
            product_name: self.product_name.trim().to_string(),
            product_id: clean(self.product_id.as_deref()).map(str::to_string),
            product_category,
            brand_voice,
            tone: clean(self.tone.as_deref()).map(|tone| tone.to_lowercase()),
            persona: clean(self.persona.as_deref()).map(str::to_string),
            platform: clean(self.platform.as_deref()).map(str::to_string),
            locales: clean_list(&self.locales),
            n_variants: Some(n_variants),
        };
        (normalized, warnings)
    }
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_variants_and_drops_unknown_category() {
        let params: CampaignParams = serde_json::from_str(
            r#"{
                "product_name": "  Aurora Lamp ",
                "product_category": "Spaceships",
                "locales": ["en-US", " ", "hi-IN"],
                "n_variants": 40
            }"#,
        )
        .expect("parse params");

        let (normalized, warnings) =
            params.normalized(&SemanticSettings::default(), DEFAULT_VARIANTS);
        assert_eq!(normalized.product_name, "Aurora Lamp");
        assert_eq!(normalized.product_category, None);
        assert_eq!(normalized.locales, vec!["en-US", "hi-IN"]);
        assert_eq!(normalized.n_variants, Some(MAX_VARIANTS));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn keeps_known_category_lowercased() {
        let params = CampaignParams {
            product_category: Some(" Home ".to_string()),
            n_variants: Some(0),
            ..CampaignParams::default()
        };
        let (normalized, warnings) =
            params.normalized(&SemanticSettings::default(), DEFAULT_VARIANTS);
        assert_eq!(normalized.product_category.as_deref(), Some("home"));
        assert_eq!(normalized.n_variants, Some(1));
        assert_eq!(warnings, vec!["n_variants 0 clamped to 1".to_string()]);
    }

    #[test]
    fn reference_text_skips_blank_parts() {
        let voice = BrandVoice {
            description: "  ".to_string(),
            reference_copy: vec!["Light that feels like home.".to_string(), "".to_string()],
            allowed_ctas: Vec::new(),
        };
        assert_eq!(
            voice.reference_text().as_deref(),
            Some("Light that feels like home.")
        );
        assert_eq!(BrandVoice::default().reference_text(), None);
    }
}
