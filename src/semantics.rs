use serde::Serialize;
use std::collections::BTreeMap;

use crate::campaign::CampaignParams;
use crate::constraint::Constraint;
use crate::lexicon::{contains_cue, contains_term};
use crate::settings::SemanticSettings;
use crate::zones::{Zone, ZoneRole};

pub const NEUTRAL_TONE: f32 = 0.5;
pub const GENERAL_CATEGORY: &str = "general";

const TONE_STEP: f32 = 0.15;
const TONE_PARAM_BONUS: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Informational,
    Promotional,
    Urgency,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Informational => "informational",
            Intent::Promotional => "promotional",
            Intent::Urgency => "urgency",
            Intent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ProductName,
    Price,
    MustInclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticContext {
    intent: Intent,
    tone_axes: BTreeMap<String, f32>,
    entities: Vec<Entity>,
    locale: String,
    product_category: String,
}

impl SemanticContext {
    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn tone_axes(&self) -> &BTreeMap<String, f32> {
        &self.tone_axes
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn product_category(&self) -> &str {
        &self.product_category
    }

    /// Tone axes scoring above neutral, strongest first.
    pub fn dominant_tones(&self) -> Vec<&str> {
        let mut tones = self
            .tone_axes
            .iter()
            .filter(|(_, score)| **score > NEUTRAL_TONE)
            .collect::<Vec<_>>();
        tones.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        tones.into_iter().map(|(axis, _)| axis.as_str()).collect()
    }
}

pub fn extract_semantics(
    zones: &[Zone],
    params: &CampaignParams,
    constraint: &Constraint,
    settings: &SemanticSettings,
) -> SemanticContext {
    let locale = constraint.locale().to_string();
    let source_text = zones
        .iter()
        .map(|zone| zone.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if source_text.trim().is_empty() {
        return SemanticContext {
            intent: Intent::Unknown,
            tone_axes: settings
                .tone_lexicon
                .keys()
                .map(|axis| (axis.clone(), NEUTRAL_TONE))
                .collect(),
            entities: Vec::new(),
            locale,
            product_category: params
                .product_category
                .clone()
                .unwrap_or_else(|| GENERAL_CATEGORY.to_string()),
        };
    }

    let has_price = zones.iter().any(|zone| zone.role == ZoneRole::Price);
    let intent = if matches_any(&source_text, &settings.urgency_cues) {
        Intent::Urgency
    } else if has_price || matches_any(&source_text, &settings.promo_cues) {
        Intent::Promotional
    } else {
        Intent::Informational
    };

    let mut tone_evidence = source_text.clone();
    if let Some(voice) = &params.brand_voice {
        tone_evidence.push('\n');
        tone_evidence.push_str(&voice.description);
    }
    if let Some(persona) = &params.persona {
        tone_evidence.push('\n');
        tone_evidence.push_str(persona);
    }
    let tone_axes = settings
        .tone_lexicon
        .iter()
        .map(|(axis, cues)| {
            let hits = cues
                .iter()
                .filter(|cue| contains_cue(&tone_evidence, cue))
                .count();
            let mut score = NEUTRAL_TONE + TONE_STEP * hits as f32;
            if params
                .tone
                .as_deref()
                .is_some_and(|tone| contains_term(tone, axis))
            {
                score += TONE_PARAM_BONUS;
            }
            (axis.clone(), score.min(1.0))
        })
        .collect();

    let mut entities = Vec::new();
    if !params.product_name.is_empty() && contains_term(&source_text, &params.product_name) {
        entities.push(Entity {
            kind: EntityKind::ProductName,
            value: params.product_name.clone(),
        });
    }
    for zone in zones.iter().filter(|zone| zone.role == ZoneRole::Price) {
        entities.push(Entity {
            kind: EntityKind::Price,
            value: zone.text.clone(),
        });
    }
    for term in constraint.must_include() {
        if contains_term(&source_text, term) {
            entities.push(Entity {
                kind: EntityKind::MustInclude,
                value: term.clone(),
            });
        }
    }

    let product_category = params
        .product_category
        .clone()
        .or_else(|| detect_category(&source_text, settings))
        .unwrap_or_else(|| GENERAL_CATEGORY.to_string());

    SemanticContext {
        intent,
        tone_axes,
        entities,
        locale,
        product_category,
    }
}

/// Category whose keywords appear most often; ties go to the name that
/// sorts first.
pub fn detect_category(text: &str, settings: &SemanticSettings) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (category, keywords) in &settings.categories {
        let score = keywords
            .iter()
            .filter(|keyword| contains_term(text, keyword))
            .count();
        if score == 0 {
            continue;
        }
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((category, score));
        }
    }
    best.map(|(category, _)| category.clone())
}

fn matches_any(text: &str, cues: &[String]) -> bool {
    cues.iter().any(|cue| contains_cue(text, cue))
}
