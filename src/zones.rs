use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::lexicon::{contains_cue, tokens, word_count};
use crate::ocr::{BBoxPx, FusedSpan};
use crate::settings::ZoneSettings;

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)([$€£¥₹]\s*\d|\d\s*(%|percent\b)|\b(rs\.?|inr|usd|eur|gbp|mrp)\s*\d|\d[\d,.]*\s*(rs|inr|usd|eur|gbp)\b|\b\d+\s*off\b)",
    )
    .expect("Invalid price regex")
});

const LOSER_HEIGHT_RATIO: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneRole {
    Headline,
    Subhead,
    Cta,
    Legal,
    Price,
    Other,
}

impl ZoneRole {
    fn weight(&self) -> f32 {
        match self {
            ZoneRole::Price => 0.95,
            ZoneRole::Legal => 0.85,
            ZoneRole::Cta => 0.8,
            ZoneRole::Headline => 0.75,
            ZoneRole::Subhead => 0.65,
            ZoneRole::Other => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub role: ZoneRole,
    /// Id of the fused span this zone was classified from.
    pub span_ref: usize,
    pub role_confidence: f32,
    pub text: String,
    pub bbox: BBoxPx,
}

pub fn is_price_text(text: &str) -> bool {
    PRICE_PATTERN.is_match(text)
}

/// Rule cascade: Price, Legal, CTA, then relative height picks Headline and
/// Subhead. At most one Headline is ever returned.
pub fn classify_zones(spans: &[FusedSpan], image_height: u32, settings: &ZoneSettings) -> Vec<Zone> {
    let mut roles = spans
        .iter()
        .map(|span| lexical_role(&span.text, settings))
        .collect::<Vec<_>>();

    let image_height = image_height.max(1) as f32;
    let proxy = |span: &FusedSpan| span.bbox.h as f32 / image_height;
    let mut remaining = spans
        .iter()
        .zip(&roles)
        .filter(|(_, role)| role.is_none())
        .map(|(span, _)| proxy(span))
        .collect::<Vec<_>>();
    remaining.sort_by(|a, b| a.total_cmp(b));
    let q75 = nearest_rank(&remaining, 0.75);
    let q50 = nearest_rank(&remaining, 0.5);

    for (span, role) in spans.iter().zip(roles.iter_mut()) {
        if role.is_some() {
            continue;
        }
        let height = proxy(span);
        *role = Some(if height >= q75 {
            ZoneRole::Headline
        } else if height >= q50 {
            ZoneRole::Subhead
        } else {
            ZoneRole::Other
        });
    }

    let mut roles = roles
        .into_iter()
        .map(|role| role.unwrap_or(ZoneRole::Other))
        .collect::<Vec<_>>();
    resolve_headline_ties(spans, &mut roles);

    spans
        .iter()
        .zip(roles)
        .map(|(span, role)| Zone {
            role,
            span_ref: span.id,
            role_confidence: (role.weight() * span.confidence).clamp(0.0, 1.0),
            text: span.text.clone(),
            bbox: span.bbox,
        })
        .collect()
}

fn lexical_role(text: &str, settings: &ZoneSettings) -> Option<ZoneRole> {
    if is_price_text(text) {
        return Some(ZoneRole::Price);
    }
    if text.chars().count() > settings.legal_min_chars
        && settings
            .legal_markers
            .iter()
            .any(|marker| contains_cue(text, marker))
    {
        return Some(ZoneRole::Legal);
    }
    if is_call_to_action(text, settings) {
        return Some(ZoneRole::Cta);
    }
    None
}

pub(crate) fn is_call_to_action(text: &str, settings: &ZoneSettings) -> bool {
    let words = tokens(text);
    if words.is_empty() || word_count(text) > settings.cta_max_words {
        return false;
    }
    let first = &words[0];
    settings
        .imperative_verbs
        .iter()
        .any(|verb| verb.eq_ignore_ascii_case(first))
        || words.last().is_some_and(|last| last == "now")
}

fn nearest_rank(sorted: &[f32], fraction: f32) -> f32 {
    if sorted.is_empty() {
        return f32::INFINITY;
    }
    let rank = (fraction * sorted.len() as f32).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn resolve_headline_ties(spans: &[FusedSpan], roles: &mut [ZoneRole]) {
    let contenders = roles
        .iter()
        .enumerate()
        .filter(|(_, role)| **role == ZoneRole::Headline)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    if contenders.len() <= 1 {
        return;
    }
    let Some(winner) = contenders
        .iter()
        .copied()
        .min_by(|a, b| headline_order(&spans[*a], &spans[*b]))
    else {
        return;
    };
    let winner_height = spans[winner].bbox.h as f32;
    for idx in contenders {
        if idx == winner {
            continue;
        }
        roles[idx] = if spans[idx].bbox.h as f32 >= LOSER_HEIGHT_RATIO * winner_height {
            ZoneRole::Subhead
        } else {
            ZoneRole::Other
        };
    }
}

/// Area desc, then confidence desc, then higher on the image, then id.
fn headline_order(a: &FusedSpan, b: &FusedSpan) -> Ordering {
    b.bbox
        .area()
        .total_cmp(&a.bbox.area())
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.bbox.y.cmp(&b.bbox.y))
        .then_with(|| a.id.cmp(&b.id))
}
