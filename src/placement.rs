use serde::Serialize;
use std::collections::BTreeMap;

use crate::candidate::Candidate;
use crate::constraint::CopyField;
use crate::ocr::BBoxPx;
use crate::settings::PlacementSettings;
use crate::zones::{Zone, ZoneRole};

const LINE_HEIGHT: f32 = 1.1;
const SPACE_UNITS: f32 = 0.3;
const SCALE_TOLERANCE: f32 = 1e-4;

/// Rectangle a field's copy is laid into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafeArea {
    pub field: CopyField,
    pub rect: BBoxPx,
    /// True when the rectangle comes from a classified zone.
    pub from_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPlacement {
    pub position: BBoxPx,
    pub scale: f32,
    pub font_px: f32,
    pub lines: Vec<String>,
    pub fits: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementPlan {
    pub fields: BTreeMap<CopyField, FieldPlacement>,
}

impl PlacementPlan {
    pub fn fits(&self) -> bool {
        self.fields.values().all(|placement| placement.fits)
    }
}

fn zone_role(field: CopyField) -> ZoneRole {
    match field {
        CopyField::Headline => ZoneRole::Headline,
        CopyField::Subhead => ZoneRole::Subhead,
        CopyField::Cta => ZoneRole::Cta,
        CopyField::Legal => ZoneRole::Legal,
    }
}

/// Band of the image used when no zone of the field's role was found, as
/// (x, y, w, h) fractions.
fn default_band(field: CopyField) -> (f32, f32, f32, f32) {
    match field {
        CopyField::Headline => (0.05, 0.08, 0.9, 0.2),
        CopyField::Subhead => (0.05, 0.3, 0.9, 0.15),
        CopyField::Cta => (0.25, 0.75, 0.5, 0.1),
        CopyField::Legal => (0.05, 0.9, 0.9, 0.08),
    }
}

pub fn safe_areas(zones: &[Zone], width: u32, height: u32) -> Vec<SafeArea> {
    let width = width.max(1);
    let height = height.max(1);
    CopyField::ALL
        .iter()
        .map(|field| {
            let role = zone_role(*field);
            // Largest zone of the role wins when several exist.
            let zone = zones
                .iter()
                .filter(|zone| zone.role == role && zone.bbox.w > 0 && zone.bbox.h > 0)
                .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()));
            match zone {
                Some(zone) => SafeArea {
                    field: *field,
                    rect: zone.bbox,
                    from_zone: true,
                },
                None => {
                    let (x, y, w, h) = default_band(*field);
                    SafeArea {
                        field: *field,
                        rect: BBoxPx {
                            x: (x * width as f32).round() as u32,
                            y: (y * height as f32).round() as u32,
                            w: ((w * width as f32).round() as u32).max(1),
                            h: ((h * height as f32).round() as u32).max(1),
                        },
                        from_zone: false,
                    }
                }
            }
        })
        .collect()
}

/// Lays every non-empty field of `candidate` into its safe area, shrinking
/// the font until it fits or the floor is reached. Always yields a plan.
pub fn simulate_placement(
    candidate: &Candidate,
    zones: &[Zone],
    width: u32,
    height: u32,
    settings: &PlacementSettings,
) -> PlacementPlan {
    let image_height = height.max(1) as f32;
    let step = settings.scale_step.max(0.01);
    let floor = settings.scale_floor.clamp(0.05, 1.0);
    let max_lines = settings.max_lines.max(1);

    let mut plan = PlacementPlan::default();
    for area in safe_areas(zones, width, height) {
        let text = candidate.field(area.field);
        if text.is_empty() {
            continue;
        }
        let reference = reference_fraction(settings, area.field) * image_height;

        let mut attempt = 0u32;
        let placement = loop {
            let scale = 1.0 - step * attempt as f32;
            let font_px = (reference * scale).max(1.0);
            let (lines, fits) = layout(text, area.rect, font_px, max_lines);
            if fits || scale - step < floor - SCALE_TOLERANCE {
                break FieldPlacement {
                    position: area.rect,
                    scale,
                    font_px,
                    lines,
                    fits,
                };
            }
            attempt += 1;
        };
        plan.fields.insert(area.field, placement);
    }
    plan
}

fn reference_fraction(settings: &PlacementSettings, field: CopyField) -> f32 {
    let fonts = &settings.reference_font;
    match field {
        CopyField::Headline => fonts.headline,
        CopyField::Subhead => fonts.subhead,
        CopyField::Cta => fonts.cta,
        CopyField::Legal => fonts.legal,
    }
}

fn layout(text: &str, rect: BBoxPx, font_px: f32, max_lines: usize) -> (Vec<String>, bool) {
    let max_units = rect.w.max(1) as f32 / font_px;
    let lines = wrap_text(text, max_units);
    let line_budget = ((rect.h.max(1) as f32 / (font_px * LINE_HEIGHT)).floor() as usize)
        .min(max_lines);
    let too_wide = lines
        .iter()
        .any(|line| estimate_text_units(line) > max_units + f32::EPSILON);
    let fits = !lines.is_empty() && lines.len() <= line_budget && !too_wide;
    (lines, fits)
}

fn wrap_text(text: &str, max_units: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut units = 0.0;

    for token in tokenize(text) {
        if token == "\n" {
            if !current.trim().is_empty() {
                lines.push(current.trim_end().to_string());
            }
            current.clear();
            units = 0.0;
            continue;
        }
        if token == " " {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
                units += SPACE_UNITS;
            }
            continue;
        }
        let token_units = estimate_text_units(&token);
        if units + token_units > max_units && !current.trim().is_empty() {
            lines.push(current.trim_end().to_string());
            current.clear();
            units = 0.0;
        }
        current.push_str(&token);
        units += token_units;
    }
    if !current.trim().is_empty() {
        lines.push(current.trim_end().to_string());
    }
    lines
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF)
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_ascii() {
        0.6
    } else if is_cjk(ch) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units).sum()
}

/// Words, single spaces and newlines; CJK characters break individually.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' || ch.is_whitespace() || is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(if ch == '\n' {
                "\n".to_string()
            } else if ch.is_whitespace() {
                " ".to_string()
            } else {
                ch.to_string()
            });
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::Angle;
    use crate::candidate::CopyDraft;

    fn candidate(headline: &str, cta: &str) -> Candidate {
        Candidate::new(
            0,
            Angle::BenefitLed,
            CopyDraft {
                headline: headline.to_string(),
                subhead: String::new(),
                cta: cta.to_string(),
                legal: String::new(),
            },
        )
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("Evenings softened by glass", 6.0),
            vec!["Evenings", "softened", "by glass"]
        );
        assert_eq!(wrap_text("夜の光", 2.0), vec!["夜の", "光"]);
        assert!(wrap_text("   ", 10.0).is_empty());
    }

    #[test]
    fn zone_rect_is_preferred_over_default_band() {
        let zones = vec![Zone {
            role: ZoneRole::Cta,
            span_ref: 4,
            role_confidence: 0.9,
            text: "Shop now".to_string(),
            bbox: BBoxPx { x: 10, y: 900, w: 300, h: 60 },
        }];
        let areas = safe_areas(&zones, 1000, 1000);
        let cta = areas
            .iter()
            .find(|area| area.field == CopyField::Cta)
            .expect("cta area");
        assert!(cta.from_zone);
        assert_eq!(cta.rect, BBoxPx { x: 10, y: 900, w: 300, h: 60 });
        let headline = areas
            .iter()
            .find(|area| area.field == CopyField::Headline)
            .expect("headline area");
        assert!(!headline.from_zone);
        assert_eq!(headline.rect, BBoxPx { x: 50, y: 80, w: 900, h: 200 });
    }

    #[test]
    fn short_copy_fits_at_reference_scale() {
        let plan = simulate_placement(
            &candidate("Evenings, softened", "Shop now"),
            &[],
            1000,
            1000,
            &PlacementSettings::default(),
        );
        let headline = &plan.fields[&CopyField::Headline];
        assert!(headline.fits);
        assert_eq!(headline.scale, 1.0);
        assert!((headline.font_px - 70.0).abs() < 1e-3);
        assert!(!plan.fields.contains_key(&CopyField::Subhead));
        assert!(plan.fits());
    }

    #[test]
    fn long_copy_shrinks_then_reports_overflow() {
        let long = "Hand-blown glass and a dimmable warm glow that turns every ordinary \
                    evening at home into something quietly special for everyone";
        let plan = simulate_placement(
            &candidate(long, ""),
            &[],
            600,
            600,
            &PlacementSettings::default(),
        );
        let headline = &plan.fields[&CopyField::Headline];
        assert!(!headline.fits);
        assert!(headline.scale < 0.65 && headline.scale >= 0.6 - 1e-4);
        assert!(!headline.lines.is_empty());
        assert!(!plan.fits());
    }
}
