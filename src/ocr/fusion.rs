use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::settings::FusionSettings;

use super::geom::{iou, overlap_ratio};
use super::text::{normalized_edit_distance, Script};
use super::{BBoxPx, TextSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStatus {
    /// Only one engine saw this region.
    Single,
    /// The two most confident readings agree.
    Consensus,
    /// Readings disagree; the most reliable engine for the script won.
    Disputed,
    /// No two readings agree at all.
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedSpan {
    pub id: usize,
    pub text: String,
    pub bbox: BBoxPx,
    pub confidence: f32,
    pub contributing_engines: BTreeSet<String>,
    pub status: FusionStatus,
    pub alternates: Vec<String>,
}

/// Merges spans from every engine into one span per physical text region.
///
/// The result does not depend on the order of `spans`: input is sorted by a
/// total order before grouping, and the output is sorted top-to-bottom.
pub fn fuse_spans(spans: &[TextSpan], locale: &str, settings: &FusionSettings) -> Vec<FusedSpan> {
    let mut candidates = spans
        .iter()
        .filter(|span| !span.text.trim().is_empty())
        .filter(|span| span.confidence >= settings.min_confidence)
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| total_order(a, b));

    let mut groups: Vec<Vec<&TextSpan>> = Vec::new();
    for span in candidates {
        let slot = groups.iter().position(|group| {
            group.iter().all(|member| member.engine_id != span.engine_id)
                && group
                    .iter()
                    .any(|member| iou(&member.bbox, &span.bbox) >= settings.iou_threshold)
        });
        match slot {
            Some(idx) => groups[idx].push(span),
            None => groups.push(vec![span]),
        }
    }

    let locale_script = Script::from_locale(locale);
    let mut fused = groups
        .into_iter()
        .map(|group| resolve_group(group, locale_script, settings))
        .collect::<Vec<_>>();
    fused.sort_by(|a, b| {
        (a.bbox.y, a.bbox.x, a.bbox.w, a.bbox.h)
            .cmp(&(b.bbox.y, b.bbox.x, b.bbox.w, b.bbox.h))
            .then_with(|| a.text.cmp(&b.text))
    });
    for (idx, span) in fused.iter_mut().enumerate() {
        span.id = idx;
    }
    fused
}

fn total_order(a: &TextSpan, b: &TextSpan) -> Ordering {
    (a.bbox.y, a.bbox.x, a.bbox.w, a.bbox.h)
        .cmp(&(b.bbox.y, b.bbox.x, b.bbox.w, b.bbox.h))
        .then_with(|| a.engine_id.cmp(&b.engine_id))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
}

fn resolve_group(
    mut members: Vec<&TextSpan>,
    locale_script: Script,
    settings: &FusionSettings,
) -> FusedSpan {
    members.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.engine_id.cmp(&b.engine_id))
            .then_with(|| a.text.cmp(&b.text))
    });
    let threshold = settings.edit_distance_threshold;

    let (chosen, status) = if members.len() == 1 {
        (members[0], FusionStatus::Single)
    } else if agrees(members[0], members[1], threshold) {
        (members[0], FusionStatus::Consensus)
    } else {
        let joined = members
            .iter()
            .map(|member| member.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let script = Script::dominant(&joined).unwrap_or(locale_script);
        let chosen = most_reliable(&members, script, settings);
        let any_pair_agrees = members.iter().enumerate().any(|(i, a)| {
            members
                .iter()
                .skip(i + 1)
                .any(|b| agrees(a, b, threshold))
        });
        let status = if any_pair_agrees {
            FusionStatus::Disputed
        } else {
            FusionStatus::Ambiguous
        };
        (chosen, status)
    };

    let corroborating = members
        .iter()
        .filter(|member| !std::ptr::eq(**member, chosen))
        .filter(|member| overlap_ratio(&member.bbox, &chosen.bbox) >= settings.corroboration_overlap)
        .filter(|member| agrees(member, chosen, threshold))
        .count();
    // Members are sorted by confidence, so the first holds the group maximum.
    let confidence =
        (members[0].confidence + settings.corroboration_boost * corroborating as f32).min(1.0);

    let mut alternates = Vec::new();
    for member in &members {
        if std::ptr::eq(*member, chosen) || agrees(member, chosen, threshold) {
            continue;
        }
        let text = member.text.trim().to_string();
        if !alternates.contains(&text) {
            alternates.push(text);
        }
    }

    FusedSpan {
        id: 0,
        text: chosen.text.trim().to_string(),
        bbox: chosen.bbox,
        confidence,
        contributing_engines: members
            .iter()
            .map(|member| member.engine_id.clone())
            .collect(),
        status,
        alternates,
    }
}

fn agrees(a: &TextSpan, b: &TextSpan, threshold: f32) -> bool {
    normalized_edit_distance(&a.text, &b.text) < threshold
}

/// Members are already sorted by confidence, so ties in reliability rank
/// resolve to the more confident reading.
fn most_reliable<'a>(
    members: &[&'a TextSpan],
    script: Script,
    settings: &FusionSettings,
) -> &'a TextSpan {
    let ranking = settings
        .reliability
        .get(script.as_str())
        .or_else(|| settings.reliability.get(Script::Latin.as_str()));
    let rank_of = |engine_id: &str| {
        ranking
            .and_then(|list| list.iter().position(|id| id == engine_id))
            .unwrap_or(usize::MAX)
    };
    let mut best = members[0];
    for member in members.iter().skip(1) {
        if rank_of(&member.engine_id) < rank_of(&best.engine_id) {
            best = *member;
        }
    }
    best
}
