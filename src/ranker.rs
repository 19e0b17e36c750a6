use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::angles::Angle;
use crate::candidate::Candidate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub candidate_id: usize,
    pub angle: Angle,
    pub final_score: f64,
    pub rank: usize,
}

/// Most candidates one angle may hold in a selection of `n`.
pub fn per_angle_cap(n: usize) -> usize {
    n.div_ceil(4).max(1)
}

/// Picks up to `n` accepted candidates by composite score, breaking ties by
/// angle priority then generation order, with a per-angle cap.
pub fn rank_candidates(candidates: &[Candidate], n: usize) -> Vec<Selection> {
    let mut accepted = candidates
        .iter()
        .filter(|candidate| candidate.is_accepted())
        .collect::<Vec<_>>();
    accepted.sort_by(|a, b| {
        b.scores()
            .composite
            .partial_cmp(&a.scores().composite)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.angle().priority().cmp(&b.angle().priority()))
            .then_with(|| a.id().cmp(&b.id()))
    });

    let cap = per_angle_cap(n);
    let mut per_angle: HashMap<Angle, usize> = HashMap::new();
    let mut selections = Vec::new();
    for candidate in accepted {
        if selections.len() >= n {
            break;
        }
        let used = per_angle.entry(candidate.angle()).or_insert(0);
        if *used >= cap {
            continue;
        }
        *used += 1;
        selections.push(Selection {
            candidate_id: candidate.id(),
            angle: candidate.angle(),
            final_score: candidate.scores().composite,
            rank: selections.len() + 1,
        });
    }
    selections
}
