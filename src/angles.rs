use serde::Serialize;
use std::fmt;

/// The fixed strategic angles, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Angle {
    BenefitLed,
    Urgency,
    SocialProof,
    Humor,
    ProblemSolution,
    Curiosity,
    Authority,
    Value,
}

impl Angle {
    pub const ALL: [Angle; 8] = [
        Angle::BenefitLed,
        Angle::Urgency,
        Angle::SocialProof,
        Angle::Humor,
        Angle::ProblemSolution,
        Angle::Curiosity,
        Angle::Authority,
        Angle::Value,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Angle::BenefitLed => "benefit_led",
            Angle::Urgency => "urgency",
            Angle::SocialProof => "social_proof",
            Angle::Humor => "humor",
            Angle::ProblemSolution => "problem_solution",
            Angle::Curiosity => "curiosity",
            Angle::Authority => "authority",
            Angle::Value => "value",
        }
    }

    /// Lower is preferred when composite scores tie.
    pub fn priority(&self) -> usize {
        *self as usize
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Angle::BenefitLed => "Lead with the single clearest benefit the customer gets.",
            Angle::Urgency => {
                "Create honest time pressure; never invent deadlines the offer does not state."
            }
            Angle::SocialProof => {
                "Lean on what other customers love, without fabricating numbers or reviews."
            }
            Angle::Humor => "Be light and witty while staying on brand and easy to read.",
            Angle::ProblemSolution => "Name a real everyday problem, then show the product solving it.",
            Angle::Curiosity => "Open a small question the reader wants answered by clicking.",
            Angle::Authority => "Speak with calm expertise about quality and craftsmanship.",
            Angle::Value => "Make the price-to-quality trade-off obvious and fair.",
        }
    }

    /// Sampling temperature for this angle around `base`.
    pub fn temperature(&self, base: f32) -> f32 {
        let offset = match self {
            Angle::Humor | Angle::Curiosity => 0.2,
            Angle::Authority | Angle::Value => -0.1,
            _ => 0.0,
        };
        (base + offset).clamp(0.0, 1.5)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
