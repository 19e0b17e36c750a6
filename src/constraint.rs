use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::ConstraintError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyField {
    Headline,
    Subhead,
    Cta,
    Legal,
}

impl CopyField {
    pub const ALL: [CopyField; 4] = [
        CopyField::Headline,
        CopyField::Subhead,
        CopyField::Cta,
        CopyField::Legal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CopyField::Headline => "headline",
            CopyField::Subhead => "subhead",
            CopyField::Cta => "cta",
            CopyField::Legal => "legal",
        }
    }

    pub fn default_cap(&self) -> usize {
        match self {
            CopyField::Headline => 40,
            CopyField::Subhead => 90,
            CopyField::Cta => 20,
            CopyField::Legal => 200,
        }
    }
}

impl fmt::Display for CopyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Lenient,
    #[default]
    Standard,
    Strict,
}

impl RiskMode {
    /// Minimum composite score a candidate needs to be accepted.
    pub fn threshold(&self) -> f64 {
        match self {
            RiskMode::Lenient => 0.2,
            RiskMode::Standard => 0.5,
            RiskMode::Strict => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskMode::Lenient => "lenient",
            RiskMode::Standard => "standard",
            RiskMode::Strict => "strict",
        }
    }
}

impl FromStr for RiskMode {
    type Err = ConstraintError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(RiskMode::Lenient),
            "standard" => Ok(RiskMode::Standard),
            "strict" => Ok(RiskMode::Strict),
            other => Err(ConstraintError::UnknownRiskMode(other.to_string())),
        }
    }
}

/// Serialized form of a constraint as it arrives from a job file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConstraintSpec {
    pub max_chars: BTreeMap<CopyField, usize>,
    pub banned_words: Vec<String>,
    pub must_include: Vec<String>,
    pub risk_mode: Option<String>,
    pub locale: Option<String>,
}

/// Job-scoped copy constraints. Read-only once built; share it via `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    max_chars: BTreeMap<CopyField, usize>,
    banned_words: BTreeSet<String>,
    must_include: BTreeSet<String>,
    risk_mode: RiskMode,
    locale: String,
}

impl Constraint {
    pub fn from_spec(spec: ConstraintSpec) -> Result<Self, ConstraintError> {
        let mut max_chars = BTreeMap::new();
        for field in CopyField::ALL {
            let cap = spec
                .max_chars
                .get(&field)
                .copied()
                .unwrap_or_else(|| field.default_cap());
            if cap == 0 {
                return Err(ConstraintError::ZeroCap(field.as_str()));
            }
            max_chars.insert(field, cap);
        }

        let risk_mode = match spec.risk_mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => RiskMode::default(),
        };
        let locale = match spec.locale {
            Some(locale) => {
                let locale = locale.trim().to_string();
                if locale.is_empty() {
                    return Err(ConstraintError::EmptyLocale);
                }
                locale
            }
            None => "en-US".to_string(),
        };

        Ok(Self {
            max_chars,
            banned_words: clean_terms(spec.banned_words),
            must_include: clean_terms(spec.must_include),
            risk_mode,
            locale,
        })
    }

    pub fn max_chars(&self, field: CopyField) -> usize {
        self.max_chars
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.default_cap())
    }

    pub fn banned_words(&self) -> &BTreeSet<String> {
        &self.banned_words
    }

    pub fn must_include(&self) -> &BTreeSet<String> {
        &self.must_include
    }

    pub fn risk_mode(&self) -> RiskMode {
        self.risk_mode
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self {
            max_chars: CopyField::ALL
                .iter()
                .map(|field| (*field, field.default_cap()))
                .collect(),
            banned_words: BTreeSet::new(),
            must_include: BTreeSet::new(),
            risk_mode: RiskMode::default(),
            locale: "en-US".to_string(),
        }
    }
}

fn clean_terms(terms: Vec<String>) -> BTreeSet<String> {
    terms
        .into_iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_default_caps_and_cleans_terms() {
        let spec: ConstraintSpec = toml::from_str(
            r#"
banned_words = [" Cheap ", "", "FREE"]
must_include = ["Warranty"]
risk_mode = "Strict"

[max_chars]
headline = 30
"#,
        )
        .expect("parse spec");
        let constraint = Constraint::from_spec(spec).expect("valid constraint");

        assert_eq!(constraint.max_chars(CopyField::Headline), 30);
        assert_eq!(constraint.max_chars(CopyField::Legal), 200);
        assert_eq!(
            constraint.banned_words().iter().cloned().collect::<Vec<_>>(),
            vec!["cheap".to_string(), "free".to_string()]
        );
        assert!(constraint.must_include().contains("warranty"));
        assert_eq!(constraint.risk_mode(), RiskMode::Strict);
        assert_eq!(constraint.locale(), "en-US");
    }

    #[test]
    fn rejects_invalid_specs() {
        let mut spec = ConstraintSpec::default();
        spec.max_chars.insert(CopyField::Cta, 0);
        assert_eq!(
            Constraint::from_spec(spec),
            Err(ConstraintError::ZeroCap("cta"))
        );

        let spec = ConstraintSpec {
            risk_mode: Some("yolo".to_string()),
            ..ConstraintSpec::default()
        };
        assert_eq!(
            Constraint::from_spec(spec),
            Err(ConstraintError::UnknownRiskMode("yolo".to_string()))
        );

        let spec = ConstraintSpec {
            locale: Some("  ".to_string()),
            ..ConstraintSpec::default()
        };
        assert_eq!(Constraint::from_spec(spec), Err(ConstraintError::EmptyLocale));
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(RiskMode::Lenient.threshold(), 0.2);
        assert_eq!(RiskMode::Standard.threshold(), 0.5);
        assert_eq!(RiskMode::Strict.threshold(), 0.8);
    }
}
