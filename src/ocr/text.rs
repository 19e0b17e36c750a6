use serde::Serialize;

/// Comparison form for recognized text: lowercase with whitespace collapsed.
pub fn normalize_for_compare(text: &str) -> String {
    text.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev = (0..=b.len()).collect::<Vec<_>>();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Edit distance over normalized text divided by the longer length.
pub fn normalized_edit_distance(a: &str, b: &str) -> f32 {
    let a = normalize_for_compare(a);
    let b = normalize_for_compare(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    levenshtein(&a, &b) as f32 / longest as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Latin,
    Devanagari,
    Cjk,
    Arabic,
    Cyrillic,
}

impl Script {
    pub fn as_str(&self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Devanagari => "devanagari",
            Script::Cjk => "cjk",
            Script::Arabic => "arabic",
            Script::Cyrillic => "cyrillic",
        }
    }

    pub fn from_locale(locale: &str) -> Self {
        let lang = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "hi" | "mr" | "ne" => Script::Devanagari,
            "ja" | "zh" | "ko" => Script::Cjk,
            "ar" | "fa" | "ur" => Script::Arabic,
            "ru" | "uk" | "bg" => Script::Cyrillic,
            _ => Script::Latin,
        }
    }

    /// Script of the majority of alphabetic characters, if any.
    pub fn dominant(text: &str) -> Option<Self> {
        let mut counts = [0usize; 5];
        for ch in text.chars() {
            let code = ch as u32;
            let script = match code {
                0x0900..=0x097F => Script::Devanagari,
                0x3040..=0x30FF | 0x31F0..=0x31FF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF => {
                    Script::Cjk
                }
                0x0600..=0x06FF => Script::Arabic,
                0x0400..=0x04FF => Script::Cyrillic,
                _ if ch.is_alphabetic() => Script::Latin,
                _ => continue,
            };
            counts[script as usize] += 1;
        }
        let (idx, count) = counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
        if *count == 0 {
            return None;
        }
        Some(match idx {
            0 => Script::Latin,
            1 => Script::Devanagari,
            2 => Script::Cjk,
            3 => Script::Arabic,
            _ => Script::Cyrillic,
        })
    }
}

pub(crate) fn join_inline(left: &str, right: &str) -> String {
    if needs_space(left, right) {
        format!("{} {}", left.trim_end(), right.trim_start())
    } else {
        format!("{}{}", left.trim_end(), right.trim_start())
    }
}

fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => !(is_cjk(a) && is_cjk(b)),
        _ => false,
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32, 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x4E00..=0x9FFF)
}

/// Length-weighted mean of two confidences.
pub(crate) fn merge_conf(a: f32, a_len: usize, b: f32, b_len: usize) -> f32 {
    let total = (a_len + b_len).max(1) as f32;
    (a * a_len as f32 + b * b_len as f32) / total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn normalized_distance_ignores_case_and_spacing() {
        assert_eq!(normalized_edit_distance("SALE  Now", "sale now"), 0.0);
        let d = normalized_edit_distance("50% OFF", "5O% OFF");
        assert!(d > 0.0 && d < 0.3);
        assert_eq!(normalized_edit_distance("", ""), 0.0);
    }

    #[test]
    fn scripts_from_locale_and_text() {
        assert_eq!(Script::from_locale("en-US"), Script::Latin);
        assert_eq!(Script::from_locale("hi_IN"), Script::Devanagari);
        assert_eq!(Script::from_locale("ja"), Script::Cjk);
        assert_eq!(Script::dominant("नमस्ते दुनिया"), Some(Script::Devanagari));
        assert_eq!(Script::dominant("Big SALE"), Some(Script::Latin));
        assert_eq!(Script::dominant("50% 123"), None);
    }

    #[test]
    fn joins_words_and_weights_confidence() {
        assert_eq!(join_inline("Shop", "now"), "Shop now");
        assert_eq!(join_inline("今日", "限定"), "今日限定");
        assert!((merge_conf(0.9, 3, 0.6, 1) - 0.825).abs() < 1e-6);
    }
}
