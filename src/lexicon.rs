//! Word-level helpers shared by zone classification, semantics and guardrails.

/// Lowercases and collapses every non-alphanumeric run into a single space.
/// Hyphens and apostrophes inside a word are kept.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let chars = text.chars().collect::<Vec<_>>();
    for (idx, ch) in chars.iter().enumerate() {
        let joiner = (*ch == '-' || *ch == '\'')
            && idx > 0
            && chars[idx - 1].is_alphanumeric()
            && chars.get(idx + 1).is_some_and(|next| next.is_alphanumeric());
        if ch.is_alphanumeric() || joiner {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

pub fn tokens(text: &str) -> Vec<String> {
    normalize_text(text)
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Light suffix stripping so "warranties" and "warranty" compare equal.
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    let chars = lower.chars().count();
    if let Some(base) = lower.strip_suffix("ies") {
        if chars > 4 {
            return format!("{}y", base);
        }
    }
    for suffix in ["ing", "edly", "ed", "es", "ly", "er", "est", "s"] {
        if let Some(base) = lower.strip_suffix(suffix) {
            if base.chars().count() >= 3 && !lower.ends_with("ss") {
                return base.to_string();
            }
        }
    }
    lower
}

/// True when `term` occurs in `text` as a whole (possibly multi-word)
/// phrase, comparing stems so inflected forms match.
pub fn contains_term(text: &str, term: &str) -> bool {
    let haystack = tokens(text).iter().map(|t| stem(t)).collect::<Vec<_>>();
    let needle = tokens(term).iter().map(|t| stem(t)).collect::<Vec<_>>();
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

/// Like [`contains_term`], but also matches raw substrings for cues that
/// carry symbols ("*", "t&c") and would vanish under normalization.
pub fn contains_cue(text: &str, cue: &str) -> bool {
    if tokens(cue).is_empty() {
        let cue = cue.trim();
        return !cue.is_empty() && text.contains(cue);
    }
    if cue.chars().any(|ch| !ch.is_alphanumeric() && !ch.is_whitespace() && ch != '-') {
        return text.to_lowercase().contains(&cue.to_lowercase());
    }
    contains_term(text, cue)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(normalize_text("  Shop NOW!! "), "shop now");
        assert_eq!(normalize_text("Body-safe, doesn't fade"), "body-safe doesn't fade");
        assert_eq!(normalize_text("- 50% -"), "50");
    }

    #[test]
    fn stems_common_inflections() {
        assert_eq!(stem("warranties"), "warranty");
        assert_eq!(stem("Warranty"), "warranty");
        assert_eq!(stem("cheaper"), "cheap");
        assert_eq!(stem("glowing"), "glow");
        assert_eq!(stem("less"), "less");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn matches_whole_phrases_only() {
        assert!(contains_term("Two-year warranties included", "warranty"));
        assert!(contains_term("Limited time only", "limited time"));
        assert!(!contains_term("cheapskate deals", "cheap"));
        assert!(!contains_term("", "cheap"));
        assert!(!contains_term("anything", "   "));
    }

    #[test]
    fn symbol_cues_match_raw_text() {
        assert!(contains_cue("Offer valid till Sunday*", "*"));
        assert!(contains_cue("See T&C for details", "t&c"));
        assert!(contains_cue("Terms apply", "terms"));
        assert!(!contains_cue("Plain headline", "*"));
    }
}
