use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;

use crate::error::GenerationFault;

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status.as_u16() == 529 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("quota")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps a failed HTTP exchange onto the fault the generator retries on.
/// Waiting out `retry-after` is left to the caller's single retry.
pub(crate) fn classify_failure(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    detail: &str,
) -> GenerationFault {
    if is_rate_limited(status, detail) {
        let hint = match retry_after(headers) {
            Some(wait) => format!(" (retry after {}s)", wait.as_secs()),
            None => String::new(),
        };
        return GenerationFault::RateLimited(format!(
            "{} API error ({}): {}{}",
            provider, status, detail, hint
        ));
    }
    GenerationFault::Unavailable(format!("{} API error ({}): {}", provider, status, detail))
}
