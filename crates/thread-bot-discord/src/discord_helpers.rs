use std::time::Duration;

use thread_bot_engine::TransportError;

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds.min(3_600.0)))
}

pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms
        .max(1)
        .saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(30_000))
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub(crate) fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Parses a snowflake id carried as a JSON string.
pub(crate) fn parse_snowflake(
    operation: &str,
    field: &'static str,
    raw: &str,
) -> Result<u64, TransportError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| TransportError::Decode {
            operation: operation.to_string(),
            message: format!("{field} is not a snowflake: '{}'", truncate_for_error(raw, 40)),
        })
}
