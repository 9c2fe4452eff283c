//! Retry policy and response classification for backend calls.

use std::time::Duration;

use pincer_types::config::TransportConfig;
use pincer_types::llm::LlmError;

/// Body fragments that mark a backend as overloaded, whatever the status.
pub const OVERLOAD_MARKERS: [&str; 2] = ["overloaded", "engine_overloaded"];

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl From<&TransportConfig> for RetryPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Turn a raw HTTP outcome into the body to parse or a classified error.
pub fn classify_response(status: u16, body: String) -> Result<String, LlmError> {
    if (200..300).contains(&status) {
        if is_error_envelope(&body) {
            if has_overload_marker(&body) {
                return Err(LlmError::Overloaded { status, body });
            }
            return Err(LlmError::Status { status, body });
        }
        return Ok(body);
    }

    match status {
        401 | 403 => Err(LlmError::Authentication { status, body }),
        529 => Err(LlmError::Overloaded { status, body }),
        _ if has_overload_marker(&body) => Err(LlmError::Overloaded { status, body }),
        _ => Err(LlmError::Status { status, body }),
    }
}

fn has_overload_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    OVERLOAD_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A 2xx body carrying an `error` object instead of `choices`.
fn is_error_envelope(body: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => {
            map.contains_key("error") && !map.contains_key("choices")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_policy_from_config() {
        let config = TransportConfig {
            max_retries: 5,
            base_backoff_ms: 100,
            request_timeout_secs: 30,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_success_passes_body_through() {
        let body = r#"{"choices":[]}"#.to_string();
        assert_eq!(classify_response(200, body.clone()).unwrap(), body);
    }

    #[test]
    fn test_success_status_with_overload_envelope_is_retryable() {
        let body = r#"{"error":{"type":"engine_overloaded","message":"try later"}}"#;
        let err = classify_response(200, body.to_string()).unwrap_err();
        assert!(matches!(err, LlmError::Overloaded { status: 200, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_success_with_choices_mentioning_overloaded_is_ok() {
        let body = r#"{"choices":[{"message":{"content":"the server was overloaded"}}]}"#;
        assert!(classify_response(200, body.to_string()).is_ok());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_response(401, "no".into()),
            Err(LlmError::Authentication { status: 401, .. })
        ));
        assert!(matches!(
            classify_response(403, "no".into()),
            Err(LlmError::Authentication { status: 403, .. })
        ));
        assert!(matches!(
            classify_response(529, String::new()),
            Err(LlmError::Overloaded { status: 529, .. })
        ));
        assert!(matches!(
            classify_response(400, r#"{"error":"Overloaded"}"#.into()),
            Err(LlmError::Overloaded { status: 400, .. })
        ));

        let err = classify_response(422, "bad tool schema".into()).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("bad tool schema"));
    }
}
