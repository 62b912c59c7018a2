//! Error Code Mapping
//!
//! Maps the taxonomy codes a device confirmation can report back into
//! [`MatchError`] variants, and provides recovery hints per code.

use crate::error::{ErrorKind, MatchError};
use crate::protocol::{DeviceResponse, Strategy};

/// Maps a device-side error code and message to a `MatchError`.
///
/// `strategy` and `budget_ms` describe the attempt that produced the response
/// and are used for codes that carry them.
pub fn map_device_error(
    code: &str,
    message: &str,
    strategy: Strategy,
    budget_ms: u64,
) -> MatchError {
    match code {
        "NO_MATCH" | "ELEMENT_NOT_FOUND" => MatchError::no_match(message),
        "MULTI_MATCH_AMBIGUOUS" => MatchError::MultiMatchAmbiguous {
            count: extract_count(message),
            candidates: vec![],
        },
        "LOW_CONFIDENCE" => MatchError::LowConfidence {
            confidence: 0.0,
            threshold: 0.0,
        },
        "FINGERPRINT_MISS" => MatchError::FingerprintMiss {
            best_similarity: 0.0,
            threshold: 0.0,
        },
        "INVALID_CRITERIA" | "INVALID_PARAMS" => MatchError::InvalidCriteria(message.to_string()),
        "TIME_BUDGET_EXCEEDED" | "TIMEOUT" => MatchError::TimeBudgetExceeded {
            strategy,
            budget_ms,
        },
        // Fallback for unknown codes
        _ => MatchError::no_match(format!("[{}] {}", code, message)),
    }
}

/// Turn a failed device response into a `MatchError`; `None` when `ok`.
pub fn map_device_response(
    resp: &DeviceResponse,
    strategy: Strategy,
    budget_ms: u64,
) -> Option<MatchError> {
    if resp.ok {
        return None;
    }
    let code = resp.code.as_deref().unwrap_or("NO_MATCH");
    Some(map_device_error(code, &resp.message, strategy, budget_ms))
}

/// Returns a recovery hint for the given error kind.
pub fn hint_for_kind(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NoMatch => "Refresh the snapshot or relax the criteria fields",
        ErrorKind::MultiMatchAmbiguous => {
            "Add a discriminating field (resource-id, text) or pick a selection mode"
        }
        ErrorKind::LowConfidence => "Review the candidate and lower the confidence gate if acceptable",
        ErrorKind::FingerprintMiss => {
            "The original element changed; re-select it or enable fallback to first"
        }
        ErrorKind::InvalidCriteria => "Select at least one field with a non-empty value",
        ErrorKind::TimeBudgetExceeded => "Increase the strategy time budget or check the device link",
        ErrorKind::Cancelled => "Resolution was superseded; retry against the latest snapshot",
    }
}

/// Pull the first integer out of a message like "3 elements matched".
fn extract_count(message: &str) -> usize {
    message
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_no_match() {
        let err = map_device_error("NO_MATCH", "nothing", Strategy::Standard, 1000);
        assert_eq!(err.kind(), ErrorKind::NoMatch);
        let err = map_device_error("ELEMENT_NOT_FOUND", "gone", Strategy::Standard, 1000);
        assert_eq!(err.kind(), ErrorKind::NoMatch);
    }

    #[test]
    fn test_map_ambiguous_extracts_count() {
        let err = map_device_error(
            "MULTI_MATCH_AMBIGUOUS",
            "3 elements matched",
            Strategy::Relaxed,
            1000,
        );
        assert!(matches!(err, MatchError::MultiMatchAmbiguous { count: 3, .. }));
    }

    #[test]
    fn test_map_timeout_carries_strategy() {
        let err = map_device_error("TIMEOUT", "device slow", Strategy::XpathDirect, 800);
        assert_eq!(
            err,
            MatchError::TimeBudgetExceeded {
                strategy: Strategy::XpathDirect,
                budget_ms: 800
            }
        );
    }

    #[test]
    fn test_map_unknown_code_fallback() {
        let err = map_device_error("SOME_NEW_CODE", "Something happened", Strategy::Custom, 0);
        match err {
            MatchError::NoMatch { message, .. } => {
                assert!(message.contains("SOME_NEW_CODE"));
                assert!(message.contains("Something happened"));
            }
            _ => panic!("Expected NoMatch"),
        }
    }

    #[test]
    fn test_map_response() {
        assert!(map_device_response(&DeviceResponse::ok("fine"), Strategy::Standard, 0).is_none());
        let resp = DeviceResponse::failed("INVALID_CRITERIA", "no fields");
        let err = map_device_response(&resp, Strategy::Standard, 0).unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidCriteria);
    }

    #[test]
    fn test_hints_cover_every_kind() {
        assert!(hint_for_kind(ErrorKind::InvalidCriteria).contains("non-empty"));
        assert!(hint_for_kind(ErrorKind::TimeBudgetExceeded).contains("budget"));
    }
}
