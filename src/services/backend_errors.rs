//! Heuristic classification of agent backend error messages.

/// What a backend error message most likely means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The requested model cannot serve the call; try the next candidate.
    ModelUnavailable,
    /// Credentials were rejected; nothing further can succeed.
    Authentication,
    /// Anything else, treated as an ordinary task failure.
    Other,
}

const AUTH_VOCABULARY: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "authentication",
    "invalid api key",
    "invalid token",
    "forbidden",
];

/// HTTP statuses that mean rejected credentials, matched as whole tokens.
const AUTH_STATUS_CODES: &[&str] = &["401", "403"];

const MODEL_UNAVAILABLE_VOCABULARY: &[&str] = &[
    "unavailable",
    "not available",
    "not found",
    "does not exist",
    "unknown model",
    "no such model",
    "unsupported model",
];

impl BackendErrorKind {
    /// Authentication vocabulary wins over model vocabulary.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let status_code = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| AUTH_STATUS_CODES.contains(&token));
        if status_code || AUTH_VOCABULARY.iter().any(|w| lower.contains(w)) {
            Self::Authentication
        } else if MODEL_UNAVAILABLE_VOCABULARY.iter().any(|w| lower.contains(w)) {
            Self::ModelUnavailable
        } else {
            Self::Other
        }
    }
}

/// True when `message` reads like a "model unavailable" failure.
pub fn is_model_unavailable(message: &str) -> bool {
    BackendErrorKind::classify(message) == BackendErrorKind::ModelUnavailable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_unavailable_vocabulary() {
        assert!(is_model_unavailable("Model m1 is currently unavailable"));
        assert!(is_model_unavailable("model 'gpt-x' not found"));
        assert!(is_model_unavailable("The model `m2` does not exist"));
        assert!(!is_model_unavailable("rate limit exceeded"));
    }

    #[test]
    fn test_authentication_wins() {
        assert_eq!(
            BackendErrorKind::classify("401 Unauthorized: token not found"),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            BackendErrorKind::classify("Authentication failed"),
            BackendErrorKind::Authentication
        );
    }

    #[test]
    fn test_status_codes_match_whole_tokens() {
        assert_eq!(
            BackendErrorKind::classify("HTTP 403 from upstream"),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            BackendErrorKind::classify("status=401"),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            BackendErrorKind::classify("tool run failed: expected 4012 rows, got 0"),
            BackendErrorKind::Other
        );
        assert_eq!(
            BackendErrorKind::classify("request id a401b failed"),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn test_other_errors() {
        assert_eq!(
            BackendErrorKind::classify("connection reset by peer"),
            BackendErrorKind::Other
        );
    }
}
