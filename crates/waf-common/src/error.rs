//! The WAF error taxonomy (spec §7).
//!
//! Rule-compile and remote-fetch errors are never fatal — they're
//! logged and the offending item is skipped. Request-time internal
//! errors are caught at the pipeline boundary and turned into
//! fail-open `allow` decisions; `Internal` exists for exactly that
//! catch-all.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum WafError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rule '{id}' failed to compile: {reason}")]
    RuleCompile { id: String, reason: String },

    #[error("community rule fetch failed: {0}")]
    CommunityFetch(String),

    #[error("internal error during request analysis: {0}")]
    Internal(String),
}

impl WafError {
    /// Whether this error should fail startup, vs. being dropped with
    /// a warning (spec §7, class 1).
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, WafError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_compile_error_is_not_fatal() {
        let err = WafError::RuleCompile {
            id: "r1".into(),
            reason: "unbalanced parens".into(),
        };
        assert!(!err.is_fatal_at_startup());
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn config_error_is_fatal() {
        let err = WafError::Config("threshold must be >= 0".into());
        assert!(err.is_fatal_at_startup());
    }
}
