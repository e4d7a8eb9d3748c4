// =============================================================================
// Error taxonomy — cause-oriented, one variant per named failure mode
// =============================================================================
//
// Every pipeline stage returns `Result<T, FlowgateError>`. The Orchestrator and
// Pipeline never let one of these escape as a panic or bare crash: each variant
// is downgraded into a REJECT/HOLD decision or a `PipelineFailure` audit row by
// the caller. The variant name doubles as the audit "stage" tag.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowgateError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("duplicate signal (fingerprint {0})")]
    DuplicateSignal(String),

    #[error("market context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("GEX service unavailable: {0}")]
    GexUnavailable(String),

    #[error("rejected by risk manager: {0}")]
    RiskRejection(String),

    #[error("would exceed max total exposure")]
    ExposureExceeded,

    #[error("computed position size below minimum")]
    SizingBelowMinimum,

    #[error("adapter submit failed: {0}")]
    AdapterSubmitFailure(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),
}

impl FlowgateError {
    /// Stable stage tag used in audit rows and `PipelineFailure` records.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "parse",
            Self::ValidationError(_) => "validate",
            Self::DuplicateSignal(_) => "dedup",
            Self::ContextUnavailable(_) => "context",
            Self::GexUnavailable(_) => "gex",
            Self::RiskRejection(_) => "risk",
            Self::ExposureExceeded => "exposure",
            Self::SizingBelowMinimum => "sizing",
            Self::AdapterSubmitFailure(_) => "adapter",
            Self::PersistenceError(_) => "persistence",
        }
    }

    /// Whether this error is recoverable by continuing with a degraded value
    /// rather than aborting the decision (GEX is the only such cause per §7).
    pub fn is_degrade_only(&self) -> bool {
        matches!(self, Self::GexUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tags_are_stable() {
        assert_eq!(FlowgateError::ParseError("x".into()).stage(), "parse");
        assert_eq!(FlowgateError::ExposureExceeded.stage(), "exposure");
        assert_eq!(FlowgateError::SizingBelowMinimum.stage(), "sizing");
    }

    #[test]
    fn gex_unavailable_is_degrade_only() {
        assert!(FlowgateError::GexUnavailable("timeout".into()).is_degrade_only());
        assert!(!FlowgateError::ContextUnavailable("timeout".into()).is_degrade_only());
    }
}
