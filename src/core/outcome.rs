use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;

/// Failure taxonomy shared by every scoring component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed opportunity/company fields
    Input,
    /// Embedding generation failed or timed out
    Provider,
    /// Weight lookup failed
    Config,
    /// Unexpected failure inside a scorer
    Internal,
}

/// Errors raised inside the scoring core. They never escape a component
/// entry point; see [`ComponentOutcome`].
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal scoring error: {0}")]
    Internal(String),
}

impl ScoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::Input(_) => ErrorKind::Input,
            ScoringError::Provider(_) => ErrorKind::Provider,
            ScoringError::Config(_) => ErrorKind::Config,
            ScoringError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Wire status emitted with every component result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Ok,
    NoData,
    FallbackUsed,
    Error,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Ok => "ok",
            ComponentStatus::NoData => "no_data",
            ComponentStatus::FallbackUsed => "fallback_used",
            ComponentStatus::Error => "error",
        }
    }
}

/// Why a component produced a degraded score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    NoData,
    FallbackUsed,
}

/// Typed result of a single scoring component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComponentOutcome {
    Ok { score: f64 },
    Degraded { score: f64, reason: DegradeReason },
    Failed { kind: ErrorKind, message: String },
}

impl ComponentOutcome {
    pub fn ok(score: f64) -> Self {
        ComponentOutcome::Ok { score: clamp_unit(score) }
    }

    pub fn no_data(score: f64) -> Self {
        ComponentOutcome::Degraded {
            score: clamp_unit(score),
            reason: DegradeReason::NoData,
        }
    }

    pub fn fallback(score: f64) -> Self {
        ComponentOutcome::Degraded {
            score: clamp_unit(score),
            reason: DegradeReason::FallbackUsed,
        }
    }

    pub fn failed(err: &ScoringError) -> Self {
        ComponentOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Score contributed to the weighted sum. Failures contribute zero.
    pub fn score(&self) -> f64 {
        match self {
            ComponentOutcome::Ok { score } | ComponentOutcome::Degraded { score, .. } => *score,
            ComponentOutcome::Failed { .. } => 0.0,
        }
    }

    pub fn status(&self) -> ComponentStatus {
        match self {
            ComponentOutcome::Ok { .. } => ComponentStatus::Ok,
            ComponentOutcome::Degraded { reason: DegradeReason::NoData, .. } => ComponentStatus::NoData,
            ComponentOutcome::Degraded { reason: DegradeReason::FallbackUsed, .. } => {
                ComponentStatus::FallbackUsed
            }
            ComponentOutcome::Failed { .. } => ComponentStatus::Error,
        }
    }
}

/// Component result as it appears in `Match.component_scores`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub score: f64,
    pub status: ComponentStatus,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub processing_time_ms: f64,
}

impl ComponentScore {
    pub fn from_outcome(outcome: &ComponentOutcome, processing_time_ms: f64) -> Self {
        let error = match outcome {
            ComponentOutcome::Failed { message, .. } => Some(message.clone()),
            _ => None,
        };
        Self {
            score: outcome.score(),
            status: outcome.status(),
            weight: 0.0,
            error,
            details: None,
            processing_time_ms,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Milliseconds elapsed since `start`
#[inline]
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Run a pure scorer behind a panic boundary
///
/// A panic is logged and surfaced as [`ScoringError::Internal`] so the
/// caller can convert it to an `error` component status.
pub fn guarded<T>(component: &str, f: impl FnOnce() -> T) -> Result<T, ScoringError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("{} scorer panicked: {}", component, message);
        ScoringError::Internal(format!("{component}: {message}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status_mapping() {
        assert_eq!(ComponentOutcome::ok(0.5).status(), ComponentStatus::Ok);
        assert_eq!(ComponentOutcome::no_data(0.5).status(), ComponentStatus::NoData);
        assert_eq!(ComponentOutcome::fallback(0.2).status(), ComponentStatus::FallbackUsed);

        let failed = ComponentOutcome::failed(&ScoringError::Internal("boom".into()));
        assert_eq!(failed.status(), ComponentStatus::Error);
        assert_eq!(failed.score(), 0.0);
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(ComponentOutcome::ok(1.7).score(), 1.0);
        assert_eq!(ComponentOutcome::ok(-0.2).score(), 0.0);
        assert_eq!(ComponentOutcome::ok(f64::NAN).score(), 0.0);
    }

    #[test]
    fn test_guarded_catches_panic() {
        let result: Result<f64, _> = guarded("test", || panic!("bad table"));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("bad table"));

        assert_eq!(guarded("test", || 0.25).unwrap(), 0.25);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ComponentStatus::FallbackUsed).unwrap(),
            "\"fallback_used\""
        );
        assert_eq!(serde_json::to_string(&ComponentStatus::NoData).unwrap(), "\"no_data\"");
    }
}
