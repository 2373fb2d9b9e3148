//! Named solver termination statuses.

use std::fmt;

/// Outcome of a solve, mirroring the return statuses of an interior-point
/// NLP solver. The `Display` form is the stable wire spelling stored on
/// the model after a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    Success,
    MaxIterExceeded,
    CpuTimeExceeded,
    StopAtTinyStep,
    StopAtAcceptablePoint,
    LocalInfeasibility,
    UserRequestedStop,
    DivergingIterates,
    RestorationFailure,
    ErrorInStepComputation,
    InvalidNumberDetected,
    InternalError,
    Unknown,
}

impl SolveStatus {
    /// Whether the solve ended at an acceptable point.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SolveStatus::Success | SolveStatus::StopAtAcceptablePoint
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Success => "SUCCESS",
            SolveStatus::MaxIterExceeded => "MAXITER_EXCEEDED",
            SolveStatus::CpuTimeExceeded => "CPUTIME_EXCEEDED",
            SolveStatus::StopAtTinyStep => "STOP_AT_TINY_STEP",
            SolveStatus::StopAtAcceptablePoint => "STOP_AT_ACCEPTABLE_POINT",
            SolveStatus::LocalInfeasibility => "LOCAL_INFEASIBILITY",
            SolveStatus::UserRequestedStop => "USER_REQUESTED_STOP",
            SolveStatus::DivergingIterates => "DIVERGING_ITERATES",
            SolveStatus::RestorationFailure => "RESTORATION_FAILURE",
            SolveStatus::ErrorInStepComputation => "ERROR_IN_STEP_COMPUTATION",
            SolveStatus::InvalidNumberDetected => "INVALID_NUMBER_DETECTED",
            SolveStatus::InternalError => "INTERNAL_ERROR",
            SolveStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}
