use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Failure modes of a linking run.
///
/// Anything that is merely "empty" (no candidates, no consensus rows for
/// empty input) is a normal outcome and never reported through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Invalid configuration or input shape (fewer than two maps,
    /// non-positive tolerance, zero weight sum). Raised before any work.
    Config(String),
    /// A feature's (RT, m/z) position does not fit into the spatial grid's
    /// integer cell range. The tolerances are almost certainly wrong, so the
    /// whole run is aborted rather than skipping the feature.
    GridRange { rt: f64, mz: f64 },
    /// Cancellation was requested and observed between extraction rounds.
    Cancelled,
}

impl Display for LinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Config(msg) => write!(f, "invalid linker configuration: {}", msg),
            LinkError::GridRange { rt, mz } => write!(
                f,
                "feature at rt={}, mz={} exceeds the spatial grid cell range (check tolerances)",
                rt, mz
            ),
            LinkError::Cancelled => write!(f, "linking run was cancelled"),
        }
    }
}

impl Error for LinkError {}
