use flicker_core::LayerId;
use thiserror::Error;

/// Failures local to trial setup. All are raised synchronously from
/// `new`/`begin`/`simulate`, before any cycle timing starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrialError {
    #[error("stimulus for layer `{0}` is missing or empty")]
    MissingStimulus(LayerId),

    #[error("stimulus phase duration must be positive")]
    NonPositiveDuration,

    #[error("response target region `{0}` is not present in the surface layout")]
    MissingTarget(String),
}
