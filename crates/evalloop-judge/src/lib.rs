//! LLM-as-judge monitoring for evalloop.
//!
//! A [`Judge`] scores every (question, answer) pair of a monitoring window
//! with a [`Grader`](evalloop_core::Grader), the mean score is mapped to a
//! [`ResultStatus`](evalloop_core::ResultStatus) by a [`StatusPolicy`], and
//! [`JudgeApplication`] wires both into a monitoring pass that logs the
//! scored table as a tagged artifact.
//!
//! # Example
//!
//! ```rust
//! use evalloop_judge::{sanitize_tag, StatusPolicy};
//! use evalloop_core::ResultStatus;
//!
//! assert_eq!(sanitize_tag("2024-01-01 12:00:00+00:00"), "2024-01-01-12-00-00-00-00");
//! assert_eq!(StatusPolicy::Rounded.status(0.3).unwrap(), ResultStatus::Detected);
//! ```

mod app;
mod context;
mod judge;
mod status;
mod tag;

pub use app::{JudgeApplication, MonitoringApplication, MonitoringContext, APPLICATION_NAME};
pub use context::StoreContext;
pub use judge::{aggregate, validate_sample, Judge, JudgeOutcome, RowFailure, RowFailurePolicy};
pub use status::StatusPolicy;
pub use tag::{format_infer_time, now_infer_time, sanitize_tag};

use evalloop_core::AgentError;
use thiserror::Error;

/// Errors from a judging pass.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// No rows to judge, or every row failed under the skip policy.
    #[error("Empty batch: nothing to judge")]
    EmptyBatch,

    /// A sample row has a blank question or answer.
    #[error("Sample row {index} has an empty {field}")]
    InvalidSample { index: usize, field: &'static str },

    /// The mean score does not map to a status.
    #[error("Mean score {mean} does not map to a status")]
    UnmappedStatus { mean: f64 },

    /// A status policy with a cutoff outside `[0, 1]`.
    #[error("Invalid status policy: cutoff {cutoff} is not within [0, 1]")]
    InvalidPolicy { cutoff: f64 },

    /// The grader failed on a row.
    #[error("Grading row {index} failed: {source}")]
    Grading {
        index: usize,
        #[source]
        source: AgentError,
    },

    /// Logging the scored table or the result failed.
    #[error("Artifact error: {0}")]
    Artifact(String),
}

impl From<evalloop_monitor::StoreError> for JudgeError {
    fn from(err: evalloop_monitor::StoreError) -> Self {
        JudgeError::Artifact(err.to_string())
    }
}
