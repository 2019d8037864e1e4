//! Mapping an aggregate score to a result status.

use evalloop_core::ResultStatus;
use serde::{Deserialize, Serialize};

use crate::JudgeError;

/// How a mean score becomes `detected` or `no_detection`.
///
/// Scores are oriented so that higher is better: a low mean means a problem
/// was detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Round half away from zero, then 0 is `detected` and 1 is `no_detection`.
    /// Any other rounded value is unmapped.
    #[default]
    Rounded,
    /// `mean >= cutoff` is `no_detection`. The mean must lie in `[0, 1]`.
    Cutoff { cutoff: f64 },
}

impl StatusPolicy {
    /// Checks that a cutoff is a finite value in `[0, 1]`.
    pub fn validate(&self) -> Result<(), JudgeError> {
        match *self {
            StatusPolicy::Cutoff { cutoff } if !(0.0..=1.0).contains(&cutoff) => {
                Err(JudgeError::InvalidPolicy { cutoff })
            }
            _ => Ok(()),
        }
    }

    pub fn status(&self, mean: f64) -> Result<ResultStatus, JudgeError> {
        self.validate()?;
        if !mean.is_finite() {
            return Err(JudgeError::UnmappedStatus { mean });
        }

        match *self {
            StatusPolicy::Rounded => {
                let rounded = mean.round();
                if rounded == 0.0 {
                    Ok(ResultStatus::Detected)
                } else if rounded == 1.0 {
                    Ok(ResultStatus::NoDetection)
                } else {
                    Err(JudgeError::UnmappedStatus { mean })
                }
            }
            StatusPolicy::Cutoff { cutoff } => {
                if !(0.0..=1.0).contains(&mean) {
                    return Err(JudgeError::UnmappedStatus { mean });
                }
                if mean >= cutoff {
                    Ok(ResultStatus::NoDetection)
                } else {
                    Ok(ResultStatus::Detected)
                }
            }
        }
    }
}
