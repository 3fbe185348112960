use std::fmt;

use crate::config::PolicyConfig;
use crate::remote::Item;
use crate::GIB;

/// Which eligibility check rejected an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    State(String),
    Category(String),
    Size { size_gb: f64, min_gb: f64 },
    Ratio { ratio: f64, min: f64 },
    Upload { uploaded_gb: f64, min_gb: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::State(state) => write!(f, "state {} is not a seeding state", state),
            Rejection::Category(category) => write!(f, "category '{}' is filtered", category),
            Rejection::Size { size_gb, min_gb } => {
                write!(f, "size {:.2} GB below minimum {:.2} GB", size_gb, min_gb)
            }
            Rejection::Ratio { ratio, min } => {
                write!(f, "ratio {:.2} below minimum {:.2}", ratio, min)
            }
            Rejection::Upload { uploaded_gb, min_gb } => {
                write!(f, "upload {:.2} GB below minimum {:.2} GB", uploaded_gb, min_gb)
            }
        }
    }
}

impl Rejection {
    /// Short tag naming the failed check.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::State(_) => "state",
            Rejection::Category(_) => "category",
            Rejection::Size { .. } => "size",
            Rejection::Ratio { .. } => "ratio",
            Rejection::Upload { .. } => "upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Eligible,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Verdict::Eligible)
    }

    pub fn reason(&self) -> String {
        match self {
            Verdict::Eligible => "OK".to_string(),
            Verdict::Rejected(rejection) => rejection.to_string(),
        }
    }
}

/// Decide whether a source item qualifies for replication.
///
/// Checks run in a fixed order and stop at the first failure: state,
/// category, size, ratio, upload. An unset threshold always passes.
pub fn eligible(item: &Item, policy: &PolicyConfig) -> Verdict {
    if policy.only_seeding_states && !policy.seeding_states.iter().any(|s| *s == item.state) {
        return Verdict::Rejected(Rejection::State(item.state.clone()));
    }

    if !policy.allows_category(&item.category) {
        return Verdict::Rejected(Rejection::Category(item.category.clone()));
    }

    if let Some(min_gb) = policy.min_size_gb {
        let size_gb = item.size_bytes as f64 / GIB;
        if size_gb < min_gb {
            return Verdict::Rejected(Rejection::Size { size_gb, min_gb });
        }
    }

    if let Some(min) = policy.min_ratio {
        if item.ratio < min {
            return Verdict::Rejected(Rejection::Ratio {
                ratio: item.ratio,
                min,
            });
        }
    }

    if let Some(min_gb) = policy.min_upload_gb {
        let uploaded_gb = item.uploaded_bytes as f64 / GIB;
        if uploaded_gb < min_gb {
            return Verdict::Rejected(Rejection::Upload {
                uploaded_gb,
                min_gb,
            });
        }
    }

    Verdict::Eligible
}
