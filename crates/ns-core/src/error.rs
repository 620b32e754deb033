//! Error types for the likelihood engine

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model and data propagators ended up with a different number of samples.
    #[error(
        "Mismatching number of samples for model and data propagators: N_model={n_model} vs N_data={n_data}"
    )]
    SampleCountMismatch {
        /// Samples held by the model propagator.
        n_model: usize,
        /// Samples held by the data propagator.
        n_data: usize,
    },

    /// Joint probability tag not present in the registry.
    #[error("Unknown joint probability type \"{tag}\" (known: {known})")]
    UnknownJointProbability {
        /// Requested tag.
        tag: String,
        /// Comma separated list of registered tags.
        known: String,
    },

    /// Malformed version string.
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// API used out of order (e.g. throwing before binning).
    #[error("Usage error: {0}")]
    Usage(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_mismatch_message_carries_counts() {
        let err = Error::SampleCountMismatch { n_model: 5, n_data: 6 };
        assert!(err.to_string().contains("N_model=5 vs N_data=6"));
    }

    #[test]
    fn test_unknown_joint_probability_lists_known_tags() {
        let err = Error::UnknownJointProbability {
            tag: "Foo".into(),
            known: "BarlowLLH, PoissonLLH".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"Foo\""));
        assert!(msg.contains("PoissonLLH"));
    }
}
