//! Error types for the chain engine.

/// Chain errors.
///
/// Record-level decode failures are not errors: they surface as a
/// [`LinkResult`](crate::model::LinkResult) carrying the unresolved sentinel.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Invalid model identifier, missing credential, bad label set or
    /// threshold. Raised before any link runs.
    #[error("configuration error{}: {message}", at_link(.link))]
    Configuration {
        link: Option<usize>,
        message: String,
    },

    /// A link failed for its whole pending batch (host error, timeout,
    /// malformed response). Earlier links' results remain in the store.
    #[error(
        "link {link} ({model}) failed: {reason}; {} record(s) never resolved",
        .unresolved.len()
    )]
    LinkInference {
        link: usize,
        model: String,
        reason: String,
        unresolved: Vec<usize>,
    },

    /// Result persistence failed.
    #[error("result store error: {message}")]
    Store { message: String },
}

fn at_link(link: &Option<usize>) -> String {
    link.map(|k| format!(" (link {})", k)).unwrap_or_default()
}

impl ChainError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            link: None,
            message: message.into(),
        }
    }

    pub fn config_at(link: usize, message: impl Into<String>) -> Self {
        Self::Configuration {
            link: Some(link),
            message: message.into(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }

    /// Link position implicated by the error, if any.
    pub fn failed_link(&self) -> Option<usize> {
        match self {
            Self::Configuration { link, .. } => *link,
            Self::LinkInference { link, .. } => Some(*link),
            Self::Store { .. } => None,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::LinkInference { .. } => 3,
            Self::Store { .. } => 4,
        }
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_names_link() {
        let err = ChainError::config_at(1, "unknown model 'x'");
        assert_eq!(
            err.to_string(),
            "configuration error (link 1): unknown model 'x'"
        );
        assert_eq!(err.failed_link(), Some(1));
        assert_eq!(ChainError::config("empty chain").failed_link(), None);
    }

    #[test]
    fn link_inference_reports_unresolved_count() {
        let err = ChainError::LinkInference {
            link: 2,
            model: "big".into(),
            reason: "deadline of 5s exceeded".into(),
            unresolved: vec![0, 3, 4],
        };
        let msg = err.to_string();
        assert!(msg.contains("link 2 (big) failed"));
        assert!(msg.contains("3 record(s) never resolved"));
        assert_eq!(err.exit_code(), 3);
    }
}
