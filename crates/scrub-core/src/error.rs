use thiserror::Error;

/// Top-level error type for the scrub-core crate and dependents.
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The document container or one of its XML parts could not be read.
    /// `part` names the offending archive entry.
    #[error("invalid document part {part}: {message}")]
    InvalidDocument { part: String, message: String },

    #[error("missing document part: {0}")]
    MissingPart(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("nlp transport error: {0}")]
    Nlp(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScrubError {
    /// Build an [`ScrubError::InvalidDocument`] from any displayable cause.
    pub fn invalid_document(part: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ScrubError::InvalidDocument {
            part: part.into(),
            message: cause.to_string(),
        }
    }
}

/// Convenience Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, ScrubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_document_names_the_part() {
        let err = ScrubError::invalid_document("word/document.xml", "unexpected end of file");
        let msg = err.to_string();
        assert!(msg.contains("word/document.xml"));
        assert!(msg.contains("unexpected end of file"));
    }

    #[test]
    fn io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ScrubError::Io(_))));
    }

    #[test]
    fn cancelled_is_terse() {
        assert_eq!(ScrubError::Cancelled.to_string(), "run cancelled");
    }
}
