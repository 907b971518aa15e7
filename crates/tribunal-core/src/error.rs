use std::path::PathBuf;

/// Errors that can occur across Tribunal.
///
/// Library crates use this type directly; the binary converts to a
/// `miette` report at the boundary. Only configuration, source and
/// cancellation errors ever escape an analysis run: everything else is
/// folded into a deferred report.
///
/// # Examples
///
/// ```
/// use tribunal_core::TribunalError;
///
/// let err = TribunalError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TribunalError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The code source could not be read at all.
    #[error("source unavailable: {0}")]
    Source(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A value failed a construction-time invariant. Indicates a defect.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Codebase feature extraction failed.
    #[error("feature extraction failed: {0}")]
    Extraction(String),

    /// A specialist did not answer within its time budget.
    #[error("specialist {agent} timed out after {secs}s")]
    SpecialistTimeout { agent: String, secs: u64 },

    /// The run was cancelled before a report was produced.
    #[error("analysis cancelled")]
    Cancelled,
}
