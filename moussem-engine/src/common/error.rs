use moussem_core::CatalogError;
use thiserror::Error;

/// Pipeline failures, bucketed by the retry policy that applies to them.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("network timeout talking to {source_name}")]
    NetworkTimeout { source_name: String },

    #[error("rate limited by {source_name}")]
    RateLimited {
        source_name: String,
        /// Server-provided retry-after, seconds.
        retry_after: Option<u64>,
    },

    #[error("source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("unrecognized city: {name}")]
    UnknownCity { name: String },

    #[error("merge conflict: {message}")]
    MergeConflict { message: String },

    #[error("database error: {0}")]
    Database(#[from] CatalogError),

    #[error("search index error: {message}")]
    SearchIndex { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable kind label used in run reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NetworkTimeout { .. } => "network_timeout",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::SourceUnavailable { .. } => "source_unavailable",
            PipelineError::Parse { .. } => "parse_error",
            PipelineError::Validation { .. } => "validation_error",
            PipelineError::UnknownCity { .. } => "unknown_city",
            PipelineError::MergeConflict { .. } => "conflict_on_merge",
            PipelineError::Database(_) => "database_error",
            PipelineError::SearchIndex { .. } => "search_index_error",
            PipelineError::Io(_) => "io_error",
            PipelineError::Json(_) => "parse_error",
        }
    }

    /// Errors worth another fetch attempt with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PipelineError::NetworkTimeout { .. }
                | PipelineError::RateLimited { .. }
                | PipelineError::SourceUnavailable { .. }
        )
    }

    /// Per-record errors: skip the record, keep the run going.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Parse { .. }
                | PipelineError::Validation { .. }
                | PipelineError::UnknownCity { .. }
                | PipelineError::MergeConflict { .. }
                | PipelineError::Json(_)
        )
    }

    /// Classify an HTTP failure against a named source.
    pub fn from_http(source_name: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return PipelineError::NetworkTimeout {
                source_name: source_name.to_string(),
            };
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return PipelineError::RateLimited {
                    source_name: source_name.to_string(),
                    retry_after: None,
                };
            }
        }
        PipelineError::SourceUnavailable {
            message: format!("{source_name}: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
