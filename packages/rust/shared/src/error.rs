//! Error types for LessonForge.
//!
//! Library crates use [`LessonError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LessonForge operations.
#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the generation service.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The generation service answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// A remote call or a whole section exceeded its time budget.
    #[error("upstream timed out after {after_ms}ms")]
    UpstreamTimeout { after_ms: u64 },

    /// The generation service answered but produced no text.
    #[error("upstream returned an empty response")]
    EmptyOutput,

    /// Model output could not be parsed, even after repair.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (invalid level, bad weights, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No usable shared context could be built from the source text.
    #[error("context build failed: {message}")]
    ContextBuild { message: String },

    /// A progress reporter failed. Logged by the orchestrator, never surfaced.
    #[error("progress callback failed: {0}")]
    Callback(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LessonError>;

impl LessonError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a fatal context-build error.
    pub fn context_build(msg: impl Into<String>) -> Self {
        Self::ContextBuild {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a single retry of the remote call may succeed.
    ///
    /// Timeouts, transport failures, rate limiting and 5xx responses are
    /// transient. Everything else (4xx, empty output, parse failures) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(_) | Self::UpstreamTimeout { .. } => true,
            Self::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short machine-readable name, used in streamed error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Upstream(_) => "upstream",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::EmptyOutput => "empty_output",
            Self::Parse { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::ContextBuild { .. } => "context_build_failure",
            Self::Callback(_) => "callback",
            Self::Io { .. } => "io",
        }
    }
}
