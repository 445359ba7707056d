/// Crate-level error types for usage-rules diagnostics.
use std::path::PathBuf;

/// Fatal errors. Each variant names the file, pattern, or reason for failure
/// so the diagnostic is useful without a debugger.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file exists but has the wrong shape.
    #[error("invalid config {}: {reason}", path.display())]
    ConfigInvalid {
        /// Configuration file being loaded.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The configuration file does not exist.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// A pattern spec did not compile as a regular expression.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The pattern source text.
        pattern: String,
        /// Compiler message from the regex engine.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// A file could not be parsed for editing.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },
}

/// A spec that names something the project does not provide. Collected by
/// the resolver rather than thrown, so the rest of the cycle still runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The dependency exists but offers no main fragment and no selected sub-fragments.
    #[error("`{package}` is listed in usage_rules but has neither a usage-rules.md file nor matching sub-rules")]
    EmptyPackage {
        /// Package identifier.
        package: String,
    },

    /// A named sub-fragment is absent from the dependency.
    #[error("`{package}:{sub_rule}` is listed in usage_rules but `{package}` has no `{sub_rule}` sub-rule")]
    MissingSubRule {
        /// Package identifier.
        package: String,
        /// Requested sub-fragment name.
        sub_rule: String,
    },

    /// The named package is not among the project's dependencies.
    #[error("`{package}` is listed in usage_rules but is not a dependency")]
    UnknownDependency {
        /// Package identifier.
        package: String,
    },
}
