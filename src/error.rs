use thiserror::Error;

/// Raised synchronously when configuring a [`crate::rules::RulesEngine`].
///
/// Construction-time validation means a scan can never observe a malformed
/// rule: by the time `scan` runs, every rule already compiled successfully.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule name must not be empty")]
    EmptyName,

    #[error("pattern must not be empty")]
    EmptyPattern,

    #[error("file extension to skip must not be empty")]
    EmptyExtension,

    #[error("file path substring to skip must not be empty")]
    EmptyPathSubstring,

    #[error("invalid regex pattern {pattern:?}: {diagnostic}")]
    InvalidRegex { pattern: String, diagnostic: String },

    #[error("pattern {pattern:?} has {actual} capturing group(s), expected {expected}")]
    WrongGroupCount {
        pattern: String,
        expected: usize,
        actual: usize,
    },
}

/// Raised by [`crate::scanner::RepositoryScanner`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid rule configuration")]
    Rule(#[from] RuleError),

    #[error("failed to open repository at {path}: {source}")]
    RepositoryOpen {
        path: String,
        #[source]
        source: git2::Error,
    },

    #[error("blob not found for oid {oid:?}: {source}")]
    BlobNotFound {
        oid: String,
        #[source]
        source: git2::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;
