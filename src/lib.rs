//! Scans the full history of a local Git repository for leaked secrets.
//!
//! A [`rules::RulesEngine`] holds a pack of content and file-path rules; a
//! [`scanner::RepositoryScanner`] walks every commit reachable from branches
//! matching a glob, dispatches the files each commit introduces to a worker
//! pool, and runs the engine against each one.

pub mod binary;
pub mod default_rules;
pub mod error;
pub mod glob;
pub mod rules;
pub mod scanner;
mod worker;

pub use default_rules::default_content_rules;
pub use error::{RuleError, ScanError};
pub use rules::{ContentRuleSpec, FilePathRuleSpec, Match, RulesEngine};
pub use scanner::{RepositoryScanner, ScanResult};
