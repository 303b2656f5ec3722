//! Pure, I/O-free rule evaluation: the `RulesEngine`.
//!
//! A `RulesEngine` is built incrementally via `add_*` calls, each validated
//! synchronously so that by the time a scan runs every rule is already known
//! to compile and to carry the right number of capturing groups. Once built,
//! the engine is cheap to share read-only across scanner worker threads.

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::Serialize;

use crate::error::RuleError;

/// A single captured (or whole-path) hit produced by [`RulesEngine::scan_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub rule_name: String,
    pub match_text: String,
}

struct ContentRule {
    name: String,
    match_re: Regex,
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
}

struct FilePathRule {
    name: String,
    path_re: Regex,
}

/// A ready-to-add content rule description, used by the default rule pack
/// and by callers assembling rules from external configuration (e.g. CLI
/// flags) before they are fed one by one to [`RulesEngine::add_content_rule`].
#[derive(Debug, Clone)]
pub struct ContentRuleSpec {
    pub name: String,
    pub pattern: String,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

/// Same idea as [`ContentRuleSpec`] but for file-path rules.
#[derive(Debug, Clone)]
pub struct FilePathRuleSpec {
    pub name: String,
    pub pattern: String,
}

/// Compiled, immutable-after-configuration rule set plus path skip filters.
///
/// `RulesEngine` has no I/O and no concurrency state of its own: `scan_file`
/// and `should_scan_file_path` take `&self`, so once configuration is done a
/// caller can wrap the engine in an `Arc` and share it across threads without
/// any further synchronization.
#[derive(Default)]
pub struct RulesEngine {
    content_rules: Vec<ContentRule>,
    file_path_rules: Vec<FilePathRule>,
    extensions_to_skip: HashSet<String>,
    path_substrings_to_skip: Vec<String>,
    path_matcher: Option<AhoCorasick>,
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an engine pre-loaded with [`crate::default_rules::default_content_rules`].
    pub fn with_default_rules() -> Result<Self, RuleError> {
        let mut engine = Self::new();
        for spec in crate::default_rules::default_content_rules() {
            engine.add_content_rule(spec.name, &spec.pattern, spec.whitelist, spec.blacklist)?;
        }
        Ok(engine)
    }

    pub fn add_content_rule(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        whitelist: impl IntoIterator<Item = impl AsRef<str>>,
        blacklist: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<(), RuleError> {
        let name = require_non_empty_name(name.into())?;
        let match_re = compile_with_group_count(pattern, 1)?;

        let mut whitelist_res = Vec::new();
        for pat in whitelist {
            whitelist_res.push(compile_with_group_count(pat.as_ref(), 0)?);
        }
        let mut blacklist_res = Vec::new();
        for pat in blacklist {
            blacklist_res.push(compile_with_group_count(pat.as_ref(), 0)?);
        }

        self.content_rules.push(ContentRule {
            name,
            match_re,
            whitelist: whitelist_res,
            blacklist: blacklist_res,
        });
        Ok(())
    }

    pub fn add_file_path_rule(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
    ) -> Result<(), RuleError> {
        let name = require_non_empty_name(name.into())?;
        let path_re = compile_pattern(pattern)?;
        self.file_path_rules.push(FilePathRule { name, path_re });
        Ok(())
    }

    pub fn add_file_extension_to_skip(&mut self, ext: impl Into<String>) -> Result<(), RuleError> {
        let ext = ext.into();
        if ext.is_empty() {
            return Err(RuleError::EmptyExtension);
        }
        self.extensions_to_skip.insert(ext);
        Ok(())
    }

    pub fn add_file_path_to_skip(&mut self, substr: impl Into<String>) -> Result<(), RuleError> {
        let substr = substr.into();
        if substr.is_empty() {
            return Err(RuleError::EmptyPathSubstring);
        }
        self.path_substrings_to_skip.push(substr);
        self.path_matcher = AhoCorasick::new(&self.path_substrings_to_skip).ok();
        Ok(())
    }

    pub fn should_scan_file_path(&self, path: &str) -> bool {
        if let Some(ext) = path.rsplit('.').next() {
            if ext.len() != path.len() && self.extensions_to_skip.contains(ext) {
                return false;
            }
        }
        if let Some(matcher) = &self.path_matcher {
            if matcher.is_match(path) {
                return false;
            }
        }
        true
    }

    pub fn scan_file(&self, path: &str, content: Option<&str>) -> Option<Vec<Match>> {
        let mut matches = Vec::new();

        for rule in &self.file_path_rules {
            if rule.path_re.is_match(path) {
                matches.push(Match {
                    rule_name: rule.name.clone(),
                    match_text: path.to_string(),
                });
            }
        }

        if let Some(content) = content.filter(|c| !c.is_empty()) {
            for rule in &self.content_rules {
                for captures in rule.match_re.captures_iter(content) {
                    let Some(capture) = captures.get(1) else {
                        continue;
                    };
                    let text = capture.as_str();

                    if rule.blacklist.iter().any(|re| re.is_match(text)) {
                        continue;
                    }
                    if !rule.whitelist.is_empty() && !rule.whitelist.iter().any(|re| re.is_match(text)) {
                        continue;
                    }

                    matches.push(Match {
                        rule_name: rule.name.clone(),
                        match_text: text.to_string(),
                    });
                }
            }
        }

        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    }

    /// Diagnostic helper: validates `pattern` as a content-rule match pattern
    /// (exactly one capturing group) and returns every captured substring
    /// found in `content`. Never consulted by `scan_file`.
    pub fn check_pattern(&self, content: &str, pattern: &str) -> Result<Vec<String>, RuleError> {
        let re = compile_with_group_count(pattern, 1)?;
        Ok(re
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect())
    }
}

fn require_non_empty_name(name: String) -> Result<String, RuleError> {
    if name.is_empty() {
        Err(RuleError::EmptyName)
    } else {
        Ok(name)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, RuleError> {
    if pattern.is_empty() {
        return Err(RuleError::EmptyPattern);
    }
    Regex::new(pattern).map_err(|e| RuleError::InvalidRegex {
        pattern: pattern.to_string(),
        diagnostic: e.to_string(),
    })
}

fn compile_with_group_count(pattern: &str, expected: usize) -> Result<Regex, RuleError> {
    let re = compile_pattern(pattern)?;
    let actual = re.captures_len() - 1;
    if actual != expected {
        return Err(RuleError::WrongGroupCount {
            pattern: pattern.to_string(),
            expected,
            actual,
        });
    }
    Ok(re)
}
