//! Static category map: last-resort routing rules

use crate::config::CategoryRule;
use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};

/// Compiled folder routing rules, checked in declaration order
pub struct CategoryMap {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    pattern: Regex,
    folder: String,
}

impl CategoryMap {
    /// Compile rules; patterns are case-insensitive regexes.
    pub fn new(rules: &[CategoryRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let pattern = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        Error::Config(format!(
                            "Invalid category map pattern '{}': {}",
                            rule.pattern, e
                        ))
                    })?;
                Ok(CompiledRule {
                    pattern,
                    folder: rule.folder.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// An empty map that never matches.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Folder of the first rule matching `hint`.
    pub fn resolve(&self, hint: &str) -> Option<&str> {
        if hint.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(hint))
            .map(|rule| rule.folder.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
