//! Name filters deciding which locos a command station controls

use regex::Regex;

use crate::config::FilterConfig;
use crate::error::{GatewayError, Result};

/// Compiled [`FilterConfig`]
///
/// A name is included when it matches at least one include pattern and no
/// exclude pattern. Patterns search anywhere in the name; anchor them with
/// `^` and `$` to match whole names.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    incls: Vec<Regex>,
    excls: Vec<Regex>,
}

impl NameFilter {
    pub fn compile(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            incls: compile_all(&config.incls)?,
            excls: compile_all(&config.excls)?,
        })
    }

    pub fn includes(&self, name: &str) -> bool {
        self.incls.iter().any(|re| re.is_match(name)) && !self.excls.iter().any(|re| re.is_match(name))
    }

    /// Whether the filter can include anything at all.
    pub fn is_empty(&self) -> bool {
        self.incls.is_empty()
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| GatewayError::InvalidFilter {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}
