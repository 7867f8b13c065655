//! Regular-expression scopes. The pattern must match the whole hint.

use dashmap::DashMap;
use regex::Regex;

use super::ScopeInterpreter;

/// Compiled patterns are cached per rule scope string.
#[derive(Debug, Default)]
pub struct RegexScopeInterpreter {
    cache: DashMap<String, Option<Regex>>,
}

impl RegexScopeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(rule_scope: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!("^(?:{rule_scope})$"))
    }

    fn compiled(&self, rule_scope: &str) -> Option<Regex> {
        if let Some(cached) = self.cache.get(rule_scope) {
            return cached.clone();
        }
        let compiled = Self::compile(rule_scope).ok();
        self.cache.insert(rule_scope.to_string(), compiled.clone());
        compiled
    }
}

impl ScopeInterpreter for RegexScopeInterpreter {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn is_in_scope(&self, scope_hint: &str, rule_scope: &str) -> bool {
        // Unparseable patterns never match; validate_scope keeps them out of the store.
        self.compiled(rule_scope)
            .map(|re| re.is_match(scope_hint))
            .unwrap_or(false)
    }

    fn validate_scope(&self, rule_scope: &str) -> Result<(), String> {
        Self::compile(rule_scope).map(|_| ()).map_err(|e| e.to_string())
    }

    /// Longer patterns are treated as more specific.
    fn specificity(&self, rule_scope: &str) -> usize {
        rule_scope.chars().count()
    }

    fn syntax_hint(&self) -> &'static str {
        "a regular expression matched against the whole scope hint"
    }
}
