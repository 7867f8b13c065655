//! Scopes naming a single change group.

use super::ScopeInterpreter;

/// Matches on exact change-group name. An empty rule scope matches every group.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeGroupScopeInterpreter;

impl ScopeInterpreter for ChangeGroupScopeInterpreter {
    fn name(&self) -> &'static str {
        "change_group"
    }

    fn is_in_scope(&self, scope_hint: &str, rule_scope: &str) -> bool {
        rule_scope.is_empty() || scope_hint == rule_scope
    }

    fn validate_scope(&self, _rule_scope: &str) -> Result<(), String> {
        Ok(())
    }

    fn specificity(&self, rule_scope: &str) -> usize {
        usize::from(!rule_scope.is_empty())
    }

    fn syntax_hint(&self) -> &'static str {
        "a change group name, or empty for every group"
    }
}
