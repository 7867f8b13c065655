use super::ScopeInterpreter;

/// Every hint is in scope of every rule.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalScopeInterpreter;

impl ScopeInterpreter for GlobalScopeInterpreter {
    fn name(&self) -> &'static str {
        "global"
    }

    fn is_in_scope(&self, _scope_hint: &str, _rule_scope: &str) -> bool {
        true
    }

    fn validate_scope(&self, _rule_scope: &str) -> Result<(), String> {
        Ok(())
    }

    fn specificity(&self, _rule_scope: &str) -> usize {
        0
    }

    fn syntax_hint(&self) -> &'static str {
        "any value; the rule applies everywhere"
    }
}
