//! Scope interpreters decide whether a conflict's scope hint falls within a
//! rule's applicability scope.

pub mod basic_path;
pub mod change_group;
pub mod global;
pub mod regex_scope;

pub use basic_path::BasicPathScopeInterpreter;
pub use change_group::ChangeGroupScopeInterpreter;
pub use global::GlobalScopeInterpreter;
pub use regex_scope::RegexScopeInterpreter;

/// Strategy object owned by a conflict type.
pub trait ScopeInterpreter: Send + Sync {
    /// Stable name, used when comparing conflict type registrations.
    fn name(&self) -> &'static str;

    /// True if `scope_hint` falls within `rule_scope`.
    fn is_in_scope(&self, scope_hint: &str, rule_scope: &str) -> bool;

    /// Check a rule scope before it is persisted. The error is a
    /// human-readable hint.
    fn validate_scope(&self, rule_scope: &str) -> Result<(), String>;

    /// Larger is more specific. Used for rule precedence.
    fn specificity(&self, rule_scope: &str) -> usize;

    /// Short description of the accepted scope syntax.
    fn syntax_hint(&self) -> &'static str;
}
