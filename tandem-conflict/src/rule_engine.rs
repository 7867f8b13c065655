//! Rule selection. Pure over its rule list argument.

use std::cmp::Ordering;

use tandem_core::config::RulePrecedence;
use tandem_core::models::{ConflictResolutionRule, MigrationConflict};

use crate::scope::ScopeInterpreter;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    precedence: RulePrecedence,
}

impl RuleEngine {
    pub fn new(precedence: RulePrecedence) -> Self {
        Self { precedence }
    }

    pub fn precedence(&self) -> RulePrecedence {
        self.precedence
    }

    /// True if `rule` may resolve `conflict`: active, same type, global or
    /// same scope id, and in scope for the conflict's hint.
    pub fn is_applicable(
        conflict: &MigrationConflict,
        interpreter: &dyn ScopeInterpreter,
        rule: &ConflictResolutionRule,
    ) -> bool {
        rule.is_active()
            && rule.conflict_type == conflict.conflict_type
            && rule.scope_id.map_or(true, |s| s == conflict.scope_id)
            && interpreter.is_in_scope(&conflict.scope_hint, &rule.applicability_scope)
    }

    /// Applicable rules, best first.
    ///
    /// `MostSpecificScope`: higher interpreter specificity first, then earlier
    /// creation, then lower insertion sequence. `CreationOrder` skips the
    /// specificity key.
    pub fn ordered_applicable_rules<'r>(
        &self,
        conflict: &MigrationConflict,
        interpreter: &dyn ScopeInterpreter,
        rules: &'r [ConflictResolutionRule],
    ) -> Vec<&'r ConflictResolutionRule> {
        let mut matches: Vec<(usize, &ConflictResolutionRule)> = rules
            .iter()
            .filter(|r| Self::is_applicable(conflict, interpreter, r))
            .map(|r| (interpreter.specificity(&r.applicability_scope), r))
            .collect();

        let by_creation = |a: &ConflictResolutionRule, b: &ConflictResolutionRule| -> Ordering {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.sequence.cmp(&b.sequence))
        };
        match self.precedence {
            RulePrecedence::MostSpecificScope => {
                matches.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| by_creation(a, b)))
            }
            RulePrecedence::CreationOrder => matches.sort_by(|(_, a), (_, b)| by_creation(a, b)),
        }
        matches.into_iter().map(|(_, r)| r).collect()
    }

    /// The winning rule, or `None` to escalate.
    pub fn find_applicable_rule<'r>(
        &self,
        conflict: &MigrationConflict,
        interpreter: &dyn ScopeInterpreter,
        rules: &'r [ConflictResolutionRule],
    ) -> Option<&'r ConflictResolutionRule> {
        self.ordered_applicable_rules(conflict, interpreter, rules)
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use tandem_core::constants::SKIP_ACTION;
    use tandem_core::models::{ConflictStatus, RuleStatus};
    use uuid::Uuid;

    use super::*;
    use crate::scope::BasicPathScopeInterpreter;

    fn conflict(ty: Uuid, scope: Uuid, hint: &str) -> MigrationConflict {
        MigrationConflict {
            id: 1,
            conflict_type: ty,
            status: ConflictStatus::Unresolved,
            scope_id: scope,
            source_id: scope,
            scope_hint: hint.to_string(),
            details: String::new(),
            change_group_id: None,
            action_id: None,
            conflict_count: 1,
            retry_count: 0,
            resolved_by_rule: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn rule(ty: Uuid, scope: &str, age_secs: i64, seq: i64) -> ConflictResolutionRule {
        ConflictResolutionRule {
            reference_name: Uuid::new_v4(),
            conflict_type: ty,
            action: SKIP_ACTION,
            applicability_scope: scope.to_string(),
            scope_id: None,
            status: RuleStatus::Active,
            data: BTreeMap::new(),
            created_at: Utc::now() - Duration::seconds(age_secs),
            sequence: seq,
        }
    }

    #[test]
    fn most_specific_scope_wins() {
        let ty = Uuid::new_v4();
        let c = conflict(ty, Uuid::new_v4(), "/proj/sub/file.txt");
        let rules = vec![rule(ty, "/", 100, 1), rule(ty, "/proj/sub", 10, 2)];
        let chosen = RuleEngine::default()
            .find_applicable_rule(&c, &BasicPathScopeInterpreter, &rules)
            .unwrap();
        assert_eq!(chosen.applicability_scope, "/proj/sub");
    }

    #[test]
    fn equal_specificity_prefers_older_rule() {
        let ty = Uuid::new_v4();
        let c = conflict(ty, Uuid::new_v4(), "/proj/a");
        let newer = rule(ty, "/proj", 5, 1);
        let older = rule(ty, "/PROJ", 50, 2);
        let rules = vec![newer, older.clone()];
        let chosen = RuleEngine::default()
            .find_applicable_rule(&c, &BasicPathScopeInterpreter, &rules)
            .unwrap();
        assert_eq!(chosen.reference_name, older.reference_name);
    }

    #[test]
    fn creation_order_ignores_specificity() {
        let ty = Uuid::new_v4();
        let c = conflict(ty, Uuid::new_v4(), "/proj/sub/file.txt");
        let rules = vec![rule(ty, "/", 100, 1), rule(ty, "/proj/sub", 10, 2)];
        let chosen = RuleEngine::new(RulePrecedence::CreationOrder)
            .find_applicable_rule(&c, &BasicPathScopeInterpreter, &rules)
            .unwrap();
        assert_eq!(chosen.applicability_scope, "/");
    }

    #[test]
    fn inactive_foreign_and_out_of_scope_rules_are_ignored() {
        let ty = Uuid::new_v4();
        let scope = Uuid::new_v4();
        let c = conflict(ty, scope, "/proj/a");

        let mut deprecated = rule(ty, "/", 1, 1);
        deprecated.status = RuleStatus::Deprecated;
        let other_type = rule(Uuid::new_v4(), "/", 1, 2);
        let out_of_scope = rule(ty, "/elsewhere", 1, 3);
        let mut other_scope_id = rule(ty, "/", 1, 4);
        other_scope_id.scope_id = Some(Uuid::new_v4());

        let rules = vec![deprecated, other_type, out_of_scope, other_scope_id];
        assert!(RuleEngine::default()
            .find_applicable_rule(&c, &BasicPathScopeInterpreter, &rules)
            .is_none());
    }

    #[test]
    fn scoped_rule_applies_to_its_scope_only() {
        let ty = Uuid::new_v4();
        let scope = Uuid::new_v4();
        let c = conflict(ty, scope, "/a");
        let mut scoped = rule(ty, "/", 1, 1);
        scoped.scope_id = Some(scope);
        let rules = vec![scoped];
        assert!(RuleEngine::default()
            .find_applicable_rule(&c, &BasicPathScopeInterpreter, &rules)
            .is_some());
    }
}
