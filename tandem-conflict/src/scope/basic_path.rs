//! Path-prefix scopes, compared segment by segment and case-insensitively.

use super::ScopeInterpreter;

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicPathScopeInterpreter;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

fn matches_all(rule_scope: &str) -> bool {
    let trimmed = rule_scope.trim();
    trimmed.is_empty() || trimmed == "/"
}

impl ScopeInterpreter for BasicPathScopeInterpreter {
    fn name(&self) -> &'static str {
        "basic_path"
    }

    fn is_in_scope(&self, scope_hint: &str, rule_scope: &str) -> bool {
        if matches_all(rule_scope) {
            return true;
        }
        let mut hint = segments(scope_hint.trim());
        for rule_segment in segments(rule_scope.trim()) {
            match hint.next() {
                Some(h) if h.to_lowercase() == rule_segment.to_lowercase() => {}
                _ => return false,
            }
        }
        true
    }

    fn validate_scope(&self, rule_scope: &str) -> Result<(), String> {
        let trimmed = rule_scope.trim();
        if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.starts_with("$/") {
            Ok(())
        } else {
            Err(format!("'{trimmed}' is not rooted; {}", self.syntax_hint()))
        }
    }

    fn specificity(&self, rule_scope: &str) -> usize {
        segments(rule_scope.trim()).count()
    }

    fn syntax_hint(&self) -> &'static str {
        "a rooted path such as /project/folder; / matches every path"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I: BasicPathScopeInterpreter = BasicPathScopeInterpreter;

    #[test]
    fn prefix_matches_descendants() {
        assert!(I.is_in_scope("/team/file.cs", "/team"));
        assert!(!I.is_in_scope("/other/file.cs", "/team"));
    }

    #[test]
    fn root_and_empty_match_everything() {
        assert!(I.is_in_scope("/anything/at/all", "/"));
        assert!(I.is_in_scope("", ""));
        assert!(I.is_in_scope("relative", " / "));
    }

    #[test]
    fn comparison_ignores_case() {
        assert!(I.is_in_scope("/Team/Sub/A.txt", "/team/SUB"));
    }

    #[test]
    fn partial_segment_is_not_a_prefix() {
        assert!(!I.is_in_scope("/teamwork/a", "/team"));
        assert!(!I.is_in_scope("/team", "/team/sub"));
    }

    #[test]
    fn trailing_separator_is_ignored() {
        assert!(I.is_in_scope("/team/a", "/team/"));
        assert_eq!(I.specificity("/team/"), 1);
    }

    #[test]
    fn specificity_counts_segments() {
        assert_eq!(I.specificity("/"), 0);
        assert_eq!(I.specificity("/proj/sub"), 2);
    }

    #[test]
    fn unrooted_scope_is_rejected() {
        assert!(I.validate_scope("proj/sub").is_err());
        assert!(I.validate_scope("/proj").is_ok());
        assert!(I.validate_scope("$/proj").is_ok());
    }
}
