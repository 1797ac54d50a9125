//! Access control (spec §4.4 step 10): an unconditional directory-traversal
//! guard plus a role-based rule set gating HTTP paths by minimum role.
//! Admin bypasses the rule set entirely, per spec.

use crate::error::SecurityError;
use crate::identity::{Principal, Role};

/// One rule: requests under `path_prefix` require at least `min_role`.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub path_prefix: String,
    pub min_role: Role,
}

impl AccessRule {
    pub fn new(path_prefix: impl Into<String>, min_role: Role) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            min_role,
        }
    }
}

/// The chain's role-based rule set (spec §4.4 step 10). A path with no
/// matching rule is allowed through to the handler; the rule set only
/// tightens specific prefixes, it is not a default-deny allowlist.
#[derive(Debug, Clone, Default)]
pub struct AccessControlPolicy {
    rules: Vec<AccessRule>,
}

impl AccessControlPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// The most specific (longest-prefix) matching rule for `path`, if any.
    fn matching_rule(&self, path: &str) -> Option<&AccessRule> {
        self.rules
            .iter()
            .filter(|r| path.starts_with(r.path_prefix.as_str()))
            .max_by_key(|r| r.path_prefix.len())
    }

    /// Evaluate the rule set for `(principal, path)`. Admin always passes.
    pub fn evaluate(&self, principal: &Principal, path: &str) -> Result<(), SecurityError> {
        if principal.role.is_admin() {
            return Ok(());
        }
        if let Some(rule) = self.matching_rule(path) {
            if !principal.role.satisfies(rule.min_role) {
                return Err(SecurityError::Forbidden(format!(
                    "role {} does not satisfy the required role {} for {}",
                    principal.role, rule.min_role, path
                )));
            }
        }
        Ok(())
    }
}

/// Directory-traversal check, unconditional regardless of role (spec §4.4
/// step 10): any `..` path segment is rejected with 400.
pub fn reject_path_traversal(path: &str) -> Result<(), SecurityError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(SecurityError::Validation(
            "path traversal is not permitted".into(),
        ));
    }
    Ok(())
}
