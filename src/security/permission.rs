use std::collections::HashMap;

/// Decides whether a user's group memberships allow an action.
///
/// Permission evaluation is an external collaborator of the auth core; this
/// seam keeps its contract explicit so non-auth endpoints can depend on it
/// without coupling to a concrete policy.
pub trait PermissionChecker: Send + Sync {
    /// Whether a user holding `groups` may perform `action`.
    fn allows(&self, groups: &[String], action: &str) -> bool;
}

/// Grants every action. Development/default policy.
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn allows(&self, _groups: &[String], _action: &str) -> bool {
        true
    }
}

/// Grants an action only to members of one of its configured groups.
/// Actions with no configured groups are denied.
pub struct RoleBased {
    grants: HashMap<String, Vec<String>>,
}

impl RoleBased {
    pub fn new(grants: HashMap<String, Vec<String>>) -> Self {
        Self { grants }
    }
}

impl PermissionChecker for RoleBased {
    fn allows(&self, groups: &[String], action: &str) -> bool {
        match self.grants.get(action) {
            Some(allowed) => groups.iter().any(|g| allowed.contains(g)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allow_all_grants_everything() {
        let checker = AllowAll;
        assert!(checker.allows(&[], "denuncias:create"));
        assert!(checker.allows(&groups(&["fiscal"]), "fiscalizacao:advance"));
    }

    #[test]
    fn role_based_requires_a_configured_group() {
        let mut grants = HashMap::new();
        grants.insert(
            "fiscalizacao:advance".to_string(),
            vec!["fiscal".to_string(), "admin".to_string()],
        );
        let checker = RoleBased::new(grants);

        assert!(checker.allows(&groups(&["fiscal"]), "fiscalizacao:advance"));
        assert!(checker.allows(&groups(&["admin", "citizen"]), "fiscalizacao:advance"));
        assert!(!checker.allows(&groups(&["citizen"]), "fiscalizacao:advance"));
        // Unknown actions are denied, not granted.
        assert!(!checker.allows(&groups(&["admin"]), "unknown:action"));
    }
}
