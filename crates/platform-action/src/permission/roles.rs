//! Role expansion and wildcard matching.
//!
//! One matching rule is used for both permissions and approval-workflow
//! patterns: `*` matches everything, and a pattern ending in `*` matches any
//! candidate that starts with the pattern minus that trailing `*`. The
//! delimiter before the star is part of the prefix, so `billing.*` matches
//! `billing.read` but not `billingx.read` or `billing`.

use std::collections::BTreeSet;

use platform_core::types::UserContext;

/// Fixed role to permission table.
const ROLE_PERMISSIONS: &[(&str, &[&str])] = &[
    ("system-admin", &["*"]),
    (
        "organization-admin",
        &[
            "objects:read",
            "objects:write",
            "objects:delete",
            "records:read",
            "records:write",
            "records:delete",
            "schema:read",
            "schema:write",
            "data:import",
            "data:export",
            "audit:read",
            "integrations:read",
            "integrations:write",
            "settings:read",
            "settings:write",
            "users:read",
            "users:write",
        ],
    ),
    (
        "organization-member",
        &[
            "objects:read",
            "objects:write",
            "records:read",
            "records:write",
            "data:export",
            "settings:read",
        ],
    ),
    ("user", &["objects:read", "records:read", "records:write"]),
    ("guest", &["objects:read"]),
];

/// Permissions granted by a single role. Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    ROLE_PERMISSIONS
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, perms)| *perms)
        .unwrap_or(&[])
}

/// Whether `pattern` covers `candidate` under the wildcard rule.
pub fn wildcard_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.len() > prefix.len() && candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

/// Direct permissions, role names, and every permission the roles expand to.
pub fn effective_permissions(user: &UserContext) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = user.permissions.iter().cloned().collect();
    for role in &user.roles {
        set.insert(role.clone());
        set.extend(role_permissions(role).iter().map(|p| p.to_string()));
    }
    set
}

/// Whether a set of held permissions satisfies one required permission.
pub fn grants(held: &BTreeSet<String>, required: &str) -> bool {
    held.contains(required) || held.iter().any(|p| wildcard_matches(p, required))
}
