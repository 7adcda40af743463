//! Permission checks for schema resources.
//!
//! Grants pair a resource kind and a permission with a target scope.

use super::error::{SecurityError, SecurityResult};
use std::collections::HashSet;
use std::fmt;

/// Resource kinds guarded by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceGeneric {
    /// The schema as a whole.
    Schema,
    /// A single class.
    Class,
    /// A physical collection.
    Collection,
}

impl fmt::Display for ResourceGeneric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceGeneric::Schema => write!(f, "schema"),
            ResourceGeneric::Class => write!(f, "class"),
            ResourceGeneric::Collection => write!(f, "collection"),
        }
    }
}

/// Operation permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Create a resource.
    Create,
    /// Read a resource.
    Read,
    /// Change a resource.
    Update,
    /// Delete a resource.
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Create => write!(f, "create"),
            Permission::Read => write!(f, "read"),
            Permission::Update => write!(f, "update"),
            Permission::Delete => write!(f, "delete"),
        }
    }
}

/// Decides whether an operation on a resource is allowed.
pub trait SecurityChecker: Send + Sync {
    /// Fail with `PermissionDenied` unless the operation is allowed.
    fn check(
        &self,
        resource: ResourceGeneric,
        permission: Permission,
        target: Option<&str>,
    ) -> SecurityResult<()>;
}

/// Checker that allows everything. Used for embedded single-user setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SecurityChecker for AllowAll {
    fn check(&self, _: ResourceGeneric, _: Permission, _: Option<&str>) -> SecurityResult<()> {
        Ok(())
    }
}

/// Scope of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetScope {
    /// Any target.
    All,
    /// A specific name, compared case-insensitively.
    Named(String),
    /// Names starting with the given prefix (`Person*`).
    Prefix(String),
}

impl TargetScope {
    /// Check if this scope matches the given target.
    pub fn matches(&self, target: Option<&str>) -> bool {
        match (self, target) {
            (TargetScope::All, _) => true,
            (_, None) => false,
            (TargetScope::Named(name), Some(target)) => name.eq_ignore_ascii_case(target),
            (TargetScope::Prefix(prefix), Some(target)) => target
                .to_lowercase()
                .starts_with(&prefix.to_lowercase()),
        }
    }
}

/// A single granted permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    /// Resource kind.
    pub resource: ResourceGeneric,
    /// Allowed permission.
    pub permission: Permission,
    /// Targets covered.
    pub scope: TargetScope,
}

impl Grant {
    /// Parse a grant of the form `permission:resource[:target]`.
    ///
    /// Examples:
    /// - `read:schema` - read the schema
    /// - `update:class:Person` - alter class Person
    /// - `create:collection:log*` - create collections starting with "log"
    pub fn parse(s: &str) -> SecurityResult<Self> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        let permission = match parts[0] {
            "create" => Permission::Create,
            "read" => Permission::Read,
            "update" => Permission::Update,
            "delete" => Permission::Delete,
            other => {
                return Err(SecurityError::InvalidGrantFormat(format!(
                    "unknown permission: {}",
                    other
                )))
            }
        };
        let resource = match parts.get(1).copied() {
            Some("schema") => ResourceGeneric::Schema,
            Some("class") => ResourceGeneric::Class,
            Some("collection") => ResourceGeneric::Collection,
            Some(other) => {
                return Err(SecurityError::InvalidGrantFormat(format!(
                    "unknown resource: {}",
                    other
                )))
            }
            None => {
                return Err(SecurityError::InvalidGrantFormat(format!(
                    "grant '{}' names no resource",
                    s
                )))
            }
        };
        let scope = match parts.get(2).copied() {
            None | Some("*") => TargetScope::All,
            Some(t) if t.ends_with('*') => TargetScope::Prefix(t[..t.len() - 1].to_string()),
            Some(t) => TargetScope::Named(t.to_string()),
        };
        Ok(Self {
            resource,
            permission,
            scope,
        })
    }
}

/// Checker backed by an explicit set of grants.
#[derive(Debug, Clone, Default)]
pub struct RoleChecker {
    grants: HashSet<Grant>,
}

impl RoleChecker {
    /// Create a checker with no grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse grants from string representations.
    pub fn from_strings(strings: &[&str]) -> SecurityResult<Self> {
        let grants: SecurityResult<HashSet<Grant>> =
            strings.iter().map(|s| Grant::parse(s)).collect();
        Ok(Self { grants: grants? })
    }

    /// Add a grant.
    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grants.insert(grant);
        self
    }

    /// Check if the operation is granted.
    pub fn allows(
        &self,
        resource: ResourceGeneric,
        permission: Permission,
        target: Option<&str>,
    ) -> bool {
        self.grants.iter().any(|grant| {
            grant.resource == resource
                && grant.permission == permission
                && grant.scope.matches(target)
        })
    }
}

impl SecurityChecker for RoleChecker {
    fn check(
        &self,
        resource: ResourceGeneric,
        permission: Permission,
        target: Option<&str>,
    ) -> SecurityResult<()> {
        if self.allows(resource, permission, target) {
            Ok(())
        } else {
            Err(SecurityError::PermissionDenied(match target {
                Some(target) => format!("{} on {} '{}'", permission, resource, target),
                None => format!("{} on {}", permission, resource),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grants() {
        let grant = Grant::parse("update:class:Person*").unwrap();
        assert_eq!(grant.permission, Permission::Update);
        assert_eq!(grant.resource, ResourceGeneric::Class);
        assert_eq!(grant.scope, TargetScope::Prefix("Person".to_string()));

        let grant = Grant::parse("read:schema").unwrap();
        assert_eq!(grant.scope, TargetScope::All);

        assert!(Grant::parse("fly:schema").is_err());
        assert!(Grant::parse("read").is_err());
        assert!(Grant::parse("read:table").is_err());
    }

    #[test]
    fn test_scope_matching() {
        assert!(TargetScope::All.matches(None));
        assert!(TargetScope::Named("Person".into()).matches(Some("person")));
        assert!(!TargetScope::Named("Person".into()).matches(None));
        assert!(TargetScope::Prefix("log".into()).matches(Some("LOG_2024")));
        assert!(!TargetScope::Prefix("log".into()).matches(Some("blog")));
    }

    #[test]
    fn test_role_checker() {
        let checker = RoleChecker::from_strings(&["read:schema", "update:schema"]).unwrap();
        assert!(checker
            .check(ResourceGeneric::Schema, Permission::Read, None)
            .is_ok());
        let err = checker
            .check(ResourceGeneric::Schema, Permission::Create, Some("Person"))
            .unwrap_err();
        assert!(err.to_string().contains("create on schema 'Person'"));
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll
            .check(ResourceGeneric::Collection, Permission::Delete, Some("x"))
            .is_ok());
    }
}
