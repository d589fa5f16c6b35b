//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! Permission aggregation over the parent/child module hierarchy.
//!
//! The identity service returns codenames grouped per module. The parent
//! (system) module may carry two special codenames that fan out to every
//! configured child module; everything else is module scoped and matched
//! exactly after qualification with [`PermissionScheme::format_permission`].
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sso_common::config::{ModulesConfig, PermissionsConfig};
use tracing::debug;

/// Permission payload as returned by the identity service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionPayload {
    /// Module entries in the order the service returned them.
    #[serde(default)]
    pub permissions: Vec<ModulePermissions>,
}

/// Codenames granted within a single module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModulePermissions {
    /// Module code.
    pub code: String,
    /// Granted codenames.
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,
}

/// A raw, unqualified permission identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionEntry {
    /// Codename, e.g. `view_tc_customer`.
    pub codename: String,
}

impl PermissionPayload {
    /// Build a payload from `(module, codenames)` pairs.
    pub fn from_modules<'a, I, C>(modules: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, C)>,
        C: IntoIterator<Item = &'a str>,
    {
        Self {
            permissions: modules
                .into_iter()
                .map(|(code, codenames)| ModulePermissions {
                    code: code.to_owned(),
                    permissions: codenames
                        .into_iter()
                        .map(|codename| PermissionEntry {
                            codename: codename.to_owned(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Set of qualified permission strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions(BTreeSet<String>);

impl EffectivePermissions {
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn insert(&mut self, permission: String) {
        self.0.insert(permission);
    }
}

impl FromIterator<String> for EffectivePermissions {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Static description of the module hierarchy and its permission vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionScheme {
    parent_module: String,
    child_modules: Vec<String>,
    child_permission_types: Vec<String>,
    view_action: String,
    manage_system: String,
    view_system: String,
}

impl PermissionScheme {
    /// Build the scheme from the `[modules]` and `[permissions]` configuration sections.
    pub fn from_config(modules: &ModulesConfig, permissions: &PermissionsConfig) -> Self {
        Self {
            parent_module: modules.parent.clone(),
            child_modules: modules.children.values().cloned().collect(),
            child_permission_types: permissions.child_types.values().cloned().collect(),
            view_action: permissions.view_action().to_owned(),
            manage_system: permissions.manage_system.clone(),
            view_system: permissions.view_system.clone(),
        }
    }

    pub fn parent_module(&self) -> &str {
        &self.parent_module
    }

    pub fn child_modules(&self) -> &[String] {
        &self.child_modules
    }

    /// Qualify an action for a module.
    ///
    /// Parent module actions stay bare. Child actions become `module.action`
    /// when the action already names the module (`delete_tc_customer` in `tc`),
    /// otherwise `module.action_module` (`view` in `tc` is `tc.view_tc`).
    pub fn format_permission(&self, module: &str, action: &str) -> String {
        if module == self.parent_module {
            return action.to_owned();
        }
        let suffix = format!("_{module}");
        let infix = format!("_{module}_");
        if action.ends_with(&suffix) || action.contains(&infix) {
            format!("{module}.{action}")
        } else {
            format!("{module}.{action}{suffix}")
        }
    }

    /// Codenames granted on the parent module (first matching entry).
    pub fn parent_permissions<'p>(&self, payload: &'p PermissionPayload) -> BTreeSet<&'p str> {
        payload
            .permissions
            .iter()
            .find(|module| module.code == self.parent_module)
            .map(|module| {
                module
                    .permissions
                    .iter()
                    .map(|entry| entry.codename.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compute the effective permission set for a payload.
    pub fn collect_effective_permissions(&self, payload: &PermissionPayload) -> EffectivePermissions {
        let parent_perms = self.parent_permissions(payload);
        if parent_perms.is_empty() {
            debug!(parent = %self.parent_module, "no parent module permissions in payload");
        }
        let mut effective: EffectivePermissions =
            parent_perms.iter().map(|perm| (*perm).to_owned()).collect();

        if parent_perms.contains(self.manage_system.as_str()) {
            debug!("manage system permission grants every child permission");
            for module in &self.child_modules {
                for action in &self.child_permission_types {
                    effective.insert(self.format_permission(module, action));
                }
            }
            return effective;
        }

        if parent_perms.contains(self.view_system.as_str()) {
            debug!(action = %self.view_action, "view system permission grants child view access");
            for module in &self.child_modules {
                effective.insert(self.format_permission(module, &self.view_action));
            }
        }

        for module in payload
            .permissions
            .iter()
            .filter(|module| module.code != self.parent_module)
        {
            for entry in &module.permissions {
                effective.insert(format!("{}.{}", module.code, entry.codename));
            }
        }

        debug!(count = effective.len(), "collected effective permissions");
        effective
    }

    /// First requested action, qualified for `module`, that the set lacks.
    /// `None` means every action is granted.
    pub fn missing_permission<S: AsRef<str>>(
        &self,
        effective: &EffectivePermissions,
        module: &str,
        required: &[S],
    ) -> Option<String> {
        required
            .iter()
            .map(|action| self.format_permission(module, action.as_ref()))
            .find(|permission| !effective.contains(permission))
    }
}
