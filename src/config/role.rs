use super::grant::Grant;
use crate::dialect::Dialect;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A boolean role attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleOption {
    Login,
    Superuser,
    CreateDatabase,
    CreateRole,
    Inherit,
    Replication,
    BypassRowSecurity,
}

impl RoleOption {
    pub const ALL: [RoleOption; 7] = [
        RoleOption::Login,
        RoleOption::Superuser,
        RoleOption::CreateDatabase,
        RoleOption::CreateRole,
        RoleOption::Inherit,
        RoleOption::Replication,
        RoleOption::BypassRowSecurity,
    ];
}

impl fmt::Display for RoleOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let key = match self {
            RoleOption::Login => "login",
            RoleOption::Superuser => "superuser",
            RoleOption::CreateDatabase => "create_database",
            RoleOption::CreateRole => "create_role",
            RoleOption::Inherit => "inherit",
            RoleOption::Replication => "replication",
            RoleOption::BypassRowSecurity => "bypass_row_security",
        };

        write!(f, "{}", key)
    }
}

/// Role attributes. Anything not declared takes the server default:
/// every option off except `inherit`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RoleOptions {
    pub login: bool,
    pub superuser: bool,
    pub create_database: bool,
    pub create_role: bool,
    pub inherit: bool,
    pub replication: bool,
    #[serde(alias = "bypass_rls")]
    pub bypass_row_security: bool,
}

impl Default for RoleOptions {
    fn default() -> Self {
        Self {
            login: false,
            superuser: false,
            create_database: false,
            create_role: false,
            inherit: true,
            replication: false,
            bypass_row_security: false,
        }
    }
}

impl RoleOptions {
    pub fn get(&self, option: RoleOption) -> bool {
        match option {
            RoleOption::Login => self.login,
            RoleOption::Superuser => self.superuser,
            RoleOption::CreateDatabase => self.create_database,
            RoleOption::CreateRole => self.create_role,
            RoleOption::Inherit => self.inherit,
            RoleOption::Replication => self.replication,
            RoleOption::BypassRowSecurity => self.bypass_row_security,
        }
    }

    pub fn set(&mut self, option: RoleOption, value: bool) {
        match option {
            RoleOption::Login => self.login = value,
            RoleOption::Superuser => self.superuser = value,
            RoleOption::CreateDatabase => self.create_database = value,
            RoleOption::CreateRole => self.create_role = value,
            RoleOption::Inherit => self.inherit = value,
            RoleOption::Replication => self.replication = value,
            RoleOption::BypassRowSecurity => self.bypass_row_security = value,
        }
    }

    /// Options whose declared value differs from `live`, with the declared value.
    pub fn diff(&self, live: &RoleOptions) -> Vec<(RoleOption, bool)> {
        RoleOption::ALL
            .iter()
            .filter(|option| self.get(**option) != live.get(**option))
            .map(|option| (*option, self.get(*option)))
            .collect()
    }
}

/// A role (user or group) to reconcile.
///
/// For example:
///
/// ```yaml
/// - name: app_user
///   password: ${APP_PASSWORD}
///   options:
///     create_database: true
///   grants:
///     - database: app
///       privileges: [CONNECT]
///     - database: app
///       schema: public
///       table: "*"
///       privileges: [SELECT, INSERT]
///   roles:
///     - readers
/// ```
///
/// A role without password and without `login: true` is a group.
/// `roles` is the complete list of groups the role should belong to:
/// memberships not listed are revoked.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub options: RoleOptions,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Role {
    /// A role without any options, grants or memberships
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            password: None,
            options: RoleOptions::default(),
            grants: vec![],
            roles: vec![],
        }
    }

    /// The declared password, an empty string counts as none
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Declared options, with `login` forced on when a password is set
    pub fn effective_options(&self) -> RoleOptions {
        let mut options = self.options;
        if self.password().is_some() {
            options.login = true;
        }

        options
    }

    pub fn validate(&self, dialect: &dyn Dialect) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("role name is empty"));
        }

        // Options the engine cannot store must keep their default
        let defaults = RoleOptions::default();
        for option in RoleOption::ALL {
            if !dialect.role_options().contains(&option)
                && self.options.get(option) != defaults.get(option)
            {
                return Err(anyhow!(
                    "role {}: option {} is not supported by {}",
                    self.name,
                    option,
                    dialect.name()
                ));
            }
        }

        for grant in &self.grants {
            grant
                .validate(dialect)
                .map_err(|e| anyhow!("role {}: {}", self.name, e))?;
        }

        let mut groups = HashSet::new();
        for group in &self.roles {
            if group.trim().is_empty() {
                return Err(anyhow!("role {}: group name is empty", self.name));
            }
            if !groups.insert(dialect.normalize_identifier(group)) {
                return Err(anyhow!("role {}: duplicated group: {}", self.name, group));
            }
        }

        Ok(())
    }
}
