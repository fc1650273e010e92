use crate::dialect::{DefaultObjectClass, Dialect, Feature};
use crate::error::{Error, Result};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// A rule for privileges applied to objects created in the future.
///
/// ```yaml
/// default_privileges:
///   - role: app_owner     # objects created by this role, the operator when omitted
///     schema: public      # omitted: every schema
///     privileges: [SELECT, INSERT]
///     on: tables
///     to: app_user
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DefaultPrivilege {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(alias = "grant")]
    pub privileges: Vec<String>,
    pub on: DefaultObjectClass,
    pub to: String,
    #[serde(default)]
    pub with_grant: bool,
}

impl DefaultPrivilege {
    pub fn validate(&self, dialect: &dyn Dialect) -> Result<()> {
        if self.to.trim().is_empty() {
            return Err(Error::invalid("default privilege grantee is empty"));
        }

        if self.on == DefaultObjectClass::Schemas && self.schema.is_some() {
            return Err(Error::invalid(
                "default privileges on schemas cannot be restricted to a schema",
            ));
        }

        dialect.validate_privileges(self.on.privilege_class(), &self.privileges)
    }

    /// Fold every identifier, drop empty `role` and `schema`
    pub fn normalize(&self, dialect: &dyn Dialect) -> Self {
        let fold = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| dialect.normalize_identifier(v))
        };

        Self {
            role: fold(&self.role),
            schema: fold(&self.schema),
            privileges: self.privileges.clone(),
            on: self.on,
            to: dialect.normalize_identifier(&self.to),
            with_grant: self.with_grant,
        }
    }
}

/// A database to reconcile.
///
/// ```yaml
/// databases:
///   - name: app
///     owner: app_owner
///     default_privileges:
///       - schema: public
///         privileges: [ALL]
///         on: tables
///         to: app_user
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Database {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_privileges: Vec<DefaultPrivilege>,
}

impl Database {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: None,
            default_privileges: vec![],
        }
    }

    /// The declared owner, an empty string counts as none
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref().map(str::trim).filter(|o| !o.is_empty())
    }

    pub fn validate(&self, dialect: &dyn Dialect) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("database name is empty"));
        }

        if self.owner().is_some() && !dialect.supports(Feature::DatabaseOwner) {
            return Err(anyhow!(
                "database {}: {}",
                self.name,
                dialect.unsupported(Feature::DatabaseOwner)
            ));
        }
        if !self.default_privileges.is_empty() && !dialect.supports(Feature::DefaultPrivileges) {
            return Err(anyhow!(
                "database {}: {}",
                self.name,
                dialect.unsupported(Feature::DefaultPrivileges)
            ));
        }

        for rule in &self.default_privileges {
            rule.validate(dialect)
                .map_err(|e| anyhow!("database {}: {}", self.name, e))?;
        }

        Ok(())
    }
}
