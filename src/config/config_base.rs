use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::{fmt, fs};

use super::connection::expand;
use super::{Connection, Database, Role, PASSWORD_MASK};

/// The desired state of a server: how to reach it, which databases should
/// exist and which roles should exist with which grants and memberships.
///  - `connection`: the administrative connection, see [Connection].
///  - `databases`: databases with their owner and default privileges, see [Database].
///  - `roles`: roles (users and groups) with their options, grants and
///  memberships, see [Role].
///
/// For example:
///
/// ```yaml
/// connection:
///   type: postgres
///   host: localhost
///   port: 5432
///   username: postgres
///   password: ${POSTGRES_PASSWORD:postgres}
///
/// databases:
///   - name: app
///     owner: app_owner
///     default_privileges:
///       - role: app_owner
///         schema: public
///         privileges: [SELECT, INSERT, UPDATE, DELETE]
///         on: tables
///         to: app_user
///
/// roles:
///   - name: app_owner
///   - name: readers
///     grants:
///       - database: app
///         schema: public
///         table: "*"
///         privileges: [SELECT]
///   - name: app_user
///     password: ${APP_USER_PASSWORD}
///     grants:
///       - database: app
///         privileges: [CONNECT]
///     roles:
///       - readers
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    pub connection: Connection,
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

// Passwords never leave the process through Display.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut masked = self.clone();
        if masked.connection.password.is_some() {
            masked.connection.password = Some(PASSWORD_MASK.to_string());
        }
        for role in masked.roles.iter_mut() {
            if role.password.is_some() {
                role.password = Some(PASSWORD_MASK.to_string());
            }
        }

        let yaml = serde_yaml::to_string(&masked).map_err(|_| fmt::Error)?;
        write!(f, "{}", yaml)
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s)?;

        // Validate
        config.validate()?;

        Ok(config)
    }
}

impl Config {
    pub fn new(config_path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(config_path).context("failed to read config file")?;
        let config: Config = serde_yaml::from_str(&config_str)?;

        config.validate()?;

        // expand env variables
        let config = config.expand_env_vars()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate connection
        self.connection.validate()?;

        let dialect = self.connection.type_.dialect();

        // Validate roles, names are unique once folded
        let mut role_names = HashSet::new();
        for role in &self.roles {
            role.validate(dialect.as_ref())?;

            if !role_names.insert(dialect.normalize_identifier(&role.name)) {
                return Err(anyhow!("duplicated role name: {}", role.name));
            }
        }

        // Validate databases, names are unique once folded
        let mut database_names = HashSet::new();
        for database in &self.databases {
            database.validate(dialect.as_ref())?;

            if !database_names.insert(dialect.normalize_identifier(&database.name)) {
                return Err(anyhow!("duplicated database name: {}", database.name));
            }
        }

        Ok(())
    }

    // Expand env variables in config
    fn expand_env_vars(&self) -> Result<Self> {
        let mut config = self.clone();

        // expand connection
        config.connection = config.connection.expand_env_vars()?;

        // expand role passwords
        for role in config.roles.iter_mut() {
            if let Some(password) = &role.password {
                role.password = Some(expand(password, &format!("roles.{}.password", role.name)));
            }
        }

        Ok(config)
    }
}
