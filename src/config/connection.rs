use crate::dialect::{Dialect, MysqlDialect, PostgresDialect};
use anyhow::{anyhow, Result};
use envmnt::{ExpandOptions, ExpansionType};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection type. Supported values: Postgres, MySQL
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "mysql")]
    Mysql,
}

impl ConnectionType {
    /// The statement dialect spoken by this server type
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            ConnectionType::Postgres => Box::new(PostgresDialect),
            ConnectionType::Mysql => Box::new(MysqlDialect),
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            ConnectionType::Postgres => 5432,
            ConnectionType::Mysql => 3306,
        }
    }

    fn default_username(&self) -> &'static str {
        match self {
            ConnectionType::Postgres => "postgres",
            ConnectionType::Mysql => "root",
        }
    }

    fn default_database(&self) -> &'static str {
        match self {
            ConnectionType::Postgres => "postgres",
            ConnectionType::Mysql => "mysql",
        }
    }
}

/// TLS mode of the connection.
///
/// - `disable`: plain text only
/// - `prefer`: try TLS first, fall back to plain text when the server has none
/// - `require`: TLS only, the server certificate is not verified
/// - `verify-full`: TLS only, the certificate chain and host name are verified
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
    #[serde(rename = "verify-full")]
    VerifyFull,
}

impl SslMode {
    /// Whether the server certificate and host name are checked
    pub fn verify(&self) -> bool {
        *self == SslMode::VerifyFull
    }
}

impl From<SslMode> for postgres::config::SslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => postgres::config::SslMode::Disable,
            SslMode::Prefer => postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyFull => postgres::config::SslMode::Require,
        }
    }
}

/// Connection configuration section.
/// The user on the connection should have the permission to create roles,
/// databases and grant privileges.
///
/// For example:
/// ```yaml
/// connection:
///   type: postgres
///   host: localhost
///   port: 5432
///   username: postgres
///   password: ${POSTGRES_PASSWORD}
///   database: postgres
///   sslmode: disable
/// ```
///
/// `database` is the administrative database; grants and default privileges
/// open their own connection to the database they target.
///
/// `port`, `username` and `database` default per type: `5432`, `postgres`,
/// `postgres` for postgres and `3306`, `root`, `mysql` for mysql.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "RawConnection")]
pub struct Connection {
    #[serde(rename = "type")]
    pub type_: ConnectionType,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database: String,
    pub sslmode: SslMode,
    /// Seconds to wait for each connection to open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    /// Temporarily join the new owner role before transferring database
    /// ownership, needed on managed platforms (e.g. RDS, Cloud SQL).
    pub elevate: bool,
}

/// The connection section as written, before the type defaults apply
#[derive(Deserialize)]
struct RawConnection {
    #[serde(rename = "type", default)]
    type_: ConnectionType,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    sslmode: SslMode,
    #[serde(default)]
    connect_timeout: Option<u64>,
    #[serde(default)]
    elevate: bool,
}

impl From<RawConnection> for Connection {
    fn from(raw: RawConnection) -> Self {
        let type_ = raw.type_;
        Self {
            type_,
            host: raw.host,
            port: raw.port.unwrap_or_else(|| type_.default_port()),
            username: raw
                .username
                .unwrap_or_else(|| type_.default_username().to_string()),
            password: raw.password,
            database: raw
                .database
                .unwrap_or_else(|| type_.default_database().to_string()),
            sslmode: raw.sslmode,
            connect_timeout: raw.connect_timeout,
            elevate: raw.elevate,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Connection {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(anyhow!("connection.host is empty"));
        }
        if self.username.is_empty() {
            return Err(anyhow!("connection.username is empty"));
        }
        if self.database.is_empty() {
            return Err(anyhow!("connection.database is empty"));
        }

        match self.type_ {
            ConnectionType::Postgres => Ok(()),
            // only database owners need elevation
            ConnectionType::Mysql if self.elevate => {
                Err(anyhow!("connection.elevate is not supported by mysql"))
            }
            ConnectionType::Mysql => Ok(()),
        }
    }

    /// `user@host:port/database`, never includes the password
    pub fn describe(&self, database: &str) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, database
        )
    }

    // Expand environment variables in the string fields.
    // For example: password: ${PASSWORD}
    pub fn expand_env_vars(&self) -> Result<Self> {
        let mut connection = self.clone();

        connection.host = expand(&self.host, "connection.host");
        connection.username = expand(&self.username, "connection.username");
        connection.database = expand(&self.database, "connection.database");
        connection.password = self
            .password
            .as_deref()
            .map(|p| expand(p, "connection.password"));

        Ok(connection)
    }
}

/// Expand `${VAR}` and `${VAR:default}` references in `value`.
pub(crate) fn expand(value: &str, field: &str) -> String {
    let options = ExpandOptions {
        expansion_type: Some(ExpansionType::UnixBracketsWithDefaults),
        default_to_empty: false,
    };

    let expanded = envmnt::expand(value, Some(options));

    // Most likely, the user forgot to export the environment variables.
    if expanded.contains("${") {
        warn!(
            "{} may not have fully expanded environment variables",
            field
        );
    }

    expanded
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.describe(&self.database))
    }
}

// Implement default values for connection type and url.
impl Default for Connection {
    fn default() -> Self {
        let type_ = ConnectionType::default();
        Self {
            type_,
            host: default_host(),
            port: type_.default_port(),
            username: type_.default_username().to_string(),
            password: None,
            database: type_.default_database().to_string(),
            sslmode: SslMode::default(),
            connect_timeout: None,
            elevate: false,
        }
    }
}
