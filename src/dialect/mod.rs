//! Engine-specific statement building.
//!
//! A [`Dialect`] knows how a given server spells role, database, grant and
//! default-privilege statements, how it quotes identifiers and literals, which
//! privileges make up "ALL" for each object class, and which catalog queries
//! answer the engine's existence and privilege questions. The reconciler only
//! depends on this trait.
//!
//! Engines differ in what they can express at all: MySQL has no database
//! owners, schemas or default privileges. Such gaps are reported through
//! [`Dialect::supports`] and an empty privilege list for the object class, and
//! declarations using them are rejected before anything runs.

mod mysql;
mod postgres;

pub use self::mysql::MysqlDialect;
pub use self::postgres::PostgresDialect;

use crate::config::{DefaultPrivilege, RoleOption, RoleOptions};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Object name meaning "every object of this kind in the schema"
pub const WILDCARD: &str = "*";

/// Sentinel privilege expanded to the full list of an object class
pub const ALL_PRIVILEGES: &str = "ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeClass {
    Database,
    Schema,
    Table,
    Sequence,
    Parameter,
    Function,
    Type,
}

impl fmt::Display for PrivilegeClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrivilegeClass::Database => write!(f, "database"),
            PrivilegeClass::Schema => write!(f, "schema"),
            PrivilegeClass::Table => write!(f, "table"),
            PrivilegeClass::Sequence => write!(f, "sequence"),
            PrivilegeClass::Parameter => write!(f, "parameter"),
            PrivilegeClass::Function => write!(f, "function"),
            PrivilegeClass::Type => write!(f, "type"),
        }
    }
}

/// A table or sequence reference inside a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectName {
    /// `*`: all objects of the kind currently in the schema
    All,
    Named(String),
}

impl ObjectName {
    pub fn parse(name: &str) -> Self {
        if name.trim() == WILDCARD {
            ObjectName::All
        } else {
            ObjectName::Named(name.to_string())
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectName::All => write!(f, "{}", WILDCARD),
            ObjectName::Named(name) => write!(f, "{}", name),
        }
    }
}

/// The resolved scope of a declared grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    Database {
        database: String,
    },
    Schema {
        database: String,
        schema: String,
    },
    Table {
        database: String,
        schema: String,
        table: ObjectName,
    },
    Sequence {
        database: String,
        schema: String,
        sequence: ObjectName,
    },
    Parameter {
        name: String,
    },
}

impl GrantTarget {
    pub fn class(&self) -> PrivilegeClass {
        match self {
            GrantTarget::Database { .. } => PrivilegeClass::Database,
            GrantTarget::Schema { .. } => PrivilegeClass::Schema,
            GrantTarget::Table { .. } => PrivilegeClass::Table,
            GrantTarget::Sequence { .. } => PrivilegeClass::Sequence,
            GrantTarget::Parameter { .. } => PrivilegeClass::Parameter,
        }
    }

    /// The database a grant must be issued in, `None` for server-wide objects
    pub fn database(&self) -> Option<&str> {
        match self {
            GrantTarget::Database { database }
            | GrantTarget::Schema { database, .. }
            | GrantTarget::Table { database, .. }
            | GrantTarget::Sequence { database, .. } => Some(database),
            GrantTarget::Parameter { .. } => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(
            self,
            GrantTarget::Table {
                table: ObjectName::All,
                ..
            } | GrantTarget::Sequence {
                sequence: ObjectName::All,
                ..
            }
        )
    }

    /// Fold every identifier with the dialect's case rules
    pub fn normalize(&self, dialect: &dyn Dialect) -> Self {
        let fold = |name: &str| dialect.normalize_identifier(name);
        let fold_object = |name: &ObjectName| match name {
            ObjectName::All => ObjectName::All,
            ObjectName::Named(name) => ObjectName::Named(fold(name)),
        };

        match self {
            GrantTarget::Database { database } => GrantTarget::Database {
                database: fold(database),
            },
            GrantTarget::Schema { database, schema } => GrantTarget::Schema {
                database: fold(database),
                schema: fold(schema),
            },
            GrantTarget::Table {
                database,
                schema,
                table,
            } => GrantTarget::Table {
                database: fold(database),
                schema: fold(schema),
                table: fold_object(table),
            },
            GrantTarget::Sequence {
                database,
                schema,
                sequence,
            } => GrantTarget::Sequence {
                database: fold(database),
                schema: fold(schema),
                sequence: fold_object(sequence),
            },
            GrantTarget::Parameter { name } => GrantTarget::Parameter { name: fold(name) },
        }
    }
}

impl fmt::Display for GrantTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrantTarget::Database { database } => write!(f, "database {}", database),
            GrantTarget::Schema { database, schema } => {
                write!(f, "schema {}.{}", database, schema)
            }
            GrantTarget::Table {
                database,
                schema,
                table,
            } => write!(f, "table {}.{}.{}", database, schema, table),
            GrantTarget::Sequence {
                database,
                schema,
                sequence,
            } => write!(f, "sequence {}.{}.{}", database, schema, sequence),
            GrantTarget::Parameter { name } => write!(f, "parameter {}", name),
        }
    }
}

/// Object class a default-privilege rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DefaultObjectClass {
    Tables,
    Sequences,
    Functions,
    Types,
    Schemas,
}

impl DefaultObjectClass {
    pub fn privilege_class(self) -> PrivilegeClass {
        match self {
            DefaultObjectClass::Tables => PrivilegeClass::Table,
            DefaultObjectClass::Sequences => PrivilegeClass::Sequence,
            DefaultObjectClass::Functions => PrivilegeClass::Function,
            DefaultObjectClass::Types => PrivilegeClass::Type,
            DefaultObjectClass::Schemas => PrivilegeClass::Schema,
        }
    }
}

impl FromStr for DefaultObjectClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TABLES" => Ok(DefaultObjectClass::Tables),
            "SEQUENCES" => Ok(DefaultObjectClass::Sequences),
            "FUNCTIONS" | "ROUTINES" => Ok(DefaultObjectClass::Functions),
            "TYPES" => Ok(DefaultObjectClass::Types),
            "SCHEMAS" => Ok(DefaultObjectClass::Schemas),
            _ => Err(format!(
                "unknown object class `{}`, expected one of: \
                 tables, sequences, functions, types, schemas",
                s
            )),
        }
    }
}

impl TryFrom<String> for DefaultObjectClass {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DefaultObjectClass> for String {
    fn from(class: DefaultObjectClass) -> Self {
        class.to_string()
    }
}

impl fmt::Display for DefaultObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DefaultObjectClass::Tables => write!(f, "TABLES"),
            DefaultObjectClass::Sequences => write!(f, "SEQUENCES"),
            DefaultObjectClass::Functions => write!(f, "FUNCTIONS"),
            DefaultObjectClass::Types => write!(f, "TYPES"),
            DefaultObjectClass::Schemas => write!(f, "SCHEMAS"),
        }
    }
}

/// Read-only catalog lookups every dialect answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogQuery {
    /// `[]` -> name of the operating principal
    CurrentUser,
    /// `[role]` -> a row when the role exists
    RoleExists,
    /// `[database]` -> a row when the database exists
    DatabaseExists,
    /// `[database]` -> owner name
    DatabaseOwner,
    /// `[role]` -> one boolean per [`Dialect::role_options`], in that order
    RoleOptions,
    /// `[member]` -> one row per group the member directly belongs to
    Memberships,
    /// `[member, group]` -> a row when the direct membership exists
    HasMembership,
    /// `[principal, object, privilege]` -> boolean (or 0/1)
    DatabasePrivilege,
    SchemaPrivilege,
    TablePrivilege,
    SequencePrivilege,
    ParameterPrivilege,
    /// `[acting role, schema or "", object class code, grantee]` -> `(privilege, grantable)` rows
    DefaultPrivileges,
}

impl CatalogQuery {
    pub const ALL: [CatalogQuery; 13] = [
        CatalogQuery::CurrentUser,
        CatalogQuery::RoleExists,
        CatalogQuery::DatabaseExists,
        CatalogQuery::DatabaseOwner,
        CatalogQuery::RoleOptions,
        CatalogQuery::Memberships,
        CatalogQuery::HasMembership,
        CatalogQuery::DatabasePrivilege,
        CatalogQuery::SchemaPrivilege,
        CatalogQuery::TablePrivilege,
        CatalogQuery::SequencePrivilege,
        CatalogQuery::ParameterPrivilege,
        CatalogQuery::DefaultPrivileges,
    ];
}

/// Capabilities not every engine has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    DatabaseOwner,
    DefaultPrivileges,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Feature::DatabaseOwner => write!(f, "database owners"),
            Feature::DefaultPrivileges => write!(f, "default privileges"),
        }
    }
}

/// Returns true when the list is the single "ALL" sentinel
pub fn is_all(privileges: &[String]) -> bool {
    match privileges {
        [single] => {
            let single = single.trim().to_ascii_uppercase();
            single == ALL_PRIVILEGES || single == "ALL PRIVILEGES"
        }
        _ => false,
    }
}

pub trait Dialect {
    /// Engine name used in messages, e.g. "postgres"
    fn name(&self) -> &'static str;

    fn supports(&self, feature: Feature) -> bool;

    /// Role options the engine stores, in the column order of
    /// [`CatalogQuery::RoleOptions`]. The others always keep their default.
    fn role_options(&self) -> &'static [RoleOption];

    fn unsupported(&self, feature: Feature) -> Error {
        Error::invalid(format!("{} are not supported by {}", feature, self.name()))
    }

    /// Fold a declared identifier to the name stored in the catalog
    fn normalize_identifier(&self, name: &str) -> String;

    fn quote_identifier(&self, ident: &str) -> String;

    fn quote_literal(&self, value: &str) -> String;

    /// The privileges "ALL" stands for on the given object class, empty when
    /// the engine cannot grant on that class
    fn canonical_privileges(&self, class: PrivilegeClass) -> &'static [&'static str];

    /// Accepted spellings outside the canonical list (e.g. TEMP)
    fn privilege_aliases(&self, _class: PrivilegeClass) -> &'static [&'static str] {
        &[]
    }

    /// Text of a catalog lookup, `None` when the engine keeps no such record
    fn catalog_sql(&self, query: CatalogQuery) -> Option<&'static str>;

    /// Which catalog query checks privileges of the given class
    fn privilege_query(&self, class: PrivilegeClass) -> Option<CatalogQuery>;

    /// Object argument handed to the privilege check, `None` for wildcard targets
    fn object_descriptor(&self, target: &GrantTarget) -> Option<String>;

    /// Privilege spelling that also requires the grant option
    fn with_grant_option(&self, privilege: &str) -> String;

    /// Catalog code of a default-privilege object class
    fn default_object_code(&self, class: DefaultObjectClass) -> &'static str;

    fn create_role(&self, name: &str, options: &RoleOptions, password: Option<&str>) -> String;

    fn alter_role(&self, name: &str, changes: &[(RoleOption, bool)]) -> String;

    fn set_password(&self, name: &str, password: &str) -> String;

    fn create_database(&self, name: &str, owner: Option<&str>) -> Result<String>;

    fn alter_database_owner(&self, _name: &str, _owner: &str) -> Result<String> {
        Err(self.unsupported(Feature::DatabaseOwner))
    }

    fn grant(
        &self,
        target: &GrantTarget,
        privileges: &[String],
        grantee: &str,
        with_grant: bool,
    ) -> Result<String>;

    fn grant_role(&self, group: &str, member: &str) -> String;

    fn revoke_role(&self, group: &str, member: &str) -> String;

    /// `rule` must already be normalized
    fn alter_default_privileges(&self, _rule: &DefaultPrivilege) -> Result<String> {
        Err(self.unsupported(Feature::DefaultPrivileges))
    }

    /// Expand "ALL" to the canonical list, upper-case everything else
    fn expand_privileges(&self, class: PrivilegeClass, privileges: &[String]) -> Vec<String> {
        if is_all(privileges) {
            self.canonical_privileges(class)
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            privileges
                .iter()
                .map(|p| p.trim().to_ascii_uppercase())
                .collect()
        }
    }

    /// Privilege list as written in a GRANT statement
    fn privilege_list(&self, privileges: &[String]) -> String {
        if is_all(privileges) {
            "ALL PRIVILEGES".to_string()
        } else {
            privileges
                .iter()
                .map(|p| p.trim().to_ascii_uppercase())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    fn validate_privileges(&self, class: PrivilegeClass, privileges: &[String]) -> Result<()> {
        if self.canonical_privileges(class).is_empty() {
            return Err(Error::invalid(format!(
                "{} grants are not supported by {}",
                class,
                self.name()
            )));
        }

        if privileges.is_empty() {
            return Err(Error::invalid(format!("{} privileges are empty", class)));
        }

        if is_all(privileges) {
            return Ok(());
        }

        let valid = self
            .canonical_privileges(class)
            .iter()
            .chain(self.privilege_aliases(class))
            .collect::<Vec<_>>();
        for privilege in privileges {
            let privilege = privilege.trim().to_ascii_uppercase();
            if privilege == ALL_PRIVILEGES {
                return Err(Error::invalid(format!(
                    "{} must be the only privilege in the list",
                    ALL_PRIVILEGES
                )));
            }
            if !valid.iter().any(|v| **v == privilege) {
                return Err(Error::invalid(format!(
                    "invalid {} privilege: {}, expected: {:?}",
                    class, privilege, valid
                )));
            }
        }

        Ok(())
    }
}
