use crate::dialect::{Dialect, GrantTarget, ObjectName, WILDCARD};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A privilege grant declared on a role.
///
/// Exactly one scope combination is allowed:
///
/// ```yaml
/// - database: app                 # database
///   privileges: [CONNECT, TEMP]
/// - database: app                 # schema
///   schema: public
///   privileges: [USAGE]
/// - database: app                 # one table, or every table with "*"
///   schema: public
///   table: "*"
///   privileges: [ALL]
/// - database: app                 # one sequence, or every sequence with "*"
///   schema: public
///   sequence: order_ids
///   privileges: [USAGE, SELECT]
/// - parameter: session_replication_role
///   privileges: [SET]
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Grant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    pub privileges: Vec<String>,
    #[serde(default)]
    pub with_grant: bool,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn not_wildcard<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    if value == WILDCARD {
        return Err(Error::invalid(format!("{} cannot be `{}`", field, WILDCARD)));
    }

    Ok(value)
}

impl Grant {
    /// Resolve the declared fields to a grant scope.
    pub fn target(&self) -> Result<GrantTarget> {
        let database = present(&self.database);
        let schema = present(&self.schema);
        let table = present(&self.table);
        let sequence = present(&self.sequence);
        let parameter = present(&self.parameter);

        match (database, schema, table, sequence, parameter) {
            (None, None, None, None, Some(name)) => Ok(GrantTarget::Parameter {
                name: not_wildcard(name, "parameter")?.to_string(),
            }),
            (_, _, _, _, Some(_)) => Err(Error::invalid(
                "a parameter grant cannot name a database, schema, table or sequence",
            )),
            (None, _, _, _, None) => Err(Error::invalid(
                "grant must name a database or a parameter",
            )),
            (Some(_), _, Some(_), Some(_), None) => Err(Error::invalid(
                "grant cannot name both a table and a sequence",
            )),
            (Some(_), None, Some(_), None, None) | (Some(_), None, None, Some(_), None) => {
                Err(Error::invalid("table and sequence grants require a schema"))
            }
            (Some(database), None, None, None, None) => Ok(GrantTarget::Database {
                database: not_wildcard(database, "database")?.to_string(),
            }),
            (Some(database), Some(schema), None, None, None) => Ok(GrantTarget::Schema {
                database: not_wildcard(database, "database")?.to_string(),
                schema: not_wildcard(schema, "schema")?.to_string(),
            }),
            (Some(database), Some(schema), Some(table), None, None) => Ok(GrantTarget::Table {
                database: not_wildcard(database, "database")?.to_string(),
                schema: not_wildcard(schema, "schema")?.to_string(),
                table: ObjectName::parse(table),
            }),
            (Some(database), Some(schema), None, Some(sequence), None) => {
                Ok(GrantTarget::Sequence {
                    database: not_wildcard(database, "database")?.to_string(),
                    schema: not_wildcard(schema, "schema")?.to_string(),
                    sequence: ObjectName::parse(sequence),
                })
            }
        }
    }

    pub fn validate(&self, dialect: &dyn Dialect) -> Result<()> {
        let target = self.target()?;
        dialect.validate_privileges(target.class(), &self.privileges)
    }
}
