use super::{CatalogQuery, DefaultObjectClass, Dialect, Feature, GrantTarget, PrivilegeClass};
use crate::config::{RoleOption, RoleOptions};
use crate::error::{Error, Result};

/// Accounts are managed on the `%` host.
const HOST: &str = "%";

const CURRENT_USER: &str = "SELECT SUBSTRING_INDEX(CURRENT_USER(), '@', 1)";

const ROLE_EXISTS: &str = "SELECT 1 FROM mysql.user WHERE User = ? AND Host = '%'";

const DATABASE_EXISTS: &str =
    "SELECT 1 FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";

const ROLE_OPTIONS: &str =
    "SELECT account_locked = 'N' FROM mysql.user WHERE User = ? AND Host = '%'";

const MEMBERSHIPS: &str = "SELECT FROM_USER FROM mysql.role_edges \
     WHERE TO_USER = ? AND TO_HOST = '%' AND FROM_HOST = '%' ORDER BY FROM_USER";

const HAS_MEMBERSHIP: &str = "SELECT 1 FROM mysql.role_edges \
     WHERE TO_USER = ? AND FROM_USER = ? AND TO_HOST = '%' AND FROM_HOST = '%'";

// The privilege argument is either `SELECT` or `SELECT WITH GRANT OPTION`.
const DATABASE_PRIVILEGE: &str = "SELECT COUNT(*) > 0 FROM information_schema.SCHEMA_PRIVILEGES \
     WHERE GRANTEE = CONCAT('''', ?, '''@''%''') AND TABLE_SCHEMA = ? \
     AND ? IN (PRIVILEGE_TYPE, \
     IF(IS_GRANTABLE = 'YES', CONCAT(PRIVILEGE_TYPE, ' WITH GRANT OPTION'), NULL))";

/// MySQL 8 dialect.
///
/// Roles are accounts on the `%` host. A role that cannot log in is a locked
/// account, which is what `CREATE ROLE` creates. Grants are database wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// `'name'@'%'`
    fn account(&self, name: &str) -> String {
        format!("{}@{}", self.quote_literal(name), self.quote_literal(HOST))
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::DatabaseOwner | Feature::DefaultPrivileges => false,
        }
    }

    fn role_options(&self) -> &'static [RoleOption] {
        &[RoleOption::Login]
    }

    /// Account and database names are case sensitive; `` `quoted` `` names
    /// are unquoted.
    fn normalize_identifier(&self, name: &str) -> String {
        let name = name.trim();
        if name.len() >= 2 && name.starts_with('`') && name.ends_with('`') {
            name[1..name.len() - 1].replace("``", "`")
        } else {
            name.to_string()
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    /// Backslashes are escape characters unless NO_BACKSLASH_ESCAPES is set,
    /// so they are doubled along with single quotes.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn canonical_privileges(&self, class: PrivilegeClass) -> &'static [&'static str] {
        match class {
            PrivilegeClass::Database => &[
                "SELECT",
                "INSERT",
                "UPDATE",
                "DELETE",
                "CREATE",
                "DROP",
                "REFERENCES",
                "INDEX",
                "ALTER",
                "CREATE TEMPORARY TABLES",
                "LOCK TABLES",
                "EXECUTE",
                "CREATE VIEW",
                "SHOW VIEW",
                "CREATE ROUTINE",
                "ALTER ROUTINE",
                "EVENT",
                "TRIGGER",
            ],
            _ => &[],
        }
    }

    fn catalog_sql(&self, query: CatalogQuery) -> Option<&'static str> {
        match query {
            CatalogQuery::CurrentUser => Some(CURRENT_USER),
            CatalogQuery::RoleExists => Some(ROLE_EXISTS),
            CatalogQuery::DatabaseExists => Some(DATABASE_EXISTS),
            CatalogQuery::RoleOptions => Some(ROLE_OPTIONS),
            CatalogQuery::Memberships => Some(MEMBERSHIPS),
            CatalogQuery::HasMembership => Some(HAS_MEMBERSHIP),
            CatalogQuery::DatabasePrivilege => Some(DATABASE_PRIVILEGE),
            CatalogQuery::DatabaseOwner
            | CatalogQuery::SchemaPrivilege
            | CatalogQuery::TablePrivilege
            | CatalogQuery::SequencePrivilege
            | CatalogQuery::ParameterPrivilege
            | CatalogQuery::DefaultPrivileges => None,
        }
    }

    fn privilege_query(&self, class: PrivilegeClass) -> Option<CatalogQuery> {
        match class {
            PrivilegeClass::Database => Some(CatalogQuery::DatabasePrivilege),
            _ => None,
        }
    }

    fn object_descriptor(&self, target: &GrantTarget) -> Option<String> {
        match target {
            GrantTarget::Database { database } => Some(database.clone()),
            _ => None,
        }
    }

    fn with_grant_option(&self, privilege: &str) -> String {
        format!("{} WITH GRANT OPTION", privilege)
    }

    fn default_object_code(&self, _class: DefaultObjectClass) -> &'static str {
        ""
    }

    /// ```sql
    /// CREATE USER 'name'@'%' [IDENTIFIED BY 'password']
    /// CREATE ROLE 'name'@'%'
    /// ```
    fn create_role(&self, name: &str, options: &RoleOptions, password: Option<&str>) -> String {
        if !options.login && password.is_none() {
            return format!("CREATE ROLE {}", self.account(name));
        }

        let mut sql = format!("CREATE USER {}", self.account(name));
        if let Some(password) = password {
            sql += &format!(" IDENTIFIED BY {}", self.quote_literal(password));
        }
        if !options.login {
            sql += " ACCOUNT LOCK";
        }

        sql
    }

    fn alter_role(&self, name: &str, changes: &[(RoleOption, bool)]) -> String {
        let mut sql = format!("ALTER USER {}", self.account(name));
        for (option, enabled) in changes {
            if *option == RoleOption::Login {
                sql += if *enabled {
                    " ACCOUNT UNLOCK"
                } else {
                    " ACCOUNT LOCK"
                };
            }
        }

        sql
    }

    fn set_password(&self, name: &str, password: &str) -> String {
        format!(
            "ALTER USER {} IDENTIFIED BY {}",
            self.account(name),
            self.quote_literal(password)
        )
    }

    fn create_database(&self, name: &str, owner: Option<&str>) -> Result<String> {
        if owner.is_some() {
            return Err(self.unsupported(Feature::DatabaseOwner));
        }

        Ok(format!("CREATE DATABASE {}", self.quote_identifier(name)))
    }

    /// ```sql
    /// GRANT privileges ON `db`.* TO 'name'@'%' [WITH GRANT OPTION]
    /// ```
    fn grant(
        &self,
        target: &GrantTarget,
        privileges: &[String],
        grantee: &str,
        with_grant: bool,
    ) -> Result<String> {
        let database = match target {
            GrantTarget::Database { database } => database,
            _ => {
                return Err(Error::invalid(format!(
                    "{} grants are not supported by {}",
                    target.class(),
                    self.name()
                )))
            }
        };

        let mut sql = format!(
            "GRANT {} ON {}.* TO {}",
            self.privilege_list(privileges),
            self.quote_identifier(database),
            self.account(grantee)
        );
        if with_grant {
            sql += " WITH GRANT OPTION";
        }

        Ok(sql)
    }

    fn grant_role(&self, group: &str, member: &str) -> String {
        format!("GRANT {} TO {}", self.account(group), self.account(member))
    }

    fn revoke_role(&self, group: &str, member: &str) -> String {
        format!("REVOKE {} FROM {}", self.account(group), self.account(member))
    }
}
