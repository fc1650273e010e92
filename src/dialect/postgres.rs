use super::{
    CatalogQuery, DefaultObjectClass, Dialect, Feature, GrantTarget, ObjectName, PrivilegeClass,
};
use crate::config::{DefaultPrivilege, RoleOption, RoleOptions};
use crate::error::Result;

const ROLE_EXISTS: &str = "SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1";

const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1";

const DATABASE_OWNER: &str = "SELECT pg_catalog.pg_get_userbyid(d.datdba) \
     FROM pg_catalog.pg_database d WHERE d.datname = $1";

const ROLE_OPTIONS: &str = "SELECT rolcanlogin, rolsuper, rolcreatedb, rolcreaterole, \
     rolinherit, rolreplication, rolbypassrls \
     FROM pg_catalog.pg_roles WHERE rolname = $1";

const MEMBERSHIPS: &str = "SELECT g.rolname FROM pg_catalog.pg_auth_members m \
     JOIN pg_catalog.pg_roles g ON g.oid = m.roleid \
     JOIN pg_catalog.pg_roles u ON u.oid = m.member \
     WHERE u.rolname = $1 ORDER BY g.rolname";

const HAS_MEMBERSHIP: &str = "SELECT 1 FROM pg_catalog.pg_auth_members m \
     JOIN pg_catalog.pg_roles g ON g.oid = m.roleid \
     JOIN pg_catalog.pg_roles u ON u.oid = m.member \
     WHERE u.rolname = $1 AND g.rolname = $2";

const DEFAULT_PRIVILEGES: &str = "SELECT a.privilege_type, a.is_grantable \
     FROM pg_catalog.pg_default_acl d \
     JOIN pg_catalog.pg_roles o ON o.oid = d.defaclrole \
     LEFT JOIN pg_catalog.pg_namespace n ON n.oid = d.defaclnamespace \
     CROSS JOIN LATERAL pg_catalog.aclexplode(d.defaclacl) a \
     JOIN pg_catalog.pg_roles g ON g.oid = a.grantee \
     WHERE o.rolname = $1 AND COALESCE(n.nspname, '') = $2 \
     AND d.defaclobjtype::text = $3 AND g.rolname = $4";

/// PostgreSQL (13+) dialect. Parameter privileges need 15+.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn role_option_keyword(option: RoleOption, enabled: bool) -> &'static str {
        match (option, enabled) {
            (RoleOption::Login, true) => "LOGIN",
            (RoleOption::Login, false) => "NOLOGIN",
            (RoleOption::Superuser, true) => "SUPERUSER",
            (RoleOption::Superuser, false) => "NOSUPERUSER",
            (RoleOption::CreateDatabase, true) => "CREATEDB",
            (RoleOption::CreateDatabase, false) => "NOCREATEDB",
            (RoleOption::CreateRole, true) => "CREATEROLE",
            (RoleOption::CreateRole, false) => "NOCREATEROLE",
            (RoleOption::Inherit, true) => "INHERIT",
            (RoleOption::Inherit, false) => "NOINHERIT",
            (RoleOption::Replication, true) => "REPLICATION",
            (RoleOption::Replication, false) => "NOREPLICATION",
            (RoleOption::BypassRowSecurity, true) => "BYPASSRLS",
            (RoleOption::BypassRowSecurity, false) => "NOBYPASSRLS",
        }
    }

    fn qualified(&self, schema: &str, object: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(object)
        )
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::DatabaseOwner | Feature::DefaultPrivileges => true,
        }
    }

    fn role_options(&self) -> &'static [RoleOption] {
        &RoleOption::ALL
    }

    /// Unquoted names fold to lower case, `"Quoted"` names are kept verbatim.
    fn normalize_identifier(&self, name: &str) -> String {
        let name = name.trim();
        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            name[1..name.len() - 1].replace("\"\"", "\"")
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// Escape and quote an identifier: double quotes are doubled.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn canonical_privileges(&self, class: PrivilegeClass) -> &'static [&'static str] {
        match class {
            PrivilegeClass::Database => &["CREATE", "CONNECT", "TEMPORARY"],
            PrivilegeClass::Schema => &["CREATE", "USAGE"],
            PrivilegeClass::Table => &[
                "SELECT",
                "INSERT",
                "UPDATE",
                "DELETE",
                "TRUNCATE",
                "REFERENCES",
                "TRIGGER",
            ],
            PrivilegeClass::Sequence => &["USAGE", "SELECT", "UPDATE"],
            PrivilegeClass::Parameter => &["SET", "ALTER SYSTEM"],
            PrivilegeClass::Function => &["EXECUTE"],
            PrivilegeClass::Type => &["USAGE"],
        }
    }

    fn privilege_aliases(&self, class: PrivilegeClass) -> &'static [&'static str] {
        match class {
            PrivilegeClass::Database => &["TEMP"],
            _ => &[],
        }
    }

    fn catalog_sql(&self, query: CatalogQuery) -> Option<&'static str> {
        let sql = match query {
            CatalogQuery::CurrentUser => "SELECT current_user",
            CatalogQuery::RoleExists => ROLE_EXISTS,
            CatalogQuery::DatabaseExists => DATABASE_EXISTS,
            CatalogQuery::DatabaseOwner => DATABASE_OWNER,
            CatalogQuery::RoleOptions => ROLE_OPTIONS,
            CatalogQuery::Memberships => MEMBERSHIPS,
            CatalogQuery::HasMembership => HAS_MEMBERSHIP,
            CatalogQuery::DatabasePrivilege => {
                "SELECT pg_catalog.has_database_privilege($1::name, $2::text, $3::text)"
            }
            CatalogQuery::SchemaPrivilege => {
                "SELECT pg_catalog.has_schema_privilege($1::name, $2::text, $3::text)"
            }
            CatalogQuery::TablePrivilege => {
                "SELECT pg_catalog.has_table_privilege($1::name, $2::text, $3::text)"
            }
            CatalogQuery::SequencePrivilege => {
                "SELECT pg_catalog.has_sequence_privilege($1::name, $2::text, $3::text)"
            }
            CatalogQuery::ParameterPrivilege => {
                "SELECT pg_catalog.has_parameter_privilege($1::name, $2::text, $3::text)"
            }
            CatalogQuery::DefaultPrivileges => DEFAULT_PRIVILEGES,
        };

        Some(sql)
    }

    fn privilege_query(&self, class: PrivilegeClass) -> Option<CatalogQuery> {
        match class {
            PrivilegeClass::Database => Some(CatalogQuery::DatabasePrivilege),
            PrivilegeClass::Schema => Some(CatalogQuery::SchemaPrivilege),
            PrivilegeClass::Table => Some(CatalogQuery::TablePrivilege),
            PrivilegeClass::Sequence => Some(CatalogQuery::SequencePrivilege),
            PrivilegeClass::Parameter => Some(CatalogQuery::ParameterPrivilege),
            PrivilegeClass::Function | PrivilegeClass::Type => None,
        }
    }

    /// Database, schema and parameter names are passed as-is; table and
    /// sequence names are parsed by the server, so they are quoted.
    fn object_descriptor(&self, target: &GrantTarget) -> Option<String> {
        match target {
            GrantTarget::Database { database } => Some(database.clone()),
            GrantTarget::Schema { schema, .. } => Some(schema.clone()),
            GrantTarget::Table {
                schema,
                table: ObjectName::Named(table),
                ..
            } => Some(self.qualified(schema, table)),
            GrantTarget::Sequence {
                schema,
                sequence: ObjectName::Named(sequence),
                ..
            } => Some(self.qualified(schema, sequence)),
            GrantTarget::Table { .. } | GrantTarget::Sequence { .. } => None,
            GrantTarget::Parameter { name } => Some(name.clone()),
        }
    }

    fn with_grant_option(&self, privilege: &str) -> String {
        format!("{} WITH GRANT OPTION", privilege)
    }

    fn default_object_code(&self, class: DefaultObjectClass) -> &'static str {
        match class {
            DefaultObjectClass::Tables => "r",
            DefaultObjectClass::Sequences => "S",
            DefaultObjectClass::Functions => "f",
            DefaultObjectClass::Types => "T",
            DefaultObjectClass::Schemas => "n",
        }
    }

    /// ```sql
    /// CREATE { ROLE | USER } name [ [ WITH ] option [ ... ] ] [ PASSWORD 'password' ]
    /// ```
    ///
    /// The USER form is used whenever the role can log in.
    fn create_role(&self, name: &str, options: &RoleOptions, password: Option<&str>) -> String {
        let kind = if options.login || password.is_some() {
            "USER"
        } else {
            "ROLE"
        };

        let mut clauses = RoleOption::ALL
            .iter()
            .filter(|option| options.get(**option))
            .map(|option| Self::role_option_keyword(*option, true).to_string())
            .collect::<Vec<_>>();

        // roles inherit unless told otherwise
        if !options.inherit {
            clauses.push(Self::role_option_keyword(RoleOption::Inherit, false).to_string());
        }

        if let Some(password) = password {
            clauses.push(format!("PASSWORD {}", self.quote_literal(password)));
        }

        let mut sql = format!("CREATE {} {}", kind, self.quote_identifier(name));
        if !clauses.is_empty() {
            sql += &format!(" WITH {}", clauses.join(" "));
        }

        sql
    }

    fn alter_role(&self, name: &str, changes: &[(RoleOption, bool)]) -> String {
        let clauses = changes
            .iter()
            .map(|(option, enabled)| Self::role_option_keyword(*option, *enabled))
            .collect::<Vec<_>>()
            .join(" ");

        format!("ALTER ROLE {} WITH {}", self.quote_identifier(name), clauses)
    }

    fn set_password(&self, name: &str, password: &str) -> String {
        format!(
            "ALTER ROLE {} WITH PASSWORD {}",
            self.quote_identifier(name),
            self.quote_literal(password)
        )
    }

    fn create_database(&self, name: &str, owner: Option<&str>) -> Result<String> {
        let mut sql = format!("CREATE DATABASE {}", self.quote_identifier(name));
        if let Some(owner) = owner {
            sql += &format!(" OWNER {}", self.quote_identifier(owner));
        }

        Ok(sql)
    }

    fn alter_database_owner(&self, name: &str, owner: &str) -> Result<String> {
        Ok(format!(
            "ALTER DATABASE {} OWNER TO {}",
            self.quote_identifier(name),
            self.quote_identifier(owner)
        ))
    }

    /// ```sql
    /// GRANT { privilege [, ...] | ALL [ PRIVILEGES ] }
    /// ON { DATABASE db | SCHEMA s | TABLE s.t | ALL TABLES IN SCHEMA s
    ///    | SEQUENCE s.q | ALL SEQUENCES IN SCHEMA s | PARAMETER p }
    /// TO grantee [ WITH GRANT OPTION ]
    /// ```
    fn grant(
        &self,
        target: &GrantTarget,
        privileges: &[String],
        grantee: &str,
        with_grant: bool,
    ) -> Result<String> {
        let on = match target {
            GrantTarget::Database { database } => {
                format!("DATABASE {}", self.quote_identifier(database))
            }
            GrantTarget::Schema { schema, .. } => {
                format!("SCHEMA {}", self.quote_identifier(schema))
            }
            GrantTarget::Table {
                schema,
                table: ObjectName::All,
                ..
            } => format!("ALL TABLES IN SCHEMA {}", self.quote_identifier(schema)),
            GrantTarget::Table {
                schema,
                table: ObjectName::Named(table),
                ..
            } => format!("TABLE {}", self.qualified(schema, table)),
            GrantTarget::Sequence {
                schema,
                sequence: ObjectName::All,
                ..
            } => format!("ALL SEQUENCES IN SCHEMA {}", self.quote_identifier(schema)),
            GrantTarget::Sequence {
                schema,
                sequence: ObjectName::Named(sequence),
                ..
            } => format!("SEQUENCE {}", self.qualified(schema, sequence)),
            GrantTarget::Parameter { name } => {
                format!("PARAMETER {}", self.quote_identifier(name))
            }
        };

        let mut sql = format!(
            "GRANT {} ON {} TO {}",
            self.privilege_list(privileges),
            on,
            self.quote_identifier(grantee)
        );
        if with_grant {
            sql += " WITH GRANT OPTION";
        }

        Ok(sql)
    }

    fn grant_role(&self, group: &str, member: &str) -> String {
        format!(
            "GRANT {} TO {}",
            self.quote_identifier(group),
            self.quote_identifier(member)
        )
    }

    fn revoke_role(&self, group: &str, member: &str) -> String {
        format!(
            "REVOKE {} FROM {}",
            self.quote_identifier(group),
            self.quote_identifier(member)
        )
    }

    /// ```sql
    /// ALTER DEFAULT PRIVILEGES [ FOR ROLE target_role ] [ IN SCHEMA schema_name ]
    /// GRANT privileges ON { TABLES | SEQUENCES | FUNCTIONS | TYPES | SCHEMAS }
    /// TO grantee [ WITH GRANT OPTION ]
    /// ```
    fn alter_default_privileges(&self, rule: &DefaultPrivilege) -> Result<String> {
        let mut sql = "ALTER DEFAULT PRIVILEGES".to_string();
        if let Some(role) = &rule.role {
            sql += &format!(" FOR ROLE {}", self.quote_identifier(role));
        }
        if let Some(schema) = &rule.schema {
            sql += &format!(" IN SCHEMA {}", self.quote_identifier(schema));
        }
        sql += &format!(
            " GRANT {} ON {} TO {}",
            self.privilege_list(&rule.privileges),
            rule.on,
            self.quote_identifier(&rule.to)
        );
        if rule.with_grant {
            sql += " WITH GRANT OPTION";
        }

        Ok(sql)
    }
}
