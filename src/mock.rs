//! In-memory server used by the unit tests.
//!
//! Catalog lookups are answered from the seeded state. Every statement is
//! recorded and applied to the state, so a second run sees what the first
//! one wrote. Grants on every table or sequence of a schema are recorded only.

use crate::config::{RoleOption, RoleOptions};
use crate::dialect::{
    CatalogQuery, DefaultObjectClass, Dialect, GrantTarget, MysqlDialect, ObjectName,
    PostgresDialect, PrivilegeClass,
};
use crate::error::{DriverError, Error, Result};
use crate::session::{Connector, Row, Session, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub type SharedServer = Rc<RefCell<Server>>;

/// Which server the mock plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Postgres,
    Mysql,
}

impl Engine {
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Engine::Postgres => &PostgresDialect,
            Engine::Mysql => &MysqlDialect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DefaultAcl {
    acting: String,
    schema: String,
    code: String,
    grantee: String,
    privilege: String,
    grantable: bool,
}

#[derive(Debug, Default)]
pub struct Server {
    pub engine: Engine,
    pub current_user: String,
    pub roles: BTreeMap<String, RoleOptions>,
    /// database -> owner
    pub databases: BTreeMap<String, String>,
    /// (member, group)
    pub memberships: BTreeSet<(String, String)>,
    /// (scope database, principal, object, privilege)
    privileges: BTreeSet<(String, String, String, String)>,
    default_acls: BTreeSet<DefaultAcl>,

    /// (database, statement) in execution order
    pub executed: Vec<(String, String)>,
    /// databases in connection order
    pub connections: Vec<String>,
    pub queries: usize,
    fail_on: Vec<String>,
    refused: Vec<String>,
}

impl Server {
    /// A postgres server with a superuser and its `postgres` database
    pub fn new(current_user: &str) -> SharedServer {
        Self::with_engine(Engine::Postgres, current_user, "postgres")
    }

    /// A MySQL server with an administrator and the `mysql` schema
    pub fn mysql(current_user: &str) -> SharedServer {
        Self::with_engine(Engine::Mysql, current_user, "mysql")
    }

    fn with_engine(engine: Engine, current_user: &str, database: &str) -> SharedServer {
        let mut server = Server {
            engine,
            current_user: current_user.to_string(),
            ..Server::default()
        };
        server.add_role(
            current_user,
            RoleOptions {
                login: true,
                superuser: true,
                create_database: true,
                create_role: true,
                ..RoleOptions::default()
            },
        );
        server.add_database(database, current_user);

        Rc::new(RefCell::new(server))
    }

    pub fn add_role(&mut self, name: &str, options: RoleOptions) {
        self.roles.insert(name.to_string(), options);
    }

    pub fn add_database(&mut self, name: &str, owner: &str) {
        self.databases.insert(name.to_string(), owner.to_string());
    }

    pub fn add_membership(&mut self, member: &str, group: &str) {
        self.memberships
            .insert((member.to_string(), group.to_string()));
    }

    fn scope(class: PrivilegeClass, database: Option<&str>) -> String {
        match class {
            PrivilegeClass::Schema | PrivilegeClass::Table | PrivilegeClass::Sequence => {
                database.unwrap_or_default().to_string()
            }
            _ => String::new(),
        }
    }

    /// Record a privilege as held. Wildcard targets are stored under their
    /// display name so lookups can never match them.
    pub fn add_privilege(
        &mut self,
        principal: &str,
        target: &GrantTarget,
        privilege: &str,
        with_grant: bool,
    ) {
        let dialect = self.engine.dialect();
        let object = dialect
            .object_descriptor(target)
            .unwrap_or_else(|| target.to_string());
        let scope = Self::scope(target.class(), target.database());

        self.privileges.insert((
            scope.clone(),
            principal.to_string(),
            object.clone(),
            privilege.to_string(),
        ));
        if with_grant {
            self.privileges.insert((
                scope,
                principal.to_string(),
                object,
                dialect.with_grant_option(privilege),
            ));
        }
    }

    /// Record every expanded privilege of a grant as held
    pub fn add_privileges(
        &mut self,
        principal: &str,
        target: &GrantTarget,
        privileges: &[&str],
        with_grant: bool,
    ) {
        for privilege in privileges {
            self.add_privilege(principal, target, privilege, with_grant);
        }
    }

    pub fn add_default_privilege(
        &mut self,
        acting: &str,
        schema: Option<&str>,
        class: DefaultObjectClass,
        grantee: &str,
        privilege: &str,
        grantable: bool,
    ) {
        self.default_acls.insert(DefaultAcl {
            acting: acting.to_string(),
            schema: schema.unwrap_or_default().to_string(),
            code: self.engine.dialect().default_object_code(class).to_string(),
            grantee: grantee.to_string(),
            privilege: privilege.to_string(),
            grantable,
        });
    }

    /// Fail every statement or lookup whose text contains `pattern`
    pub fn fail_on(&mut self, pattern: &str) {
        self.fail_on.push(pattern.to_string());
    }

    /// Refuse connections to `database`
    pub fn refuse(&mut self, database: &str) {
        self.refused.push(database.to_string());
    }

    /// Statements issued, without the database they ran in
    pub fn statements(&self) -> Vec<String> {
        self.executed.iter().map(|(_, sql)| sql.clone()).collect()
    }

    fn check_failure(&self, sql: &str) -> std::result::Result<(), DriverError> {
        match self.fail_on.iter().find(|pattern| sql.contains(pattern.as_str())) {
            Some(pattern) => Err(format!("mock failure on `{}`", pattern).into()),
            None => Ok(()),
        }
    }

    fn interpret(&mut self, database: &str, sql: &str) {
        match self.engine {
            Engine::Postgres => self.interpret_postgres(database, sql),
            Engine::Mysql => self.interpret_mysql(sql),
        }
    }

    fn interpret_postgres(&mut self, database: &str, sql: &str) {
        let names = quoted(sql, '"');

        if sql.starts_with("CREATE ROLE ") || sql.starts_with("CREATE USER ") {
            if let Some(name) = names.first() {
                let mut options = RoleOptions::default();
                for (option, enabled) in role_keywords(sql) {
                    options.set(option, enabled);
                }
                self.roles.entry(name.clone()).or_insert(options);
            }
        } else if sql.starts_with("ALTER ROLE ") {
            if let Some(options) = names.first().and_then(|name| self.roles.get_mut(name)) {
                for (option, enabled) in role_keywords(sql) {
                    options.set(option, enabled);
                }
            }
        } else if sql.starts_with("CREATE DATABASE ") {
            if let Some(name) = names.first() {
                let owner = names
                    .get(1)
                    .cloned()
                    .unwrap_or_else(|| self.current_user.clone());
                self.databases.insert(name.clone(), owner);
            }
        } else if sql.starts_with("ALTER DATABASE ") {
            if let [name, owner] = names.as_slice() {
                self.databases.insert(name.clone(), owner.clone());
            }
        } else if sql.starts_with("ALTER DEFAULT PRIVILEGES") {
            self.record_default_privileges(sql);
        } else if sql.starts_with("GRANT \"") {
            if let [group, member] = names.as_slice() {
                self.memberships.insert((member.clone(), group.clone()));
            }
        } else if sql.starts_with("REVOKE \"") {
            if let [group, member] = names.as_slice() {
                self.memberships.remove(&(member.clone(), group.clone()));
            }
        } else if let Some(grant) = sql.strip_prefix("GRANT ").and_then(grant_clause) {
            let target = postgres_target(grant.on, database);
            if let (Some(target), Some(grantee)) = (target, quoted(grant.grantee, '"').pop()) {
                self.record_grant(&target, &grant.privileges, &grantee, grant.with_grant);
            }
        }
    }

    fn interpret_mysql(&mut self, sql: &str) {
        let names = accounts(sql);

        if sql.starts_with("CREATE USER ") || sql.starts_with("CREATE ROLE ") {
            if let Some(name) = names.first() {
                let options = RoleOptions {
                    login: sql.starts_with("CREATE USER ") && !sql.ends_with(" ACCOUNT LOCK"),
                    ..RoleOptions::default()
                };
                self.roles.entry(name.clone()).or_insert(options);
            }
        } else if sql.starts_with("ALTER USER ") {
            if let Some(options) = names.first().and_then(|name| self.roles.get_mut(name)) {
                if sql.ends_with(" ACCOUNT UNLOCK") {
                    options.login = true;
                } else if sql.ends_with(" ACCOUNT LOCK") {
                    options.login = false;
                }
            }
        } else if sql.starts_with("CREATE DATABASE ") {
            if let Some(name) = quoted(sql, '`').first() {
                self.databases
                    .insert(name.clone(), self.current_user.clone());
            }
        } else if sql.starts_with("GRANT '") {
            if let [group, member] = names.as_slice() {
                self.memberships.insert((member.clone(), group.clone()));
            }
        } else if sql.starts_with("REVOKE '") {
            if let [group, member] = names.as_slice() {
                self.memberships.remove(&(member.clone(), group.clone()));
            }
        } else if let Some(grant) = sql.strip_prefix("GRANT ").and_then(grant_clause) {
            let database = quoted(grant.on, '`').pop();
            if let (Some(database), Some(grantee)) = (database, accounts(grant.grantee).pop()) {
                let target = GrantTarget::Database { database };
                self.record_grant(&target, &grant.privileges, &grantee, grant.with_grant);
            }
        }
    }

    fn record_grant(
        &mut self,
        target: &GrantTarget,
        privileges: &[String],
        grantee: &str,
        with_grant: bool,
    ) {
        let privileges = self
            .engine
            .dialect()
            .expand_privileges(target.class(), privileges);
        for privilege in &privileges {
            self.add_privilege(grantee, target, privilege, with_grant);
        }
    }

    /// `ALTER DEFAULT PRIVILEGES [FOR ROLE r] [IN SCHEMA s] GRANT ... ON class TO g`
    fn record_default_privileges(&mut self, sql: &str) {
        let (head, clause) = match sql.split_once(" GRANT ") {
            Some(parts) => parts,
            None => return,
        };
        let grant = match grant_clause(clause) {
            Some(grant) => grant,
            None => return,
        };
        let class = grant.on.parse::<DefaultObjectClass>();
        let (class, grantee) = match (class, quoted(grant.grantee, '"').pop()) {
            (Ok(class), Some(grantee)) => (class, grantee),
            _ => return,
        };

        let clause_name = |keyword: &str| {
            head.split_once(keyword)
                .and_then(|(_, rest)| quoted(rest, '"').into_iter().next())
        };
        let acting = clause_name("FOR ROLE ").unwrap_or_else(|| self.current_user.clone());
        let schema = clause_name("IN SCHEMA ");

        let privileges = self
            .engine
            .dialect()
            .expand_privileges(class.privilege_class(), &grant.privileges);
        for privilege in &privileges {
            self.add_default_privilege(
                &acting,
                schema.as_deref(),
                class,
                &grantee,
                privilege,
                grant.with_grant,
            );
        }
    }

    /// MySQL has no boolean type
    fn boolean(&self, value: bool) -> Value {
        match self.engine {
            Engine::Postgres => Value::Bool(value),
            Engine::Mysql => Value::Int(value as i64),
        }
    }

    fn answer(&self, database: &str, query: CatalogQuery, params: &[&str]) -> Vec<Row> {
        let param = |idx: usize| params.get(idx).copied().unwrap_or_default();
        let found = |exists: bool| {
            if exists {
                vec![vec![Value::Int(1)]]
            } else {
                vec![]
            }
        };

        match query {
            CatalogQuery::CurrentUser => vec![vec![Value::Text(self.current_user.clone())]],
            CatalogQuery::RoleExists => found(self.roles.contains_key(param(0))),
            CatalogQuery::DatabaseExists => found(self.databases.contains_key(param(0))),
            CatalogQuery::DatabaseOwner => self
                .databases
                .get(param(0))
                .map(|owner| vec![vec![Value::Text(owner.clone())]])
                .unwrap_or_default(),
            CatalogQuery::RoleOptions => self
                .roles
                .get(param(0))
                .map(|options| {
                    vec![self
                        .engine
                        .dialect()
                        .role_options()
                        .iter()
                        .map(|option| self.boolean(options.get(*option)))
                        .collect()]
                })
                .unwrap_or_default(),
            CatalogQuery::Memberships => self
                .memberships
                .iter()
                .filter(|(member, _)| member == param(0))
                .map(|(_, group)| vec![Value::Text(group.clone())])
                .collect(),
            CatalogQuery::HasMembership => found(
                self.memberships
                    .contains(&(param(0).to_string(), param(1).to_string())),
            ),
            CatalogQuery::DatabasePrivilege
            | CatalogQuery::SchemaPrivilege
            | CatalogQuery::TablePrivilege
            | CatalogQuery::SequencePrivilege
            | CatalogQuery::ParameterPrivilege => {
                let class = match query {
                    CatalogQuery::DatabasePrivilege => PrivilegeClass::Database,
                    CatalogQuery::SchemaPrivilege => PrivilegeClass::Schema,
                    CatalogQuery::TablePrivilege => PrivilegeClass::Table,
                    CatalogQuery::SequencePrivilege => PrivilegeClass::Sequence,
                    _ => PrivilegeClass::Parameter,
                };
                let key = (
                    Self::scope(class, Some(database)),
                    param(0).to_string(),
                    param(1).to_string(),
                    param(2).to_string(),
                );
                vec![vec![self.boolean(self.privileges.contains(&key))]]
            }
            CatalogQuery::DefaultPrivileges => self
                .default_acls
                .iter()
                .filter(|acl| {
                    acl.acting == param(0)
                        && acl.schema == param(1)
                        && acl.code == param(2)
                        && acl.grantee == param(3)
                })
                .map(|acl| vec![Value::Text(acl.privilege.clone()), self.boolean(acl.grantable)])
                .collect(),
        }
    }
}

/// Names quoted with `quote` in a statement, in order
fn quoted(sql: &str, quote: char) -> Vec<String> {
    let mut names = vec![];
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c != quote {
            continue;
        }

        let mut name = String::new();
        while let Some(c) = chars.next() {
            if c != quote {
                name.push(c);
            } else if chars.peek() == Some(&quote) {
                chars.next();
                name.push(quote);
            } else {
                break;
            }
        }
        names.push(name);
    }

    names
}

/// User names of the `'name'@'%'` accounts of a MySQL statement
fn accounts(sql: &str) -> Vec<String> {
    let mut parts = sql.split("@'%'").collect::<Vec<_>>();
    parts.pop();

    parts
        .into_iter()
        .filter_map(|part| quoted(part, '\'').pop())
        .collect()
}

/// `privileges ON object TO grantee [WITH GRANT OPTION]`
struct GrantClause<'a> {
    privileges: Vec<String>,
    on: &'a str,
    grantee: &'a str,
    with_grant: bool,
}

fn grant_clause(clause: &str) -> Option<GrantClause<'_>> {
    let (privileges, rest) = clause.split_once(" ON ")?;
    let (on, grantee) = rest.rsplit_once(" TO ")?;
    let (grantee, with_grant) = match grantee.strip_suffix(" WITH GRANT OPTION") {
        Some(grantee) => (grantee, true),
        None => (grantee, false),
    };

    Some(GrantClause {
        privileges: privileges.split(", ").map(str::to_string).collect(),
        on,
        grantee,
        with_grant,
    })
}

/// Target of a postgres `GRANT ... ON` clause run in `database`.
/// `ALL TABLES IN SCHEMA` style targets have nothing a lookup can match.
fn postgres_target(on: &str, database: &str) -> Option<GrantTarget> {
    let names = quoted(on, '"');
    let kind = on.split_whitespace().next()?;

    let target = match (kind, names.as_slice()) {
        ("DATABASE", [name]) => GrantTarget::Database {
            database: name.clone(),
        },
        ("SCHEMA", [schema]) => GrantTarget::Schema {
            database: database.to_string(),
            schema: schema.clone(),
        },
        ("TABLE", [schema, table]) => GrantTarget::Table {
            database: database.to_string(),
            schema: schema.clone(),
            table: ObjectName::Named(table.clone()),
        },
        ("SEQUENCE", [schema, sequence]) => GrantTarget::Sequence {
            database: database.to_string(),
            schema: schema.clone(),
            sequence: ObjectName::Named(sequence.clone()),
        },
        ("PARAMETER", [name]) => GrantTarget::Parameter { name: name.clone() },
        _ => return None,
    };

    Some(target)
}

/// Role attribute keywords following `WITH`, up to a password clause
fn role_keywords(sql: &str) -> Vec<(RoleOption, bool)> {
    let clause = match sql.split_once(" WITH ") {
        Some((_, clause)) => clause,
        None => return vec![],
    };
    let clause = clause.split("PASSWORD").next().unwrap_or_default();

    clause
        .split_whitespace()
        .filter_map(|word| {
            let (enabled, keyword) = match word.strip_prefix("NO") {
                Some(keyword) => (false, keyword),
                None => (true, word),
            };
            let option = match keyword {
                "LOGIN" => RoleOption::Login,
                "SUPERUSER" => RoleOption::Superuser,
                "CREATEDB" => RoleOption::CreateDatabase,
                "CREATEROLE" => RoleOption::CreateRole,
                "INHERIT" => RoleOption::Inherit,
                "REPLICATION" => RoleOption::Replication,
                "BYPASSRLS" => RoleOption::BypassRowSecurity,
                _ => return None,
            };
            Some((option, enabled))
        })
        .collect()
}

pub struct MockSession {
    server: SharedServer,
    database: String,
}

impl Session for MockSession {
    fn execute(&mut self, statement: &str) -> std::result::Result<u64, DriverError> {
        let mut server = self.server.borrow_mut();
        server.check_failure(statement)?;
        server
            .executed
            .push((self.database.clone(), statement.to_string()));
        server.interpret(&self.database, statement);

        Ok(0)
    }

    fn query_rows(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<Row>, DriverError> {
        let mut server = self.server.borrow_mut();
        server.check_failure(query)?;
        server.queries += 1;

        let dialect = server.engine.dialect();
        let catalog_query = CatalogQuery::ALL
            .iter()
            .find(|q| dialect.catalog_sql(**q) == Some(query))
            .ok_or_else(|| format!("unexpected query: {}", query))?;

        Ok(server.answer(&self.database, *catalog_query, params))
    }

    fn ping(&mut self) -> std::result::Result<(), DriverError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockConnector {
    server: SharedServer,
}

impl MockConnector {
    pub fn new(server: SharedServer) -> Self {
        Self { server }
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn connect(&self, database: &str) -> Result<MockSession> {
        let mut server = self.server.borrow_mut();
        if server.refused.iter().any(|d| d == database) {
            return Err(Error::connection(
                format!("mock/{}", database),
                "connection refused",
            ));
        }
        server.connections.push(database.to_string());

        Ok(MockSession {
            server: self.server.clone(),
            database: database.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(server: &SharedServer, database: &str, query: CatalogQuery, params: &[&str]) -> bool {
        let rows = server.borrow().answer(database, query, params);
        rows.first()
            .and_then(|row| row.first())
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[test]
    fn test_privilege_grants_are_applied() {
        let server = Server::new("postgres");
        let connector = MockConnector::new(server.clone());
        let mut session = connector.connect("app").unwrap();

        session
            .execute("GRANT SELECT, INSERT ON TABLE \"public\".\"orders\" TO \"app_user\"")
            .unwrap();
        session
            .execute("GRANT ALL PRIVILEGES ON DATABASE \"app\" TO \"app_user\" WITH GRANT OPTION")
            .unwrap();
        session
            .execute("GRANT SELECT ON ALL TABLES IN SCHEMA \"public\" TO \"readers\"")
            .unwrap();

        let orders = "\"public\".\"orders\"";
        let table = CatalogQuery::TablePrivilege;
        assert!(held(&server, "app", table, &["app_user", orders, "INSERT"]));
        assert!(!held(&server, "other", table, &["app_user", orders, "INSERT"]));
        assert!(!held(&server, "app", table, &["app_user", orders, "DELETE"]));

        let database = CatalogQuery::DatabasePrivilege;
        let connect = "CONNECT WITH GRANT OPTION";
        assert!(held(&server, "postgres", database, &["app_user", "app", connect]));

        // the schema-wide grant is not recorded
        assert_eq!(server.borrow().privileges.len(), 8);
    }

    #[test]
    fn test_default_privileges_are_applied() {
        let server = Server::new("postgres");
        let connector = MockConnector::new(server.clone());
        let mut session = connector.connect("app").unwrap();

        session
            .execute(
                "ALTER DEFAULT PRIVILEGES FOR ROLE \"owner\" IN SCHEMA \"public\" \
                 GRANT SELECT ON TABLES TO \"app_user\"",
            )
            .unwrap();
        session
            .execute("ALTER DEFAULT PRIVILEGES GRANT USAGE ON SEQUENCES TO \"app_user\"")
            .unwrap();

        let acls = server.borrow().default_acls.clone();
        assert!(acls.contains(&DefaultAcl {
            acting: "owner".to_string(),
            schema: "public".to_string(),
            code: "r".to_string(),
            grantee: "app_user".to_string(),
            privilege: "SELECT".to_string(),
            grantable: false,
        }));
        assert!(acls.contains(&DefaultAcl {
            acting: "postgres".to_string(),
            schema: String::new(),
            code: "S".to_string(),
            grantee: "app_user".to_string(),
            privilege: "USAGE".to_string(),
            grantable: false,
        }));
    }

    #[test]
    fn test_mysql_statements_are_applied() {
        let server = Server::mysql("root");
        let connector = MockConnector::new(server.clone());
        let mut session = connector.connect("mysql").unwrap();

        for sql in [
            "CREATE USER 'app'@'%' IDENTIFIED BY 'secret'",
            "CREATE ROLE 'readers'@'%'",
            "CREATE DATABASE `app`",
            "GRANT 'readers'@'%' TO 'app'@'%'",
            "GRANT SELECT ON `app`.* TO 'app'@'%' WITH GRANT OPTION",
        ] {
            session.execute(sql).unwrap();
        }

        {
            let s = server.borrow();
            assert!(s.roles["app"].login);
            assert!(!s.roles["readers"].login);
            assert_eq!(s.databases["app"], "root");
            assert!(s
                .memberships
                .contains(&("app".to_string(), "readers".to_string())));
        }

        let database = CatalogQuery::DatabasePrivilege;
        let select = "SELECT WITH GRANT OPTION";
        assert!(held(&server, "app", database, &["app", "app", select]));

        session.execute("ALTER USER 'app'@'%' ACCOUNT LOCK").unwrap();
        assert!(!server.borrow().roles["app"].login);
    }
}
