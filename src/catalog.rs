//! Read-only questions about the live state of the server.

use crate::config::RoleOptions;
use crate::dialect::{CatalogQuery, DefaultObjectClass, Dialect, GrantTarget};
use crate::error::{Error, Result};
use crate::session::{Row, Session, Value};

/// Catalog lookups through a borrowed session.
///
/// Every identifier handed to a `Catalog` must already be normalized by the
/// dialect; lookups compare names exactly.
pub struct Catalog<'a, S: Session + ?Sized> {
    session: &'a mut S,
    dialect: &'a dyn Dialect,
}

impl<'a, S: Session + ?Sized> Catalog<'a, S> {
    pub fn new(session: &'a mut S, dialect: &'a dyn Dialect) -> Self {
        Self { session, dialect }
    }

    /// Rows of a lookup; an engine without the record answers with none
    fn rows(&mut self, query: CatalogQuery, params: &[&str], purpose: &str) -> Result<Vec<Row>> {
        match self.dialect.catalog_sql(query) {
            Some(sql) => self
                .session
                .query_rows(sql, params)
                .map_err(|e| Error::statement(purpose, e)),
            None => Ok(Vec::new()),
        }
    }

    fn scalar(
        &mut self,
        query: CatalogQuery,
        params: &[&str],
        purpose: &str,
    ) -> Result<Option<Value>> {
        match self.dialect.catalog_sql(query) {
            Some(sql) => self
                .session
                .query_scalar(sql, params)
                .map_err(|e| Error::statement(purpose, e)),
            None => Ok(None),
        }
    }

    fn exists(&mut self, query: CatalogQuery, params: &[&str], purpose: &str) -> Result<bool> {
        Ok(self.scalar(query, params, purpose)?.is_some())
    }

    /// The principal the session is authenticated as
    pub fn current_user(&mut self) -> Result<String> {
        self.scalar(CatalogQuery::CurrentUser, &[], "look up the current user")?
            .and_then(Value::into_string)
            .ok_or_else(|| Error::statement("look up the current user", "no current user returned"))
    }

    pub fn role_exists(&mut self, role: &str) -> Result<bool> {
        self.exists(
            CatalogQuery::RoleExists,
            &[role],
            &format!("check whether role `{}` exists", role),
        )
    }

    pub fn database_exists(&mut self, database: &str) -> Result<bool> {
        self.exists(
            CatalogQuery::DatabaseExists,
            &[database],
            &format!("check whether database `{}` exists", database),
        )
    }

    pub fn database_owner(&mut self, database: &str) -> Result<Option<String>> {
        let owner = self.scalar(
            CatalogQuery::DatabaseOwner,
            &[database],
            &format!("look up the owner of database `{}`", database),
        )?;

        Ok(owner.and_then(Value::into_string))
    }

    /// Live attributes of a role, `None` when the role does not exist
    pub fn role_options(&mut self, role: &str) -> Result<Option<RoleOptions>> {
        let purpose = format!("read the options of role `{}`", role);
        let rows = self.rows(CatalogQuery::RoleOptions, &[role], &purpose)?;

        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Ok(None),
        };
        let stored = self.dialect.role_options();
        if row.len() < stored.len() {
            return Err(Error::statement(
                purpose,
                format!("expected {} columns, got {}", stored.len(), row.len()),
            ));
        }

        let mut options = RoleOptions::default();
        for (option, value) in stored.iter().zip(row.iter()) {
            options.set(*option, value.as_bool().unwrap_or(false));
        }

        Ok(Some(options))
    }

    /// Groups `member` directly belongs to
    pub fn memberships(&mut self, member: &str) -> Result<Vec<String>> {
        let rows = self.rows(
            CatalogQuery::Memberships,
            &[member],
            &format!("list the groups of `{}`", member),
        )?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(Value::into_string))
            .collect())
    }

    pub fn has_membership(&mut self, member: &str, group: &str) -> Result<bool> {
        self.exists(
            CatalogQuery::HasMembership,
            &[member, group],
            &format!("check whether `{}` is a member of `{}`", member, group),
        )
    }

    /// Whether `principal` holds one privilege on the target.
    /// Wildcard targets are never considered held.
    pub fn has_privilege(
        &mut self,
        principal: &str,
        target: &GrantTarget,
        privilege: &str,
        with_grant: bool,
    ) -> Result<bool> {
        let query = match self.dialect.privilege_query(target.class()) {
            Some(query) => query,
            None => return Ok(false),
        };
        let object = match self.dialect.object_descriptor(target) {
            Some(object) => object,
            None => return Ok(false),
        };

        let privilege = if with_grant {
            self.dialect.with_grant_option(privilege)
        } else {
            privilege.to_string()
        };

        let held = self.scalar(
            query,
            &[principal, &object, &privilege],
            &format!("check {} on {} for `{}`", privilege, target, principal),
        )?;

        Ok(held.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    /// Whether `principal` holds every privilege of an already expanded list
    pub fn has_privileges(
        &mut self,
        principal: &str,
        target: &GrantTarget,
        privileges: &[String],
        with_grant: bool,
    ) -> Result<bool> {
        if target.is_wildcard() || privileges.is_empty() {
            return Ok(false);
        }

        for privilege in privileges {
            if !self.has_privilege(principal, target, privilege, with_grant)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Whether a default-privilege rule is already recorded.
    ///
    /// `privileges` must be expanded. Rules scoped to every schema are looked
    /// up with an empty schema name.
    pub fn has_default_privileges(
        &mut self,
        acting: &str,
        schema: Option<&str>,
        class: DefaultObjectClass,
        grantee: &str,
        privileges: &[String],
        with_grant: bool,
    ) -> Result<bool> {
        let code = self.dialect.default_object_code(class);
        let rows = self.rows(
            CatalogQuery::DefaultPrivileges,
            &[acting, schema.unwrap_or(""), code, grantee],
            &format!("read default privileges of `{}` on {}", acting, class),
        )?;

        let recorded = rows
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_iter();
                let privilege = values.next().and_then(Value::into_string)?;
                let grantable = values.next().and_then(|v| v.as_bool()).unwrap_or(false);
                Some((privilege.to_ascii_uppercase(), grantable))
            })
            .collect::<Vec<_>>();

        Ok(!privileges.is_empty()
            && privileges.iter().all(|privilege| {
                recorded
                    .iter()
                    .any(|(p, grantable)| p == privilege && (!with_grant || *grantable))
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MysqlDialect, ObjectName, PostgresDialect};
    use crate::mock::{MockConnector, Server};
    use crate::session::Connector;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_role_and_database_lookups() {
        let server = Server::new("postgres");
        {
            let mut s = server.borrow_mut();
            s.add_role("app_user", RoleOptions::default());
            s.add_database("app", "app_user");
        }

        let connector = MockConnector::new(server);
        let mut session = connector.connect("postgres").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        assert_eq!(catalog.current_user().unwrap(), "postgres");
        assert!(catalog.role_exists("app_user").unwrap());
        assert!(!catalog.role_exists("App_User").unwrap());
        assert!(catalog.database_exists("app").unwrap());
        assert!(!catalog.database_exists("other").unwrap());
        assert_eq!(catalog.database_owner("app").unwrap().as_deref(), Some("app_user"));
        assert_eq!(catalog.database_owner("other").unwrap(), None);
    }

    #[test]
    fn test_role_options_and_memberships() {
        let server = Server::new("postgres");
        {
            let mut s = server.borrow_mut();
            s.add_role(
                "app_user",
                RoleOptions {
                    login: true,
                    inherit: false,
                    ..RoleOptions::default()
                },
            );
            s.add_role("readers", RoleOptions::default());
            s.add_role("writers", RoleOptions::default());
            s.add_membership("app_user", "writers");
            s.add_membership("app_user", "readers");
        }

        let connector = MockConnector::new(server);
        let mut session = connector.connect("postgres").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        let options = catalog.role_options("app_user").unwrap().unwrap();
        assert!(options.login);
        assert!(!options.inherit);
        assert!(catalog.role_options("ghost").unwrap().is_none());

        assert_eq!(
            catalog.memberships("app_user").unwrap(),
            strings(&["readers", "writers"])
        );
        assert!(catalog.has_membership("app_user", "readers").unwrap());
        assert!(!catalog.has_membership("readers", "app_user").unwrap());
    }

    #[test]
    fn test_has_privileges() {
        let target = GrantTarget::Table {
            database: "app".to_string(),
            schema: "public".to_string(),
            table: ObjectName::Named("orders".to_string()),
        };

        let server = Server::new("postgres");
        {
            let mut s = server.borrow_mut();
            s.add_privilege("app_user", &target, "SELECT", false);
            s.add_privilege("app_user", &target, "INSERT", true);
        }

        let connector = MockConnector::new(server);
        let mut session = connector.connect("app").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        assert!(catalog
            .has_privileges("app_user", &target, &strings(&["SELECT"]), false)
            .unwrap());
        assert!(catalog
            .has_privileges("app_user", &target, &strings(&["SELECT", "INSERT"]), false)
            .unwrap());
        assert!(!catalog
            .has_privileges("app_user", &target, &strings(&["SELECT", "DELETE"]), false)
            .unwrap());

        // grant option is checked separately
        assert!(!catalog
            .has_privileges("app_user", &target, &strings(&["SELECT"]), true)
            .unwrap());
        assert!(catalog
            .has_privileges("app_user", &target, &strings(&["INSERT"]), true)
            .unwrap());
    }

    #[test]
    fn test_wildcard_privileges_are_never_held() {
        let target = GrantTarget::Table {
            database: "app".to_string(),
            schema: "public".to_string(),
            table: ObjectName::All,
        };

        let server = Server::new("postgres");
        server
            .borrow_mut()
            .add_privilege("app_user", &target, "SELECT", false);

        let connector = MockConnector::new(server.clone());
        let mut session = connector.connect("app").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        assert!(!catalog
            .has_privileges("app_user", &target, &strings(&["SELECT"]), false)
            .unwrap());
        assert_eq!(server.borrow().queries, 0);
    }

    #[test]
    fn test_has_default_privileges() {
        let tables = DefaultObjectClass::Tables;
        let server = Server::new("postgres");
        {
            let mut s = server.borrow_mut();
            s.add_default_privilege("owner", Some("public"), tables, "app_user", "SELECT", false);
            s.add_default_privilege("owner", Some("public"), tables, "app_user", "INSERT", true);
        }

        let connector = MockConnector::new(server);
        let mut session = connector.connect("app").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        let mut held = |schema: Option<&str>,
                        class: DefaultObjectClass,
                        privileges: &[&str],
                        with_grant: bool| {
            catalog
                .has_default_privileges(
                    "owner",
                    schema,
                    class,
                    "app_user",
                    &strings(privileges),
                    with_grant,
                )
                .unwrap()
        };

        assert!(held(Some("public"), tables, &["SELECT", "INSERT"], false));
        assert!(!held(Some("public"), tables, &["SELECT"], true));
        assert!(held(Some("public"), tables, &["INSERT"], true));
        assert!(!held(None, tables, &["SELECT"], false));
        assert!(!held(
            Some("public"),
            DefaultObjectClass::Sequences,
            &["SELECT"],
            false
        ));
    }

    #[test]
    fn test_mysql_lookups() {
        let server = Server::mysql("root");
        {
            let mut s = server.borrow_mut();
            s.add_role(
                "app",
                RoleOptions {
                    login: true,
                    ..RoleOptions::default()
                },
            );
            s.add_role("readers", RoleOptions::default());
            s.add_membership("app", "readers");
            s.add_database("app", "root");
            s.add_privilege(
                "app",
                &GrantTarget::Database {
                    database: "app".to_string(),
                },
                "SELECT",
                false,
            );
        }

        let connector = MockConnector::new(server.clone());
        let mut session = connector.connect("mysql").unwrap();
        let mut catalog = Catalog::new(&mut session, &MysqlDialect);

        assert_eq!(catalog.current_user().unwrap(), "root");
        assert!(catalog.role_exists("app").unwrap());
        assert!(catalog.role_options("app").unwrap().unwrap().login);
        assert!(!catalog.role_options("readers").unwrap().unwrap().login);
        assert_eq!(catalog.memberships("app").unwrap(), strings(&["readers"]));
        assert!(catalog.database_exists("app").unwrap());

        let database = GrantTarget::Database {
            database: "app".to_string(),
        };
        assert!(catalog
            .has_privileges("app", &database, &strings(&["SELECT"]), false)
            .unwrap());
        assert!(!catalog
            .has_privileges("app", &database, &strings(&["SELECT"]), true)
            .unwrap());

        // lookups the engine has no record for never reach the server
        let queries = server.borrow().queries;
        assert_eq!(catalog.database_owner("app").unwrap(), None);
        assert!(!catalog
            .has_default_privileges(
                "root",
                None,
                DefaultObjectClass::Tables,
                "app",
                &strings(&["SELECT"]),
                false,
            )
            .unwrap());
        assert_eq!(server.borrow().queries, queries);
    }

    #[test]
    fn test_lookup_failure_is_a_statement_error() {
        let server = Server::new("postgres");
        server.borrow_mut().fail_on("pg_roles");

        let connector = MockConnector::new(server);
        let mut session = connector.connect("postgres").unwrap();
        let mut catalog = Catalog::new(&mut session, &PostgresDialect);

        let err = catalog.role_exists("app_user").unwrap_err();
        assert!(matches!(err, Error::Statement { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to check whether role `app_user` exists"));
    }
}
