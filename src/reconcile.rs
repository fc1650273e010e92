//! Reconcile declared roles, databases and grants with the live server.
//!
//! Every step reads the live catalog first and only issues the statements
//! needed to match the declaration, so running the same declaration twice
//! is a no-op. Two statements are issued on every run: setting a declared
//! password (credentials cannot be compared) and wildcard grants (their
//! privileges cannot be checked against one object).
//!
//! ```no_run
//! use dbmanager::config::Config;
//! use dbmanager::connection::PgConnector;
//! use dbmanager::reconcile::{Manager, Settings};
//! use std::path::Path;
//!
//! let config = Config::new(Path::new("config.yaml")).unwrap();
//! let manager = Manager::new(
//!     PgConnector::new(config.connection.clone()),
//!     config.connection.type_.dialect(),
//!     Settings::new(&config.connection, false),
//! );
//!
//! let mut reconciler = manager.connect().unwrap();
//! reconciler.manage(&config.databases, &config.roles).unwrap();
//! let changes = reconciler.disconnect().unwrap();
//! ```

use crate::catalog::Catalog;
use crate::config::{Connection, Database, DefaultPrivilege, Grant, Role, PASSWORD_MASK};
use crate::dialect::Dialect;
use crate::elevation::with_elevation;
use crate::error::{Error, Result};
use crate::session::{Connector, Session};
use ansi_term::Colour::{Green, Purple};
use log::{debug, info, warn};
use std::fmt;

/// Run-wide behaviour of the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Database of the administrative connection, also used for grants
    /// that do not target a database
    pub admin_database: String,
    /// Log and journal statements without executing them
    pub dryrun: bool,
    /// Temporarily join the owner role when creating a database for it or
    /// transferring ownership to it
    pub elevate_owner: bool,
}

impl Settings {
    pub fn new(connection: &Connection, dryrun: bool) -> Self {
        Self {
            admin_database: connection.database.clone(),
            dryrun,
            elevate_owner: connection.elevate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateRole,
    AlterRole,
    SetPassword,
    CreateDatabase,
    AlterOwner,
    DefaultPrivileges,
    Grant,
    AddMembership,
    RemoveMembership,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let action = match self {
            Action::CreateRole => "create role",
            Action::AlterRole => "alter role",
            Action::SetPassword => "set password of",
            Action::CreateDatabase => "create database",
            Action::AlterOwner => "change owner of",
            Action::DefaultPrivileges => "alter default privileges in",
            Action::Grant => "grant privileges to",
            Action::AddMembership => "add membership of",
            Action::RemoveMembership => "remove membership of",
        };

        write!(f, "{}", action)
    }
}

/// One statement applied (or planned in dry-run) by the reconciler.
/// `statement` never contains a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub entity: String,
    pub action: Action,
    pub statement: String,
}

impl Change {
    pub fn new(entity: &str, action: Action, statement: String) -> Self {
        Self {
            entity: entity.to_string(),
            action,
            statement,
        }
    }

    /// Description used in error messages, e.g. "create role `app`"
    pub fn purpose(&self) -> String {
        format!("{} `{}`", self.action, self.entity)
    }
}

/// Executes statements and keeps the list of changes made.
#[derive(Debug, Default)]
pub struct Journal {
    dryrun: bool,
    changes: Vec<Change>,
}

impl Journal {
    pub fn new(dryrun: bool) -> Self {
        Self {
            dryrun,
            changes: vec![],
        }
    }

    /// Execute `sql` on `session` and record `change`. In dry-run mode the
    /// change is only logged and recorded.
    pub fn apply<S: Session + ?Sized>(
        &mut self,
        session: &mut S,
        change: Change,
        sql: &str,
    ) -> Result<()> {
        if self.dryrun {
            info!("{}: {}", Purple.paint("Dry-run"), change.statement);
        } else {
            session
                .execute(sql)
                .map_err(|e| Error::statement(change.purpose(), e))?;
            info!("{}: {}", Green.paint("Success"), change.statement);
        }

        self.changes.push(change);
        Ok(())
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    fn planned(&self, action: Action, entity: &str) -> bool {
        self.changes
            .iter()
            .any(|c| c.action == action && c.entity == entity)
    }
}

/// Entry point of the engine: holds what is needed to open connections.
pub struct Manager<C: Connector> {
    connector: C,
    dialect: Box<dyn Dialect>,
    settings: Settings,
}

impl<C: Connector> Manager<C> {
    pub fn new(connector: C, dialect: Box<dyn Dialect>, settings: Settings) -> Self {
        Self {
            connector,
            dialect,
            settings,
        }
    }

    /// Open the administrative connection.
    pub fn connect(&self) -> Result<Reconciler<'_, C>> {
        let mut session = self.connector.connect(&self.settings.admin_database)?;
        let operator = Catalog::new(&mut session, self.dialect.as_ref()).current_user()?;
        debug!("Connected as {}", operator);

        Ok(Reconciler {
            connector: &self.connector,
            dialect: self.dialect.as_ref(),
            settings: &self.settings,
            session,
            operator,
            journal: Journal::new(self.settings.dryrun),
        })
    }
}

/// A reconciliation run over one administrative connection.
pub struct Reconciler<'a, C: Connector> {
    connector: &'a C,
    dialect: &'a dyn Dialect,
    settings: &'a Settings,
    session: C::Session,
    operator: String,
    journal: Journal,
}

fn release<S: Session>(session: S, database: &str) {
    if let Err(e) = session.close() {
        warn!("failed to close the connection to {}: {}", database, e);
    }
}

impl<'a, C: Connector> Reconciler<'a, C> {
    fn catalog(&mut self) -> Catalog<'_, C::Session> {
        Catalog::new(&mut self.session, self.dialect)
    }

    fn fold(&self, name: &str) -> String {
        self.dialect.normalize_identifier(name)
    }

    pub fn changes(&self) -> &[Change] {
        self.journal.changes()
    }

    /// A role that does not exist yet but is created earlier in this dry-run
    fn role_planned(&self, name: &str) -> bool {
        self.settings.dryrun && self.journal.planned(Action::CreateRole, name)
    }

    fn role_available(&mut self, name: &str) -> Result<bool> {
        Ok(self.catalog().role_exists(name)? || self.role_planned(name))
    }

    /// Create the role, or align its options with the declaration, then set
    /// its password when one is declared.
    pub fn create_user(&mut self, role: &Role) -> Result<()> {
        let dialect = self.dialect;
        let name = self.fold(&role.name);
        let options = role.effective_options();

        if !self.catalog().role_exists(&name)? {
            let sql = dialect.create_role(&name, &options, role.password());
            let masked =
                dialect.create_role(&name, &options, role.password().map(|_| PASSWORD_MASK));
            self.journal.apply(
                &mut self.session,
                Change::new(&name, Action::CreateRole, masked),
                &sql,
            )?;
        } else {
            let live = self
                .catalog()
                .role_options(&name)?
                .ok_or_else(|| Error::role_not_found(&name))?;

            let changes = options.diff(&live);
            if changes.is_empty() {
                info!("Role {} is up to date", name);
            } else {
                let sql = dialect.alter_role(&name, &changes);
                self.journal.apply(
                    &mut self.session,
                    Change::new(&name, Action::AlterRole, sql.clone()),
                    &sql,
                )?;
            }
        }

        // The catalog cannot tell whether the password changed.
        if let Some(password) = role.password() {
            let sql = dialect.set_password(&name, password);
            let masked = dialect.set_password(&name, PASSWORD_MASK);
            self.journal.apply(
                &mut self.session,
                Change::new(&name, Action::SetPassword, masked),
                &sql,
            )?;
        }

        Ok(())
    }

    /// Create the database or align its owner, then apply its default privileges.
    pub fn create_database(&mut self, database: &Database) -> Result<()> {
        let dialect = self.dialect;
        let name = self.fold(&database.name);
        let owner = database.owner().map(|o| self.fold(o));

        let exists = self.catalog().database_exists(&name)?;
        if exists {
            self.update_owner(&name, owner.as_deref())?;
        } else {
            if let Some(owner) = &owner {
                if !self.role_available(owner)? {
                    return Err(Error::role_not_found(owner));
                }
            }

            let sql = dialect.create_database(&name, owner.as_deref())?;
            let change = Change::new(&name, Action::CreateDatabase, sql.clone());
            self.run_as_owner(owner.as_deref(), change, &sql)?;
        }

        self.apply_default_privileges(&name, exists, &database.default_privileges)
    }

    fn update_owner(&mut self, database: &str, owner: Option<&str>) -> Result<()> {
        let owner = match owner {
            Some(owner) => owner,
            None => return Ok(()),
        };

        let live = self.catalog().database_owner(database)?;
        if live.as_deref() == Some(owner) {
            info!("Database {} is already owned by {}", database, owner);
            return Ok(());
        }

        if !self.role_available(owner)? {
            return Err(Error::role_not_found(owner));
        }

        let sql = self.dialect.alter_database_owner(database, owner)?;
        let change = Change::new(database, Action::AlterOwner, sql.clone());
        self.run_as_owner(Some(owner), change, &sql)
    }

    /// Apply a database statement, as a member of `owner` when configured to.
    fn run_as_owner(&mut self, owner: Option<&str>, change: Change, sql: &str) -> Result<()> {
        match owner {
            Some(owner) if self.settings.elevate_owner => {
                let journal = &mut self.journal;
                with_elevation(
                    &mut self.session,
                    self.dialect,
                    &self.operator,
                    owner,
                    self.settings.dryrun,
                    |session| journal.apply(session, change, sql),
                )
            }
            _ => self.journal.apply(&mut self.session, change, sql),
        }
    }

    fn apply_default_privileges(
        &mut self,
        database: &str,
        exists: bool,
        rules: &[DefaultPrivilege],
    ) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }

        if !exists && self.settings.dryrun {
            info!(
                "{}: skipping default privileges of {}, the database does not exist yet",
                Purple.paint("Dry-run"),
                database
            );
            return Ok(());
        }

        let dialect = self.dialect;
        let mut scoped = self.connector.connect(database)?;

        for rule in rules {
            let rule = rule.normalize(dialect);
            let acting = rule.role.clone().unwrap_or_else(|| self.operator.clone());

            for role in [&acting, &rule.to] {
                let exists = Catalog::new(&mut scoped, dialect).role_exists(role)?;
                if !exists && !self.role_planned(role) {
                    return Err(Error::role_not_found(role.as_str()));
                }
            }

            let privileges = dialect.expand_privileges(rule.on.privilege_class(), &rule.privileges);
            let held = Catalog::new(&mut scoped, dialect).has_default_privileges(
                &acting,
                rule.schema.as_deref(),
                rule.on,
                &rule.to,
                &privileges,
                rule.with_grant,
            )?;
            if held {
                info!(
                    "Default privileges on {} for {} in {} are up to date",
                    rule.on, rule.to, database
                );
                continue;
            }

            let sql = dialect.alter_default_privileges(&rule)?;
            let change = Change::new(database, Action::DefaultPrivileges, sql.clone());
            match &rule.role {
                Some(role) => {
                    let journal = &mut self.journal;
                    with_elevation(
                        &mut scoped,
                        dialect,
                        &self.operator,
                        role,
                        self.settings.dryrun,
                        |session| journal.apply(session, change, &sql),
                    )?;
                }
                None => self.journal.apply(&mut scoped, change, &sql)?,
            }
        }

        release(scoped, database);
        Ok(())
    }

    /// Apply the role's grants, then make its group memberships match the
    /// declared list exactly.
    pub fn grant_permissions(&mut self, role: &Role) -> Result<()> {
        let name = self.fold(&role.name);

        let planned = self.role_planned(&name);
        if !planned && !self.catalog().role_exists(&name)? {
            warn!("Role {} does not exist, skipping its grants and memberships", name);
            return Ok(());
        }

        let live_groups = if planned {
            vec![]
        } else {
            self.catalog().memberships(&name)?
        };

        for grant in &role.grants {
            self.grant(&name, grant, planned)?;
        }

        let declared = role.roles.iter().map(|g| self.fold(g)).collect::<Vec<_>>();
        for group in &declared {
            self.add_role(&name, group)?;
        }

        for group in live_groups.iter().filter(|g| !declared.contains(g)) {
            self.remove_role(&name, group)?;
        }

        Ok(())
    }

    fn grant(&mut self, role: &str, grant: &Grant, planned: bool) -> Result<()> {
        let dialect = self.dialect;
        let target = grant.target()?.normalize(dialect);
        dialect.validate_privileges(target.class(), &grant.privileges)?;

        let sql = dialect.grant(&target, &grant.privileges, role, grant.with_grant)?;
        let change = Change::new(role, Action::Grant, sql.clone());
        let database = target
            .database()
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.admin_database.clone());

        // Nothing to connect to or check yet.
        if self.settings.dryrun && (planned || !self.catalog().database_exists(&database)?) {
            return self.journal.apply(&mut self.session, change, &sql);
        }

        let privileges = dialect.expand_privileges(target.class(), &grant.privileges);
        let mut scoped = self.connector.connect(&database)?;

        let held = Catalog::new(&mut scoped, dialect).has_privileges(
            role,
            &target,
            &privileges,
            grant.with_grant,
        )?;
        if held {
            info!("{} already has {} on {}", role, privileges.join(", "), target);
        } else {
            self.journal.apply(&mut scoped, change, &sql)?;
        }

        release(scoped, &database);
        Ok(())
    }

    /// Make `member` a direct member of `group`.
    pub fn add_role(&mut self, member: &str, group: &str) -> Result<()> {
        let member = self.fold(member);
        let group = self.fold(group);

        if member == group {
            info!("Skipping membership of {} in itself", member);
            return Ok(());
        }

        if self.catalog().has_membership(&member, &group)? {
            info!("{} is already a member of {}", member, group);
            return Ok(());
        }

        let sql = self.dialect.grant_role(&group, &member);
        self.journal.apply(
            &mut self.session,
            Change::new(&member, Action::AddMembership, sql.clone()),
            &sql,
        )
    }

    /// Remove the direct membership of `member` in `group`.
    pub fn remove_role(&mut self, member: &str, group: &str) -> Result<()> {
        let member = self.fold(member);
        let group = self.fold(group);

        if member == group {
            info!("Skipping membership of {} in itself", member);
            return Ok(());
        }

        if !self.catalog().has_membership(&member, &group)? {
            debug!("{} is not a member of {}", member, group);
            return Ok(());
        }

        let sql = self.dialect.revoke_role(&group, &member);
        self.journal.apply(
            &mut self.session,
            Change::new(&member, Action::RemoveMembership, sql.clone()),
            &sql,
        )
    }

    /// Reconcile everything: roles first, then databases (owners and default
    /// privileges need the roles), then grants and memberships. Stops at the
    /// first error; changes already applied stay in place.
    pub fn manage(&mut self, databases: &[Database], roles: &[Role]) -> Result<()> {
        for role in roles {
            self.create_user(role)?;
        }

        for database in databases {
            self.create_database(database)?;
        }

        for role in roles {
            self.grant_permissions(role)?;
        }

        Ok(())
    }

    /// Close the administrative connection and return the changes made.
    pub fn disconnect(self) -> Result<Vec<Change>> {
        let database = &self.settings.admin_database;
        self.session
            .close()
            .map_err(|e| Error::connection(database.as_str(), e))?;
        debug!("Disconnected from {}", database);

        Ok(self.journal.changes)
    }
}
