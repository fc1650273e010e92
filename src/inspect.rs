use crate::catalog::Catalog;
use crate::config::{Config, ConnectionType, Database, Role, RoleOption, RoleOptions};
use crate::connection::{MysqlConnector, PgConnector};
use crate::dialect::Dialect;
use crate::session::{Connector, Session};
use anyhow::Result;
use ascii_table::AsciiTable;
use indoc::indoc;
use log::info;

type Rows = Vec<Vec<String>>;

/// Print the live state of the declared roles and databases
pub fn inspect(config: &Config) -> Result<()> {
    let connection = config.connection.clone();
    let (roles, databases) = match connection.type_ {
        ConnectionType::Postgres => live_rows(PgConnector::new(connection), config)?,
        ConnectionType::Mysql => live_rows(MysqlConnector::new(connection), config)?,
    };

    // Get the terminal width
    let term_width = term_size::dimensions().map(|(w, _)| w).unwrap_or(120);

    // Print the table in max size
    let mut table = AsciiTable::default();
    table.set_max_width(term_width.saturating_sub(5));

    info!(
        "Current roles in {}:\n{}",
        config.connection,
        table.format(roles)
    );
    info!(
        "Current databases in {}:\n{}",
        config.connection,
        table.format(databases)
    );

    info!(indoc! { r#"
        == Legend ==

        Options:
            L = LOGIN
            S = SUPERUSER
            D = CREATEDB
            R = CREATEROLE
            I = INHERIT
            P = REPLICATION
            B = BYPASSRLS
    "#});

    Ok(())
}

fn live_rows<C: Connector>(connector: C, config: &Config) -> Result<(Rows, Rows)> {
    let dialect = config.connection.type_.dialect();
    let mut session = connector.connect(&config.connection.database)?;
    let mut catalog = Catalog::new(&mut session, dialect.as_ref());

    let roles = role_rows(&mut catalog, dialect.as_ref(), &config.roles)?;
    let databases = database_rows(&mut catalog, dialect.as_ref(), &config.databases)?;

    Ok((roles, databases))
}

/// Compact form of the options that are on, e.g. "L,I"
fn options_to_string(options: &RoleOptions) -> String {
    RoleOption::ALL
        .iter()
        .filter(|option| options.get(**option))
        .map(|option| match option {
            RoleOption::Login => "L",
            RoleOption::Superuser => "S",
            RoleOption::CreateDatabase => "D",
            RoleOption::CreateRole => "R",
            RoleOption::Inherit => "I",
            RoleOption::Replication => "P",
            RoleOption::BypassRowSecurity => "B",
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn role_rows<S: Session + ?Sized>(
    catalog: &mut Catalog<'_, S>,
    dialect: &dyn Dialect,
    roles: &[Role],
) -> Result<Rows> {
    let mut rows = vec![
        vec![
            "Role".to_string(),
            "Exists".to_string(),
            "Options (live)".to_string(),
            "Options (declared)".to_string(),
            "Member of (live)".to_string(),
            "Member of (declared)".to_string(),
        ],
        vec!["---".to_string(); 6],
    ];

    for role in roles {
        let name = dialect.normalize_identifier(&role.name);
        let declared_groups = role
            .roles
            .iter()
            .map(|g| dialect.normalize_identifier(g))
            .collect::<Vec<_>>()
            .join(", ");

        let (exists, live_options, live_groups) = match catalog.role_options(&name)? {
            Some(options) => (
                "yes",
                options_to_string(&options),
                catalog.memberships(&name)?.join(", "),
            ),
            None => ("no", "-".to_string(), "-".to_string()),
        };

        rows.push(vec![
            name,
            exists.to_string(),
            live_options,
            options_to_string(&role.effective_options()),
            live_groups,
            declared_groups,
        ]);
    }

    Ok(rows)
}

fn database_rows<S: Session + ?Sized>(
    catalog: &mut Catalog<'_, S>,
    dialect: &dyn Dialect,
    databases: &[Database],
) -> Result<Rows> {
    let mut rows = vec![
        vec![
            "Database".to_string(),
            "Exists".to_string(),
            "Owner (live)".to_string(),
            "Owner (declared)".to_string(),
        ],
        vec!["---".to_string(); 4],
    ];

    for database in databases {
        let name = dialect.normalize_identifier(&database.name);
        let declared_owner = database
            .owner()
            .map(|o| dialect.normalize_identifier(o))
            .unwrap_or_else(|| "-".to_string());

        // engines without owners still report the database
        let (exists, live_owner) = if catalog.database_exists(&name)? {
            let owner = catalog.database_owner(&name)?;
            ("yes", owner.unwrap_or_else(|| "-".to_string()))
        } else {
            ("no", "-".to_string())
        };

        rows.push(vec![
            name,
            exists.to_string(),
            live_owner,
            declared_owner,
        ]);
    }

    Ok(rows)
}
