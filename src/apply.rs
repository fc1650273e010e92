use crate::config::{Config, ConnectionType};
use crate::connection::{MysqlConnector, PgConnector};
use crate::reconcile::{Change, Manager, Settings};
use crate::session::Connector;
use ansi_term::Colour::{Green, Purple};
use anyhow::{anyhow, Context, Result};
use ascii_table::AsciiTable;
use log::info;
use std::path::{Path, PathBuf};

/// Read the config from the given path and apply it to the server.
/// If the dryrun flag is set, the changes will not be applied.
pub fn apply(target: &Path, dryrun: bool) -> Result<()> {
    if target.is_dir() {
        return Err(anyhow!(
            "{} is a directory, use --all to apply every config file in it",
            target.display()
        ));
    }

    let config = Config::new(target)?;
    info!("Applying configuration:\n{}", config);

    let connection = config.connection.clone();
    let changes = match connection.type_ {
        ConnectionType::Postgres => reconcile(PgConnector::new(connection), &config, dryrun),
        ConnectionType::Mysql => reconcile(MysqlConnector::new(connection), &config, dryrun),
    }
    .with_context(|| format!("failed to apply {}", target.display()))?;

    print_summary(&changes, dryrun);

    Ok(())
}

fn reconcile<C: Connector>(connector: C, config: &Config, dryrun: bool) -> Result<Vec<Change>> {
    let manager = Manager::new(
        connector,
        config.connection.type_.dialect(),
        Settings::new(&config.connection, dryrun),
    );

    let mut reconciler = manager.connect()?;
    info!("Connected to database: {}", config.connection);

    reconciler.manage(&config.databases, &config.roles)?;
    Ok(reconciler.disconnect()?)
}

/// Apply all config files from the given directory.
pub fn apply_all(target: &Path, dryrun: bool) -> Result<()> {
    for config_file in config_files(target)? {
        info!("Applying configuration from {}", config_file.display());
        apply(&config_file, dryrun)?;
    }

    Ok(())
}

/// Config files (.yaml or .yml) directly in `target`, sorted by name
fn config_files(target: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in std::fs::read_dir(target)
        .with_context(|| format!("failed to read directory {}", target.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn summary_rows(changes: &[Change], dryrun: bool) -> Vec<Vec<String>> {
    let status = if dryrun { "dry-run" } else { "applied" };

    let mut rows = vec![
        vec![
            "Entity".to_string(),
            "Action".to_string(),
            "Statement".to_string(),
            "Status".to_string(),
        ],
        vec![
            "---".to_string(),
            "---".to_string(),
            "---".to_string(),
            "---".to_string(),
        ],
    ];

    for change in changes {
        rows.push(vec![
            change.entity.clone(),
            change.action.to_string(),
            change.statement.clone(),
            status.to_string(),
        ]);
    }

    rows
}

/// Print summary table
fn print_summary(changes: &[Change], dryrun: bool) {
    if changes.is_empty() {
        info!("{}: nothing to change", Green.paint("Summary"));
        return;
    }

    let term_width = term_size::dimensions().map(|(w, _)| w).unwrap_or(120);
    let mut table = AsciiTable::default();
    table.set_max_width(term_width.saturating_sub(5));

    let title = if dryrun {
        Purple.paint("Summary (dry-run)")
    } else {
        Green.paint("Summary")
    };
    info!("{}:\n{}", title, table.format(summary_rows(changes, dryrun)));
}
