use crate::apply::is_yaml;
use crate::config::Config;
use ansi_term::Colour::{Green, Red};
use anyhow::{anyhow, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Validate the target file, or every YAML file under the target directory
pub fn validate_target(target: &Path) -> Result<()> {
    if !target.exists() {
        return Err(anyhow!(
            "{} ... {} - file/directory does not exist",
            target.display(),
            Red.paint("Failed")
        ));
    }

    // Scan all files recursive from the target directory
    // that match *.yaml or *.yml and validate them
    if target.is_dir() {
        let mut files = vec![];
        for entry in WalkDir::new(target).sort_by_file_name() {
            let entry = entry?;
            if entry.path().is_file() && is_yaml(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        for file in files {
            // Validate but not fail
            if let Err(e) = validate_file(&file) {
                println!("{}", e);
            }
        }

        return Ok(());
    }

    // Validate single file
    validate_file(target)
}

/// Validate target yaml file
pub fn validate_file(file: &Path) -> Result<()> {
    // Config::new validates before expanding env variables
    Config::new(file)
        .map_err(|e| anyhow!("{} ... {} - {:#}", file.display(), Red.paint("invalid"), e))?;

    // "ok" in green color
    println!("{} ... {}", file.display(), Green.paint("ok"));

    Ok(())
}
