use anyhow::Result;
use dbmanager::cli::{self, Command};
use dbmanager::config::Config;
use dbmanager::{apply, gen, inspect, validate};
use env_logger::Env;
use std::path::PathBuf;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = cli::parse();

    match args.cmd {
        Command::Gen { target } => {
            gen::gen(&target)?;
        }
        Command::GenPass {
            length,
            username,
            password,
        } => gen::gen_password(length, username, password),
        Command::Apply { file, dryrun, all } => {
            if all {
                apply::apply_all(&file, dryrun)?;
            } else {
                apply::apply(&file, dryrun)?;
            }
        }
        Command::Validate { file } => {
            // Validate the current directory by default
            let target = file.unwrap_or_else(|| PathBuf::from("."));
            validate::validate_target(&target)?;
        }
        Command::Inspect { file } => {
            let config = Config::new(&file)?;
            inspect::inspect(&config)?;
        }
    }

    Ok(())
}
