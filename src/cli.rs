use std::path::PathBuf;
use structopt::StructOpt;

/// Manage database roles, databases and privileges in GitOps style
#[derive(Debug, StructOpt)]
pub struct Cli {
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Generate a template configuration
    Gen {
        /// The target folder
        #[structopt(short, long, default_value = ".", parse(from_os_str))]
        target: PathBuf,
    },

    /// Generate random password
    GenPass {
        /// The password length
        #[structopt(short, long, default_value = "16")]
        length: u8,
        /// The username, using to create md5 hash
        #[structopt(short, long)]
        username: Option<String>,
        /// The password, using to create md5 hash
        #[structopt(short, long)]
        password: Option<String>,
    },

    /// Apply changes
    Apply {
        /// The path to the file to read, or a directory with --all
        #[structopt(short, long, parse(from_os_str))]
        file: PathBuf,

        /// Dry run: print the statements without executing them
        #[structopt(short, long)]
        dryrun: bool,

        /// Apply all config files (*.yaml, *.yml) in the directory
        #[structopt(short, long)]
        all: bool,
    },

    /// Validate target file
    Validate {
        /// The path to the file or directory to read (optional)
        #[structopt(short, long, parse(from_os_str))]
        file: Option<PathBuf>,
    },

    /// Inspect the current state of the declared roles and databases
    Inspect {
        /// The path to the file to read
        #[structopt(short, long, parse(from_os_str))]
        file: PathBuf,
    },
}

// Parse the command line arguments
pub fn parse() -> Cli {
    Cli::from_args()
}
