pub mod config_base;
pub mod connection;
pub mod database;
pub mod grant;
pub mod role;

pub use config_base::Config;
pub use connection::{Connection, ConnectionType, SslMode};
pub use database::{Database, DefaultPrivilege};
pub use grant::Grant;
pub use role::{Role, RoleOption, RoleOptions};

/// Replacement shown wherever a password would be printed
pub const PASSWORD_MASK: &str = "********";
