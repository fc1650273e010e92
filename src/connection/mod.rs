//! Driver-backed [`Session`](crate::session::Session)s, one module per engine.
//!
//! Each engine has a connection bound to one database and a connector that
//! opens them with the configured credentials and TLS mode.

mod mysql;
mod postgres;

pub use self::mysql::{MysqlConnection, MysqlConnector};
pub use self::postgres::{PgConnection, PgConnector};
