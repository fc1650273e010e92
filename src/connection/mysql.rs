use crate::config::{Connection, SslMode};
use crate::error::{DriverError, Error, Result};
use crate::session::{Connector, Row, Session, Value};
use log::debug;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, SslOpts};
use std::time::Duration;

/// A MySQL connection bound to one database (schema).
pub struct MysqlConnection {
    target: String,
    conn: Conn,
}

fn options(connection: &Connection, database: &str, tls: bool) -> OptsBuilder {
    let mut options = OptsBuilder::new()
        .ip_or_hostname(Some(connection.host.clone()))
        .tcp_port(connection.port)
        .user(Some(connection.username.clone()))
        .pass(connection.password.clone().filter(|p| !p.is_empty()))
        .db_name(Some(database.to_string()));

    if let Some(seconds) = connection.connect_timeout {
        options = options.tcp_connect_timeout(Some(Duration::from_secs(seconds)));
    }

    if tls {
        let verify = connection.sslmode.verify();
        options = options.ssl_opts(
            SslOpts::default()
                .with_danger_accept_invalid_certs(!verify)
                .with_danger_skip_domain_validation(!verify),
        );
    }

    options
}

impl MysqlConnection {
    /// Connect to `database` using the credentials from `connection`, then ping it.
    pub fn connect(connection: &Connection, database: &str) -> Result<Self> {
        let target = connection.describe(database);
        debug!("Connecting to {}", target);

        let conn = match connection.sslmode {
            SslMode::Disable => Conn::new(options(connection, database, false)),
            SslMode::Prefer => Conn::new(options(connection, database, true)).or_else(|e| {
                debug!("TLS connection to {} failed, retrying without: {}", target, e);
                Conn::new(options(connection, database, false))
            }),
            SslMode::Require | SslMode::VerifyFull => {
                Conn::new(options(connection, database, true))
            }
        }
        .map_err(|e| Error::connection(&target, e))?;

        let mut conn = Self { target, conn };
        if let Err(e) = conn.ping() {
            return Err(Error::connection(conn.target.clone(), e));
        }

        Ok(conn)
    }
}

impl Session for MysqlConnection {
    fn execute(&mut self, statement: &str) -> std::result::Result<u64, DriverError> {
        self.conn.query_drop(statement)?;
        Ok(self.conn.affected_rows())
    }

    fn query_rows(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<Row>, DriverError> {
        let params = params
            .iter()
            .map(|p| mysql::Value::from(*p))
            .collect::<Vec<_>>();

        let rows: Vec<mysql::Row> = self.conn.exec(query, params)?;
        Ok(rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| column_value(row.as_ref(idx))).collect())
            .collect())
    }

    fn ping(&mut self) -> std::result::Result<(), DriverError> {
        self.conn.query_drop("DO 1")?;
        Ok(())
    }

    fn close(self) -> std::result::Result<(), DriverError> {
        debug!("Disconnecting from {}", self.target);
        drop(self.conn);
        Ok(())
    }
}

/// Booleans come back as integers, names as bytes
fn column_value(value: Option<&mysql::Value>) -> Value {
    match value {
        None | Some(mysql::Value::NULL) => Value::Null,
        Some(mysql::Value::Int(n)) => Value::Int(*n),
        Some(mysql::Value::UInt(n)) => Value::Int(*n as i64),
        Some(mysql::Value::Bytes(bytes)) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
        Some(other) => Value::Text(other.as_sql(true)),
    }
}

/// Opens [`MysqlConnection`]s with the configured credentials.
#[derive(Debug, Clone)]
pub struct MysqlConnector {
    connection: Connection,
}

impl MysqlConnector {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

impl Connector for MysqlConnector {
    type Session = MysqlConnection;

    fn connect(&self, database: &str) -> Result<MysqlConnection> {
        MysqlConnection::connect(&self.connection, database)
    }
}
