use crate::config::{Connection, SslMode};
use crate::error::{DriverError, Error, Result};
use crate::session::{Connector, Row, Session, Value};
use log::debug;
use native_tls::TlsConnector;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;

/// A Postgres connection bound to one database.
pub struct PgConnection {
    target: String,
    client: Client,
}

/// TLS for every mode but `disable`. Only `verify-full` checks the server
/// certificate, like libpq's `require`.
fn tls_connector(mode: SslMode) -> std::result::Result<MakeTlsConnector, native_tls::Error> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!mode.verify())
        .danger_accept_invalid_hostnames(!mode.verify())
        .build()?;

    Ok(MakeTlsConnector::new(connector))
}

impl PgConnection {
    /// Connect to `database` using the credentials from `connection`, then ping it.
    ///
    /// Refer to https://rust-lang-nursery.github.io/rust-cookbook/database/postgres.html
    pub fn connect(connection: &Connection, database: &str) -> Result<Self> {
        let target = connection.describe(database);
        debug!("Connecting to {}", target);

        let mut config = postgres::Config::new();
        config
            .host(&connection.host)
            .port(connection.port)
            .user(&connection.username)
            .dbname(database)
            .ssl_mode(connection.sslmode.into());
        if let Some(password) = connection.password.as_deref().filter(|p| !p.is_empty()) {
            config.password(password);
        }
        if let Some(seconds) = connection.connect_timeout {
            config.connect_timeout(Duration::from_secs(seconds));
        }

        let client = match connection.sslmode {
            SslMode::Disable => config.connect(NoTls),
            mode => {
                let tls = tls_connector(mode).map_err(|e| Error::connection(&target, e))?;
                config.connect(tls)
            }
        }
        .map_err(|e| Error::connection(&target, e))?;

        let mut conn = Self { target, client };
        if let Err(e) = conn.ping() {
            return Err(Error::connection(conn.target.clone(), e));
        }

        Ok(conn)
    }
}

impl Session for PgConnection {
    fn execute(&mut self, statement: &str) -> std::result::Result<u64, DriverError> {
        let rows = self.client.execute(statement, &[])?;
        Ok(rows)
    }

    fn query_rows(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<Row>, DriverError> {
        let params = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();

        let mut rows = vec![];
        for row in self.client.query(query, &params)? {
            let values = (0..row.len())
                .map(|idx| column_value(&row, idx))
                .collect::<std::result::Result<Row, _>>()?;
            rows.push(values);
        }

        Ok(rows)
    }

    fn ping(&mut self) -> std::result::Result<(), DriverError> {
        self.client.execute("SELECT 1", &[])?;
        Ok(())
    }

    fn close(self) -> std::result::Result<(), DriverError> {
        debug!("Disconnecting from {}", self.target);
        self.client.close()?;
        Ok(())
    }
}

fn column_value(row: &postgres::Row, idx: usize) -> std::result::Result<Value, postgres::Error> {
    let ty = row.columns()[idx].type_();

    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::Int)
    } else {
        row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Opens [`PgConnection`]s with the configured credentials.
#[derive(Debug, Clone)]
pub struct PgConnector {
    connection: Connection,
}

impl PgConnector {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

impl Connector for PgConnector {
    type Session = PgConnection;

    fn connect(&self, database: &str) -> Result<PgConnection> {
        PgConnection::connect(&self.connection, database)
    }
}
