//! Connection scope consumed by the reconciliation engine.
//!
//! The engine never talks to a driver directly: it issues statements and
//! catalog lookups through a [`Session`], and asks a [`Connector`] for a new
//! session whenever an operation must run inside a specific database.

use crate::error::{DriverError, Result};

/// A single column value returned by a catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    /// Booleans, and integers the way MySQL returns them
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type Row = Vec<Value>;

/// An open connection bound to one database.
pub trait Session {
    /// Execute a statement, returning the number of rows affected.
    fn execute(&mut self, statement: &str) -> std::result::Result<u64, DriverError>;

    /// Return the first column of the first row, or `None` when no row matched.
    fn query_scalar(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> std::result::Result<Option<Value>, DriverError> {
        let rows = self.query_rows(query, params)?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    fn query_rows(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<Row>, DriverError>;

    fn ping(&mut self) -> std::result::Result<(), DriverError>;

    /// Close the connection. Dropping a session also releases it.
    fn close(self) -> std::result::Result<(), DriverError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Opens short-lived sessions scoped to a target database.
pub trait Connector {
    type Session: Session;

    /// Open and ping a session connected to `database`.
    fn connect(&self, database: &str) -> Result<Self::Session>;
}
