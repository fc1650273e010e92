//! Declarative management of database roles, databases, ownership and
//! privileges.
//!
//! The desired state is described in a YAML [`config::Config`]. The
//! [`reconcile::Reconciler`] compares it with the live catalog of the server
//! and issues only the statements needed to converge, so the same
//! configuration can be applied again and again.

pub mod apply;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod elevation;
pub mod error;
pub mod gen;
pub mod inspect;
pub mod reconcile;
pub mod session;
pub mod validate;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
pub use reconcile::{Change, Manager, Reconciler, Settings};
