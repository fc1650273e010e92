//! Temporary group membership for the operator.
//!
//! Some statements only succeed when the operator is a member of a role:
//! transferring database ownership to it on managed platforms, or altering
//! default privileges for objects it creates. An [`Elevation`] grants that
//! membership for as long as it lives and revokes it when dropped.

use crate::catalog::Catalog;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::session::Session;
use ansi_term::Colour::{Purple, Yellow};
use log::{debug, info, warn};
use std::ops::{Deref, DerefMut};

/// Membership of the operator in `role`, revoked on drop if it was granted here.
pub struct Elevation<'a, S: Session + ?Sized> {
    session: &'a mut S,
    dialect: &'a dyn Dialect,
    operator: String,
    role: String,
    granted: bool,
}

impl<'a, S: Session + ?Sized> Elevation<'a, S> {
    /// Make `operator` a member of `role`.
    ///
    /// Nothing is granted when the operator is the role itself, already a
    /// member, or when running in dry-run mode.
    pub fn acquire(
        session: &'a mut S,
        dialect: &'a dyn Dialect,
        operator: &str,
        role: &str,
        dryrun: bool,
    ) -> Result<Self> {
        let mut elevation = Self {
            session,
            dialect,
            operator: operator.to_string(),
            role: role.to_string(),
            granted: false,
        };

        if operator == role {
            return Ok(elevation);
        }

        if Catalog::new(&mut *elevation.session, dialect).has_membership(operator, role)? {
            debug!("{} is already a member of {}", operator, role);
            return Ok(elevation);
        }

        let sql = dialect.grant_role(role, operator);
        if dryrun {
            info!("{}: {}", Purple.paint("Dry-run"), sql);
            return Ok(elevation);
        }

        elevation
            .session
            .execute(&sql)
            .map_err(|e| Error::statement(format!("grant `{}` to `{}`", role, operator), e))?;
        debug!("{}: {}", Yellow.paint("Elevated"), sql);
        elevation.granted = true;

        Ok(elevation)
    }

    /// Whether the membership was granted by this elevation
    pub fn granted(&self) -> bool {
        self.granted
    }
}

impl<S: Session + ?Sized> Deref for Elevation<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.session
    }
}

impl<S: Session + ?Sized> DerefMut for Elevation<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.session
    }
}

impl<S: Session + ?Sized> Drop for Elevation<'_, S> {
    fn drop(&mut self) {
        if !self.granted {
            return;
        }

        let sql = self.dialect.revoke_role(&self.role, &self.operator);
        match self.session.execute(&sql) {
            Ok(_) => debug!("{}: {}", Yellow.paint("Restored"), sql),
            // The operation result wins over a failed clean-up.
            Err(e) => warn!(
                "failed to revoke temporary membership of {} in {}: {}",
                self.operator, self.role, e
            ),
        }
    }
}

/// Run `f` while `operator` is a member of `role`.
pub fn with_elevation<S, T, F>(
    session: &mut S,
    dialect: &dyn Dialect,
    operator: &str,
    role: &str,
    dryrun: bool,
    f: F,
) -> Result<T>
where
    S: Session + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    let mut elevation = Elevation::acquire(session, dialect, operator, role, dryrun)?;
    f(&mut *elevation)
}
