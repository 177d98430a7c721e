//! Users, privileges, and the wildcard match algorithm.
//!
//! Passwords are stored as bcrypt digests. A privilege is a
//! `(database, table, actions)` tuple where database and table may be the
//! `*` wildcard; [`User::has_privilege`] implements the match table:
//!
//! | stored      | matches request (db, tbl) when |
//! |-------------|--------------------------------|
//! | `(d, t)`    | `d = db` and `t = tbl`         |
//! | `(*, *)`    | always                         |
//! | `(d, *)`    | `d = db`                       |
//! | `(*, t)`    | `t = tbl`                      |

use std::fmt;

use serde::{Deserialize, Serialize};

use opal_common::error::{OpalError, OpalResult};

/// The privilege wildcard for database and table fields.
pub const WILDCARD: &str = "*";

/// The closed set of grantable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeAction {
    /// Read rows.
    Select,
    /// Insert rows.
    Insert,
    /// Update rows.
    Update,
    /// Delete rows.
    Delete,
    /// Create entities.
    Create,
    /// Drop entities.
    Drop,
    /// Alter entities.
    Alter,
    /// Grant privileges to others.
    Grant,
    /// Revoke privileges from others.
    Revoke,
    /// Every action.
    All,
}

impl fmt::Display for PrivilegeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrivilegeAction::Select => "SELECT",
            PrivilegeAction::Insert => "INSERT",
            PrivilegeAction::Update => "UPDATE",
            PrivilegeAction::Delete => "DELETE",
            PrivilegeAction::Create => "CREATE",
            PrivilegeAction::Drop => "DROP",
            PrivilegeAction::Alter => "ALTER",
            PrivilegeAction::Grant => "GRANT",
            PrivilegeAction::Revoke => "REVOKE",
            PrivilegeAction::All => "ALL",
        };
        f.write_str(s)
    }
}

/// A grant of actions on a database/table pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privilege {
    /// Database name or `*`.
    pub database: String,
    /// Table name or `*`.
    pub table: String,
    /// Granted actions.
    pub actions: Vec<PrivilegeAction>,
}

impl Privilege {
    /// Creates a privilege.
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        actions: Vec<PrivilegeAction>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            actions,
        }
    }

    /// The all-privileges grant on every database and table.
    pub fn all_on_everything() -> Self {
        Self::new(WILDCARD, WILDCARD, vec![PrivilegeAction::All])
    }

    /// Whether this stored privilege applies to a request on `(db, tbl)`.
    fn matches(&self, db: &str, tbl: &str) -> bool {
        (self.database == db && self.table == tbl)
            || (self.database == WILDCARD && self.table == WILDCARD)
            || (self.database == db && self.table == WILDCARD)
            || (self.database == WILDCARD && self.table == tbl)
    }

    /// Whether this privilege carries `action` (directly or via ALL).
    fn allows(&self, action: PrivilegeAction) -> bool {
        self.actions
            .iter()
            .any(|a| *a == action || *a == PrivilegeAction::All)
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    username: String,
    password_hash: String,
    privileges: Vec<Privilege>,
}

impl User {
    /// Creates a user with a freshly hashed password and no privileges.
    pub(crate) fn new(username: impl Into<String>, password: &str) -> OpalResult<Self> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| OpalError::internal(format!("password hashing failed: {e}")))?;

        Ok(Self {
            username: username.into(),
            password_hash,
            privileges: Vec::new(),
        })
    }

    /// Username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The user's privilege grants.
    pub fn privileges(&self) -> &[Privilege] {
        &self.privileges
    }

    /// Verifies a password against the stored digest.
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub(crate) fn set_password(&mut self, password: &str) -> OpalResult<()> {
        self.password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| OpalError::internal(format!("password hashing failed: {e}")))?;
        Ok(())
    }

    pub(crate) fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Appends a grant. The caller (the catalog) rejects duplicates and
    /// persists the users file.
    pub(crate) fn grant(&mut self, privilege: Privilege) {
        self.privileges.push(privilege);
    }

    /// Removes the grant whose `(database, table)` equals the request's.
    /// An action list of the same length removes the whole grant; otherwise
    /// only the named actions are removed. Returns false when no grant
    /// matched.
    pub(crate) fn revoke(&mut self, privilege: &Privilege) -> bool {
        let Some(pos) = self
            .privileges
            .iter()
            .position(|p| p.database == privilege.database && p.table == privilege.table)
        else {
            return false;
        };

        if self.privileges[pos].actions.len() == privilege.actions.len() {
            self.privileges.remove(pos);
        } else {
            self.privileges[pos]
                .actions
                .retain(|a| !privilege.actions.contains(a));
        }

        true
    }

    /// True iff every requested action is carried by at least one stored
    /// privilege matching `(db, tbl)` under the wildcard match table.
    pub fn has_privilege(&self, db: &str, tbl: &str, actions: &[PrivilegeAction]) -> bool {
        actions.iter().all(|&action| {
            self.privileges
                .iter()
                .any(|p| p.matches(db, tbl) && p.allows(action))
        })
    }

    /// Formats each grant as `db.tbl: ACTION, ACTION`.
    pub fn privilege_strings(&self) -> Vec<String> {
        self.privileges
            .iter()
            .map(|p| {
                let actions: Vec<String> = p.actions.iter().map(ToString::to_string).collect();
                format!("{}.{}: {}", p.database, p.table, actions.join(", "))
            })
            .collect()
    }
}
