//! The catalog root.
//!
//! A catalog is keyed by a directory. Opening it reconstructs every
//! database, table, and index from disk, opens the users file, and seeds the
//! default `admin` account the first time the users file comes up empty.
//! Closing it flushes and releases every handle, best-effort.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use opal_common::error::{Entity, OpalError, OpalResult};
use opal_common::{DATABASES_DIR, USERS_FILE};

use crate::database::Database;
use crate::users::{Privilege, User};

/// Root of all persisted metadata for the engine instance.
pub struct Catalog {
    directory: PathBuf,
    databases: HashMap<String, Database>,
    users: Mutex<HashMap<String, User>>,
    users_file: Mutex<File>,
}

impl Catalog {
    /// Opens the catalog rooted at `directory`, creating the layout on
    /// first use. Idempotent.
    pub fn open(directory: impl AsRef<Path>) -> OpalResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        let databases_dir = directory.join(DATABASES_DIR);

        let mut databases = HashMap::new();
        if databases_dir.exists() {
            for entry in fs::read_dir(&databases_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                databases.insert(name.clone(), Database::open(&databases_dir, &name)?);
            }
        } else {
            fs::create_dir_all(&databases_dir)?;
        }

        let mut users_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(directory.join(USERS_FILE))?;

        let mut bytes = Vec::new();
        users_file.read_to_end(&mut bytes)?;
        let seed_admin = bytes.is_empty();
        let users = if seed_admin {
            HashMap::new()
        } else {
            bincode::deserialize(&bytes)
                .map_err(|e| OpalError::corruption("users file", e.to_string()))?
        };

        let catalog = Self {
            directory,
            databases,
            users: Mutex::new(users),
            users_file: Mutex::new(users_file),
        };

        if seed_admin {
            catalog.create_user("admin", "admin")?;
            catalog.grant_privilege("admin", Privilege::all_on_everything())?;
        }

        tracing::info!(
            directory = %catalog.directory.display(),
            databases = catalog.databases.len(),
            "opened catalog"
        );
        Ok(catalog)
    }

    /// The catalog root directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Flushes and releases every open handle. Errors are logged and
    /// swallowed; closing while operations are in flight is undefined.
    pub fn close(&self) {
        for database in self.databases.values() {
            database.close();
        }
        if let Err(e) = self.users_file.lock().sync_all() {
            tracing::warn!("failed to sync users file: {e}");
        }
        tracing::info!(directory = %self.directory.display(), "closed catalog");
    }

    // =========================================================================
    // Databases
    // =========================================================================

    /// Creates a database and its on-disk layout.
    pub fn create_database(&mut self, name: &str) -> OpalResult<()> {
        if self.databases.contains_key(name) {
            return Err(OpalError::already_exists(Entity::Database, name));
        }

        let databases_dir = self.directory.join(DATABASES_DIR);
        match Database::create(&databases_dir, name) {
            Ok(database) => {
                tracing::info!(database = name, "created database");
                self.databases.insert(name.to_string(), database);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(databases_dir.join(name));
                Err(e)
            }
        }
    }

    /// Drops a database and removes its directory tree.
    pub fn drop_database(&mut self, name: &str) -> OpalResult<()> {
        if self.databases.remove(name).is_none() {
            return Err(OpalError::not_found(Entity::Database, name));
        }

        fs::remove_dir_all(self.directory.join(DATABASES_DIR).join(name))?;
        tracing::info!(database = name, "dropped database");
        Ok(())
    }

    /// Looks up a database by name.
    pub fn get_database(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    /// Looks up a database for table DDL.
    pub fn get_database_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.get_mut(name)
    }

    /// Sorted database names.
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Creates a user with no privileges.
    pub fn create_user(&self, username: &str, password: &str) -> OpalResult<()> {
        let mut users = self.users.lock();

        if users.contains_key(username) {
            return Err(OpalError::already_exists(Entity::User, username));
        }

        users.insert(username.to_string(), User::new(username, password)?);
        self.persist_users(&users)
    }

    /// Removes a user.
    pub fn drop_user(&self, username: &str) -> OpalResult<()> {
        let mut users = self.users.lock();

        if users.remove(username).is_none() {
            return Err(OpalError::not_found(Entity::User, username));
        }

        self.persist_users(&users)
    }

    /// Grants a privilege. A grant on a `(database, table)` pair the user
    /// already holds is rejected.
    pub fn grant_privilege(&self, username: &str, privilege: Privilege) -> OpalResult<()> {
        let mut users = self.users.lock();
        let user = users
            .get_mut(username)
            .ok_or_else(|| OpalError::not_found(Entity::User, username))?;

        if user
            .privileges()
            .iter()
            .any(|p| p.database == privilege.database && p.table == privilege.table)
        {
            return Err(OpalError::already_exists(
                Entity::Privilege,
                format!("{}.{}", privilege.database, privilege.table),
            ));
        }

        user.grant(privilege);
        self.persist_users(&users)
    }

    /// Revokes a privilege: targets the stored grant whose
    /// `(database, table)` equals the request's.
    pub fn revoke_privilege(&self, username: &str, privilege: &Privilege) -> OpalResult<()> {
        let mut users = self.users.lock();
        let user = users
            .get_mut(username)
            .ok_or_else(|| OpalError::not_found(Entity::User, username))?;

        if !user.revoke(privilege) {
            return Err(OpalError::not_found(
                Entity::Privilege,
                format!("{}.{}", privilege.database, privilege.table),
            ));
        }

        self.persist_users(&users)
    }

    /// Returns the user iff the password verifies against the stored
    /// digest.
    pub fn authenticate_user(&self, username: &str, password: &str) -> OpalResult<User> {
        let users = self.users.lock();

        let user = users.get(username).ok_or_else(|| OpalError::AuthFailure {
            username: username.to_string(),
        })?;

        if !user.verify_password(password) {
            return Err(OpalError::AuthFailure {
                username: username.to_string(),
            });
        }

        Ok(user.clone())
    }

    /// Fetches a user by name.
    pub fn get_user(&self, username: &str) -> Option<User> {
        self.users.lock().get(username).cloned()
    }

    /// Sorted usernames.
    pub fn users(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Renames a user, rejecting collisions with an existing name.
    pub fn alter_user_username(&self, old: &str, new: &str) -> OpalResult<()> {
        let mut users = self.users.lock();

        if users.contains_key(new) {
            return Err(OpalError::already_exists(Entity::User, new));
        }
        let mut user = users
            .remove(old)
            .ok_or_else(|| OpalError::not_found(Entity::User, old))?;

        user.set_username(new);
        users.insert(new.to_string(), user);
        self.persist_users(&users)
    }

    /// Re-hashes a user's password.
    pub fn alter_user_password(&self, username: &str, password: &str) -> OpalResult<()> {
        let mut users = self.users.lock();
        let user = users
            .get_mut(username)
            .ok_or_else(|| OpalError::not_found(Entity::User, username))?;

        user.set_password(password)?;
        self.persist_users(&users)
    }

    /// Rewrites the users file from the in-memory map. The caller holds the
    /// users lock; this takes the file lock.
    fn persist_users(&self, users: &HashMap<String, User>) -> OpalResult<()> {
        let bytes = bincode::serialize(users)
            .map_err(|e| OpalError::corruption("users file", e.to_string()))?;

        let mut file = self.users_file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::PrivilegeAction;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_seeds_admin() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();

        let admin = catalog.authenticate_user("admin", "admin").unwrap();
        assert!(admin.has_privilege("any", "thing", &[PrivilegeAction::Drop]));
        assert!(dir.path().join(USERS_FILE).exists());
    }

    #[test]
    fn test_reopen_keeps_users_not_reseeded() {
        let dir = TempDir::new().unwrap();

        {
            let catalog = Catalog::open(dir.path()).unwrap();
            catalog.create_user("bob", "hunter2").unwrap();
            catalog.alter_user_password("admin", "changed").unwrap();
            catalog.close();
        }

        let catalog = Catalog::open(dir.path()).unwrap();
        assert!(catalog.authenticate_user("bob", "hunter2").is_ok());
        // the admin password stays changed: no reseeding happened
        assert!(catalog.authenticate_user("admin", "admin").is_err());
        assert!(catalog.authenticate_user("admin", "changed").is_ok());
    }

    #[test]
    fn test_create_drop_database() {
        let dir = TempDir::new().unwrap();
        let mut catalog = Catalog::open(dir.path()).unwrap();

        catalog.create_database("shop").unwrap();
        assert!(catalog.get_database("shop").is_some());
        assert!(dir.path().join("databases/shop/shop.proc").exists());

        assert!(matches!(
            catalog.create_database("shop"),
            Err(OpalError::AlreadyExists { .. })
        ));

        catalog.drop_database("shop").unwrap();
        assert!(catalog.get_database("shop").is_none());
        assert!(!dir.path().join("databases/shop").exists());

        assert!(matches!(
            catalog.drop_database("shop"),
            Err(OpalError::NotFound { .. })
        ));
    }

    #[test]
    fn test_authentication_failures() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();

        assert!(matches!(
            catalog.authenticate_user("ghost", "x"),
            Err(OpalError::AuthFailure { .. })
        ));
        assert!(matches!(
            catalog.authenticate_user("admin", "wrong"),
            Err(OpalError::AuthFailure { .. })
        ));
    }

    #[test]
    fn test_grant_revoke_persists() {
        let dir = TempDir::new().unwrap();

        {
            let catalog = Catalog::open(dir.path()).unwrap();
            catalog.create_user("carol", "pw").unwrap();
            catalog
                .grant_privilege("carol", Privilege::new("d", "t", vec![PrivilegeAction::Select]))
                .unwrap();

            // duplicate (db, tbl) grant rejected
            assert!(matches!(
                catalog.grant_privilege(
                    "carol",
                    Privilege::new("d", "t", vec![PrivilegeAction::Insert])
                ),
                Err(OpalError::AlreadyExists { .. })
            ));
            catalog.close();
        }

        let catalog = Catalog::open(dir.path()).unwrap();
        let carol = catalog.get_user("carol").unwrap();
        assert!(carol.has_privilege("d", "t", &[PrivilegeAction::Select]));

        catalog
            .revoke_privilege("carol", &Privilege::new("d", "t", vec![PrivilegeAction::Select]))
            .unwrap();
        let carol = catalog.get_user("carol").unwrap();
        assert!(!carol.has_privilege("d", "t", &[PrivilegeAction::Select]));
    }

    #[test]
    fn test_alter_username() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();

        catalog.create_user("old", "pw").unwrap();
        catalog.alter_user_username("old", "new").unwrap();

        assert!(catalog.get_user("old").is_none());
        assert_eq!(catalog.get_user("new").unwrap().username(), "new");

        assert!(matches!(
            catalog.alter_user_username("missing", "x"),
            Err(OpalError::NotFound { .. })
        ));
        catalog.create_user("other", "pw").unwrap();
        assert!(matches!(
            catalog.alter_user_username("other", "new"),
            Err(OpalError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_sorted_listings() {
        let dir = TempDir::new().unwrap();
        let mut catalog = Catalog::open(dir.path()).unwrap();

        catalog.create_database("zoo").unwrap();
        catalog.create_database("arc").unwrap();
        assert_eq!(catalog.databases(), vec!["arc".to_string(), "zoo".to_string()]);

        catalog.create_user("zed", "p").unwrap();
        assert_eq!(
            catalog.users(),
            vec!["admin".to_string(), "zed".to_string()]
        );
    }
}
