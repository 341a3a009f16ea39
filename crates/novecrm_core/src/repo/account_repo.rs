//! Account store: registered users and the persisted session slot.
//!
//! # Responsibility
//! - Register users with unique usernames.
//! - Authenticate credentials into a `Session` value.
//! - Persist, restore and destroy the opt-in session slot.
//!
//! # Invariants
//! - Username uniqueness and matching are exact and case-sensitive.
//! - A stored user entry that no longer decodes still reserves its username
//!   and is written back unchanged on the next signup.
//! - `restore_session` does not check that the referenced user still exists;
//!   callers that need that use `user_for_session`.
//! - There is no hidden global session: the `Session` value is owned by the
//!   caller and threaded explicitly.

use crate::config::StorageKeys;
use crate::error::{CrmError, CrmResult};
use crate::model::user::{NewUser, Session, User};
use crate::model::validation::require_non_blank;
use crate::repo::kv_repo::{
    load_collection, store_collection, KeyValueRepository, Snapshot, StorageError,
};
use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use uuid::Uuid;

const MODULE: &str = "account_store";

pub struct AccountStore<R: KeyValueRepository> {
    repo: R,
    keys: StorageKeys,
}

impl<R: KeyValueRepository> AccountStore<R> {
    pub fn new(repo: R) -> Self {
        Self::with_keys(repo, StorageKeys::default())
    }

    pub fn with_keys(repo: R, keys: StorageKeys) -> Self {
        Self { repo, keys }
    }

    /// Registers a new user.
    ///
    /// `name`, `whatsapp` and `username` are trimmed; the password is kept as
    /// typed but must not be blank.
    ///
    /// # Errors
    /// - `Validation` when name, username or password is blank.
    /// - `DuplicateUsername` when the username is already taken, including by
    ///   a stored entry that cannot be decoded.
    /// - `StorageUnavailable` when the users collection cannot be read or
    ///   written.
    pub fn register_user(&self, input: NewUser) -> CrmResult<User> {
        let name = require_non_blank("name", &input.name)?;
        let username = require_non_blank("username", &input.username)?;
        require_non_blank("password", &input.password)?;

        let mut users = self.users().into_rewrite()?;
        let taken_by_retained = users.retained().iter().any(|entry| {
            entry.get("username").and_then(Value::as_str) == Some(username.as_str())
        });
        if taken_by_retained || users.items.iter().any(|user| user.username == username) {
            info!("event=user_register module={MODULE} status=rejected error_code=duplicate_username");
            return Err(CrmError::DuplicateUsername(username));
        }

        let user = User {
            id: Uuid::new_v4(),
            name,
            whatsapp: input
                .whatsapp
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            username,
            password: input.password,
            created_at: Utc::now(),
        };
        users.items.insert(0, user.clone());
        store_collection(&self.repo, &self.keys.users, &users)?;

        info!(
            "event=user_register module={MODULE} status=ok user_id={} user_count={}",
            user.id,
            users.items.len()
        );
        Ok(user)
    }

    /// Checks credentials and returns a session for the matching user.
    ///
    /// Nothing is persisted; see [`AccountStore::persist_session`].
    pub fn authenticate(&self, username: &str, password: &str) -> CrmResult<Session> {
        let users = self.users().require_readable()?;
        let Some(user) = users
            .iter()
            .find(|user| user.username == username && user.password == password)
        else {
            info!("event=authenticate module={MODULE} status=rejected error_code=invalid_credentials");
            return Err(CrmError::InvalidCredentials);
        };

        info!(
            "event=authenticate module={MODULE} status=ok user_id={}",
            user.id
        );
        Ok(Session::for_user(user))
    }

    /// Writes `session` into the session slot so it survives a restart.
    pub fn persist_session(&self, session: &Session) -> CrmResult<()> {
        let encoded = serde_json::to_string(session).map_err(|source| StorageError::Encode {
            key: self.keys.session.clone(),
            source,
        })?;
        self.repo.write(&self.keys.session, &encoded)?;
        info!(
            "event=session_persist module={MODULE} status=ok user_id={}",
            session.user_id
        );
        Ok(())
    }

    /// Authenticates and, when `remember` is set, persists the session.
    pub fn login(&self, username: &str, password: &str, remember: bool) -> CrmResult<Session> {
        let session = self.authenticate(username, password)?;
        if remember {
            self.persist_session(&session)?;
        }
        Ok(session)
    }

    /// Returns the persisted session, if one is stored and readable.
    pub fn restore_session(&self) -> Option<Session> {
        let raw = match self.repo.read(&self.keys.session) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("event=session_restore module={MODULE} status=degraded error_code=read_failed error={err}");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => {
                info!(
                    "event=session_restore module={MODULE} status=ok user_id={}",
                    session.user_id
                );
                Some(session)
            }
            Err(err) => {
                warn!("event=session_restore module={MODULE} status=degraded error_code=undecodable error={err}");
                None
            }
        }
    }

    /// Clears the session slot. Calling it with no stored session is fine.
    pub fn destroy_session(&self) -> CrmResult<()> {
        self.repo.delete(&self.keys.session)?;
        info!("event=session_destroy module={MODULE} status=ok");
        Ok(())
    }

    /// Looks up the user a session refers to.
    pub fn user_for_session(&self, session: &Session) -> Option<User> {
        self.users()
            .items
            .into_iter()
            .find(|user| user.id == session.user_id && user.username == session.username)
    }

    /// Loads the users collection with its load origin.
    pub fn users(&self) -> Snapshot<User> {
        load_collection(&self.repo, &self.keys.users, MODULE)
    }
}

#[cfg(test)]
mod tests {
    use super::AccountStore;
    use crate::db::open_db_in_memory;
    use crate::error::CrmError;
    use crate::model::user::NewUser;
    use crate::model::validation::ValidationError;
    use crate::repo::kv_repo::{KeyValueRepository, SqliteKeyValueRepository};

    #[test]
    fn register_trims_fields_and_drops_blank_whatsapp() {
        let conn = open_db_in_memory().unwrap();
        let store = AccountStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());

        let user = store
            .register_user(NewUser::new(" Ana ", Some("  ".to_string()), " ana ", "1234"))
            .unwrap();
        assert_eq!(user.name, "Ana");
        assert_eq!(user.username, "ana");
        assert_eq!(user.whatsapp, None);
    }

    #[test]
    fn register_requires_name_username_and_password() {
        let conn = open_db_in_memory().unwrap();
        let store = AccountStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());

        let err = store
            .register_user(NewUser::new("Ana", None, "ana", "   "))
            .unwrap_err();
        assert!(matches!(
            err,
            CrmError::Validation(ValidationError::MissingField("password"))
        ));
        assert!(store.users().items.is_empty());
    }

    #[test]
    fn username_matching_is_case_sensitive() {
        let conn = open_db_in_memory().unwrap();
        let store = AccountStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());

        store
            .register_user(NewUser::new("Ana", None, "ana", "1234"))
            .unwrap();
        store
            .register_user(NewUser::new("Ana Maiúscula", None, "Ana", "abcd"))
            .unwrap();

        assert!(matches!(
            store.authenticate("ANA", "1234").unwrap_err(),
            CrmError::InvalidCredentials
        ));
        assert_eq!(store.authenticate("Ana", "abcd").unwrap().username, "Ana");
    }

    #[test]
    fn session_slot_in_an_unknown_shape_restores_nothing() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteKeyValueRepository::try_new(&conn).unwrap();
        let store = AccountStore::new(repo);

        repo.write(
            "novecrm_session_v1",
            r#"{"id":"k3x9a0qz","name":"Ana","username":"ana","password":"1234"}"#,
        )
        .unwrap();

        assert_eq!(store.restore_session(), None);
    }
}
