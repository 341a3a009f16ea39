//! Account model.
//!
//! # Invariants
//! - `username` is unique across stored users (exact, case-sensitive match).
//! - Users are immutable after registration.
//! - A `Session` only references a user; it never embeds credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// Registered CRM operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Contact number; `None` when left blank at signup.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub whatsapp: Option<String>,
    pub username: String,
    /// Stored as typed. Hashing is out of scope for a single-device store.
    pub password: String,
    pub created_at: DateTime<Utc>,
}

/// Signup form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub whatsapp: Option<String>,
    pub username: String,
    pub password: String,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        whatsapp: Option<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            whatsapp,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Reference to the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

impl Session {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
        }
    }

    /// Owner key for this session's record collection.
    pub fn owner(&self) -> &str {
        self.username.as_str()
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.trim().is_empty()))
}
