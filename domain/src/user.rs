//! The user aggregate: account identity.
//!
//! Credentials arrive pre-hashed; this aggregate never sees a cleartext
//! password, and the read model never stores the hash at all.

use crate::projections::require_row;
use chrono::{DateTime, Utc};
use grange_core::aggregate::{Aggregate, AggregateState};
use grange_core::event::{DomainEvent, EventRecord, decode};
use grange_core::projection::{Projection, ProjectionError};
use grange_core::read_store::{ReadModelRow, ReadRepository, ReadStore};
use grange_core::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Minimum accepted username length.
pub const MIN_USERNAME_LEN: usize = 3;

/// Errors raised by user commands.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UserError {
    /// The username is shorter than [`MIN_USERNAME_LEN`] characters.
    #[error("username must be at least {MIN_USERNAME_LEN} characters")]
    UsernameTooShort,

    /// The password hash is empty.
    #[error("password hash must not be empty")]
    EmptyPasswordHash,

    /// The command targets a user with no history.
    #[error("user does not exist")]
    NotFound,
}

/// The user event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum UserEvent {
    /// A new account was registered.
    UserCreated {
        /// The user's id, also the stream id.
        uid: StreamId,
        /// Login name.
        username: String,
        /// Pre-hashed credential.
        password_hash: String,
    },
    /// The account's credential was rotated.
    UserPasswordChanged {
        /// The new pre-hashed credential.
        password_hash: String,
    },
}

impl UserEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] = &["UserCreated", "UserPasswordChanged"];
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => "UserCreated",
            UserEvent::UserPasswordChanged { .. } => "UserPasswordChanged",
        }
    }
}

/// Event-sourced user state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserState {
    /// Login name.
    pub username: String,
    /// Pre-hashed credential.
    pub password_hash: String,
}

impl AggregateState for UserState {
    type Event = UserEvent;
    const KIND: &'static str = "User";

    fn transition(&mut self, event: &UserEvent) {
        match event {
            UserEvent::UserCreated {
                username,
                password_hash,
                ..
            } => {
                self.username = username.clone();
                self.password_hash = password_hash.clone();
            }
            UserEvent::UserPasswordChanged { password_hash } => {
                self.password_hash = password_hash.clone();
            }
        }
    }
}

/// A user aggregate instance.
pub type User = Aggregate<UserState>;

/// Commands on the user aggregate.
pub trait UserCommands: Sized {
    /// Register an account with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`UserError`] if the username is too short or the hash is
    /// empty.
    fn create(username: &str, password_hash: &str) -> Result<Self, UserError>;

    /// Rotate the account's credential.
    ///
    /// # Errors
    ///
    /// Returns [`UserError`] if the user does not exist or the hash is
    /// empty.
    fn change_password(&mut self, password_hash: &str) -> Result<(), UserError>;
}

impl UserCommands for User {
    fn create(username: &str, password_hash: &str) -> Result<Self, UserError> {
        if username.trim().chars().count() < MIN_USERNAME_LEN {
            return Err(UserError::UsernameTooShort);
        }
        if password_hash.is_empty() {
            return Err(UserError::EmptyPasswordHash);
        }

        let id = StreamId::random();
        let mut user = Self::new(id.clone());
        user.track_change(UserEvent::UserCreated {
            uid: id,
            username: username.trim().to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(user)
    }

    fn change_password(&mut self, password_hash: &str) -> Result<(), UserError> {
        if self.is_new() {
            return Err(UserError::NotFound);
        }
        if password_hash.is_empty() {
            return Err(UserError::EmptyPasswordHash);
        }
        self.track_change(UserEvent::UserPasswordChanged {
            password_hash: password_hash.to_string(),
        });
        Ok(())
    }
}

/// The denormalized user read model.
///
/// Deliberately omits the password hash: credentials stay on the write
/// side only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Login name.
    pub username: String,
    /// When the account was registered.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for UserRow {
    const KIND: &'static str = UserState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`UserRow`] per account in sync with the event history.
pub struct UserProjection {
    users: ReadRepository<UserRow>,
}

impl UserProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            users: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<UserEvent>(record)? {
            UserEvent::UserCreated { uid, username, .. } => {
                self.users
                    .upsert(&UserRow {
                        uid,
                        username,
                        created_date: record.created_at,
                    })
                    .await?;
            }
            UserEvent::UserPasswordChanged { .. } => {
                // Credential rotation does not touch the read model, but
                // the row must exist for the stream to be valid.
                let row = require_row(&self.users, record).await?;
                self.users.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for UserProjection {
    fn name(&self) -> &'static str {
        "user-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        UserEvent::TYPES
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move { self.apply_inner(&record).await })
    }
}
