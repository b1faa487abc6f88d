use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    game::Round,
    models::{Account, AccountOverride, NewAccount, OutcomeRecord, ProfileUpdate, Role, Settlement},
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found")]
    NotFound,

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Balance out of range")]
    Overflow,

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for accounts and their round history.
///
/// Every method is its own unit of work. `settle_round` is the only one that
/// touches two tables and must commit both writes or neither.
#[async_trait]
pub trait Store: Send + Sync {
    async fn account_by_user(&self, user_id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// All accounts except the one owned by `user_id`, newest first.
    async fn accounts_except(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the actor or email already has an account.
    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<Account>, StoreError>;

    async fn override_account(
        &self,
        id: Uuid,
        update: AccountOverride,
    ) -> Result<Option<Account>, StoreError>;

    async fn set_role(&self, email: &str, role: Role) -> Result<Option<Account>, StoreError>;

    /// Removes the account and, by cascade, its history. Returns whether a row existed.
    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Newest first, optionally capped at `limit` rows.
    async fn history(
        &self,
        profile_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<OutcomeRecord>, StoreError>;

    /// Applies `round` to the actor's balance and appends its history row.
    ///
    /// The current balance is read inside the same unit as the write, with the
    /// account held exclusively until commit, so concurrent rounds for one
    /// actor serialize instead of losing updates.
    async fn settle_round(&self, user_id: Uuid, round: Round) -> Result<Settlement, StoreError>;
}
