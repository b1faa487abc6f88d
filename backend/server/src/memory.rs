//! # In-Memory Store
//!
//! Same contract as the Postgres store, kept in process. Used by the test
//! suites and by `--memory` local runs.
//!
//! ## Atomicity
//!
//! - One mutex guards both tables, held for the whole unit of work
//! - `settle_round` stages the new balance and history row, then applies both
//! - `fail_next_commit` makes the next settlement fail after staging, before anything is applied
//! - `fail_next_insert` does the same for the next profile insert
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    game::Round,
    models::{Account, AccountOverride, NewAccount, OutcomeRecord, ProfileUpdate, Role, Settlement},
    store::{Store, StoreError},
};

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    history: Vec<OutcomeRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
    fail_next_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub async fn record_count(&self) -> usize {
        self.tables.lock().await.history.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn account_by_user(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.accounts.iter().find(|a| a.user_id == user_id).cloned())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn accounts_except(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables
            .accounts
            .iter()
            .rev()
            .filter(|a| a.user_id != user_id)
            .cloned()
            .collect())
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables
            .accounts
            .iter()
            .find(|a| a.user_id == account.user_id || a.email == account.email)
        {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                existing.email
            )));
        }

        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Commit("injected failure".to_string()));
        }

        let account = account.into_account(Utc::now());
        tables.accounts.push(account.clone());

        Ok(account)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let mut tables = self.tables.lock().await;

        let Some(account) = tables.accounts.iter_mut().find(|a| a.user_id == user_id) else {
            return Ok(None);
        };

        account.full_name = Some(update.full_name);
        account.phone_number = Some(update.phone_number);
        account.bio = update.bio;
        account.website = update.website;
        account.newsletter = update.newsletter;
        account.marketing = update.marketing;
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn override_account(
        &self,
        id: Uuid,
        update: AccountOverride,
    ) -> Result<Option<Account>, StoreError> {
        let mut tables = self.tables.lock().await;

        let Some(account) = tables.accounts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };

        account.full_name = Some(update.full_name);
        account.phone_number = Some(update.phone_number);
        account.balance = update.balance;
        account.role = update.role;
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn set_role(&self, email: &str, role: Role) -> Result<Option<Account>, StoreError> {
        let mut tables = self.tables.lock().await;

        let Some(account) = tables.accounts.iter_mut().find(|a| a.email == email) else {
            return Ok(None);
        };

        account.role = role;
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;

        let before = tables.accounts.len();
        tables.accounts.retain(|a| a.id != id);

        if tables.accounts.len() == before {
            return Ok(false);
        }

        tables.history.retain(|record| record.profile_id != id);

        Ok(true)
    }

    async fn history(
        &self,
        profile_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<OutcomeRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(0));

        Ok(tables
            .history
            .iter()
            .rev()
            .filter(|record| record.profile_id == profile_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn settle_round(&self, user_id: Uuid, round: Round) -> Result<Settlement, StoreError> {
        let mut tables = self.tables.lock().await;

        let index = tables
            .accounts
            .iter()
            .position(|a| a.user_id == user_id)
            .ok_or(StoreError::NotFound)?;

        let now = Utc::now();
        let mut account = tables.accounts[index].clone();
        account.balance = account
            .balance
            .checked_add(round.delta)
            .ok_or(StoreError::Overflow)?;
        account.updated_at = now;

        let record = OutcomeRecord {
            id: Uuid::new_v4(),
            profile_id: account.id,
            result: round.outcome,
            number: i32::from(round.number),
            balance_change: round.delta,
            created_at: now,
        };

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Commit("injected failure".to_string()));
        }

        let new_balance = account.balance;
        tables.accounts[index] = account;
        tables.history.push(record.clone());

        Ok(Settlement {
            record,
            new_balance,
        })
    }
}
