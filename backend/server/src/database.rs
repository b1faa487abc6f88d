//! # Postgres
//!
//! Relational store for profiles and their game history.
//!
//! Core purpose is to hold the points ledger. A balance change must never exist without its
//! history row and vice versa, since the history is the only audit trail for balances.
//!
//! ## Requirements
//!
//! - One profile per identity provider user
//! - Append-only history, newest first when displayed
//! - Concurrent rounds for the same user must not lose updates
//!
//! ## Implementation
//!
//! - `profiles.user_id` and `profiles.email` are unique
//! - `game_history.profile_id` cascades on delete
//! - A round is `BEGIN`, `SELECT ... FOR UPDATE`, `UPDATE`, `INSERT`, `COMMIT`
//! - The row lock serializes rounds per profile, other profiles are unaffected
//! - `game_history.created_at` defaults to `clock_timestamp()`, so rounds that waited on the lock
//!   still sort after the round that held it
//! - Any error before commit drops the transaction, which rolls it back
//!
//! ## Tests
//!
//! The store tests need a Postgres server and are ignored by default.
//! ```sh
//! DATABASE_URL=postgres://... cargo test -p profileforge -- --ignored
//! ```
//!
//! ## Commands
//!
//! Apply migrations without starting the server.
//! ```sh
//! forge-admin migrate
//! ```
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    PgPool,
    migrate::Migrator,
    postgres::PgPoolOptions,
};
use uuid::Uuid;

use crate::{
    game::Round,
    models::{Account, AccountOverride, NewAccount, OutcomeRecord, ProfileUpdate, Role, Settlement},
    store::{Store, StoreError},
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_postgres(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }
}

fn conflict_or_database(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn account_by_user(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as("SELECT * FROM profiles WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn accounts_except(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError> {
        let accounts =
            sqlx::query_as("SELECT * FROM profiles WHERE user_id <> $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(accounts)
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        sqlx::query_as(
            "INSERT INTO profiles (id, user_id, email, full_name, phone_number, role, balance) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(account.user_id)
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(&account.phone_number)
        .bind(account.role)
        .bind(account.balance)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_or_database)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as(
            "UPDATE profiles \
             SET full_name = $2, phone_number = $3, bio = $4, website = $5, \
                 newsletter = $6, marketing = $7, updated_at = now() \
             WHERE user_id = $1 \
             RETURNING *",
        )
        .bind(user_id)
        .bind(&update.full_name)
        .bind(&update.phone_number)
        .bind(&update.bio)
        .bind(&update.website)
        .bind(update.newsletter)
        .bind(update.marketing)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn override_account(
        &self,
        id: Uuid,
        update: AccountOverride,
    ) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as(
            "UPDATE profiles \
             SET full_name = $2, phone_number = $3, balance = $4, role = $5, updated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(id)
        .bind(&update.full_name)
        .bind(&update.phone_number)
        .bind(update.balance)
        .bind(update.role)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn set_role(&self, email: &str, role: Role) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as(
            "UPDATE profiles SET role = $2, updated_at = now() WHERE email = $1 RETURNING *",
        )
        .bind(email)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn history(
        &self,
        profile_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<OutcomeRecord>, StoreError> {
        // LIMIT NULL means no limit
        let records = sqlx::query_as(
            "SELECT * FROM game_history WHERE profile_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(profile_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn settle_round(&self, user_id: Uuid, round: Round) -> Result<Settlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid, i64)> =
            sqlx::query_as("SELECT id, balance FROM profiles WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (profile_id, balance) = locked.ok_or(StoreError::NotFound)?;
        let new_balance = balance.checked_add(round.delta).ok_or(StoreError::Overflow)?;

        sqlx::query("UPDATE profiles SET balance = $2, updated_at = now() WHERE id = $1")
            .bind(profile_id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await?;

        let record: OutcomeRecord = sqlx::query_as(
            "INSERT INTO game_history (id, profile_id, result, number, balance_change) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(profile_id)
        .bind(round.outcome)
        .bind(i32::from(round.number))
        .bind(round.delta)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Settlement {
            record,
            new_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::Outcome;

    async fn seeded(store: &PgStore, email: &str, balance: i64) -> Account {
        store
            .insert_account(NewAccount {
                user_id: Uuid::new_v4(),
                email: email.to_string(),
                full_name: Some("Player One".to_string()),
                phone_number: None,
                role: Role::Client,
                balance,
            })
            .await
            .unwrap()
    }

    async fn balance_of(store: &PgStore, account: &Account) -> i64 {
        store.account_by_id(account.id).await.unwrap().unwrap().balance
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_win_and_loss_from_hundred(pool: PgPool) {
        let store = PgStore::new(pool);
        let winner = seeded(&store, "winner@example.com", 100).await;
        let loser = seeded(&store, "loser@example.com", 100).await;

        let won = store.settle_round(winner.user_id, Round::from_draw(85)).await.unwrap();
        assert_eq!(won.new_balance, 150);
        assert_eq!(won.record.result, Outcome::Win);
        assert_eq!(won.record.number, 85);
        assert_eq!(won.record.balance_change, 50);
        assert_eq!(won.record.profile_id, winner.id);

        let lost = store.settle_round(loser.user_id, Round::from_draw(40)).await.unwrap();
        assert_eq!(lost.new_balance, 65);
        assert_eq!(lost.record.result, Outcome::Loss);
        assert_eq!(lost.record.balance_change, -35);

        assert_eq!(balance_of(&store, &winner).await, 150);
        assert_eq!(balance_of(&store, &loser).await, 65);
        assert_eq!(store.history(winner.id, None).await.unwrap(), vec![won.record]);
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_balance_goes_negative(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", 20).await;

        let settlement = store.settle_round(account.user_id, Round::from_draw(10)).await.unwrap();

        assert_eq!(settlement.new_balance, -15);
        assert_eq!(balance_of(&store, &account).await, -15);
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_missing_account_writes_nothing(pool: PgPool) {
        let store = PgStore::new(pool.clone());

        let result = store.settle_round(Uuid::new_v4(), Round::from_draw(90)).await;
        assert!(matches!(result, Err(StoreError::NotFound)));

        let (rows,): (i64,) = sqlx::query_as("SELECT count(*) FROM game_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_failed_insert_rolls_back_balance(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", 100).await;

        // violates the number check after the balance update ran
        let invalid = Round {
            outcome: Outcome::Win,
            number: 101,
            delta: 50,
        };
        let result = store.settle_round(account.user_id, invalid).await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(balance_of(&store, &account).await, 100);
        assert!(store.history(account.id, None).await.unwrap().is_empty());
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_overflow_writes_nothing(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", i64::MAX).await;

        let result = store.settle_round(account.user_id, Round::from_draw(99)).await;

        assert!(matches!(result, Err(StoreError::Overflow)));
        assert_eq!(balance_of(&store, &account).await, i64::MAX);
        assert!(store.history(account.id, None).await.unwrap().is_empty());
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_concurrent_rounds_lose_no_updates(pool: PgPool) {
        let store = Arc::new(PgStore::new(pool));
        let account = seeded(&store, "a@example.com", 1_000).await;
        let draws: Vec<u8> = (0..16).map(|i| i * 6).collect();

        let handles: Vec<_> = draws
            .iter()
            .map(|&number| {
                let store = store.clone();
                let user_id = account.user_id;
                tokio::spawn(async move { store.settle_round(user_id, Round::from_draw(number)).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let expected: i64 = 1_000 + draws.iter().map(|&n| Round::from_draw(n).delta).sum::<i64>();
        let history = store.history(account.id, None).await.unwrap();

        assert_eq!(balance_of(&store, &account).await, expected);
        assert_eq!(history.len(), draws.len());
        assert_eq!(
            history.iter().map(|r| r.balance_change).sum::<i64>(),
            expected - 1_000
        );
        assert!(history.windows(2).all(|pair| pair[0].created_at > pair[1].created_at));
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_history_is_newest_first_and_limited(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", 0).await;

        for number in [10, 90, 20] {
            store.settle_round(account.user_id, Round::from_draw(number)).await.unwrap();
        }

        let numbers = |records: Vec<OutcomeRecord>| -> Vec<i32> {
            records.iter().map(|r| r.number).collect()
        };

        assert_eq!(numbers(store.history(account.id, Some(2)).await.unwrap()), vec![20, 90]);
        assert_eq!(numbers(store.history(account.id, None).await.unwrap()), vec![20, 90, 10]);
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_delete_cascades_history(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", 0).await;
        let other = seeded(&store, "b@example.com", 0).await;

        store.settle_round(account.user_id, Round::from_draw(90)).await.unwrap();
        store.settle_round(other.user_id, Round::from_draw(10)).await.unwrap();

        assert!(store.delete_account(account.id).await.unwrap());
        assert!(!store.delete_account(account.id).await.unwrap());

        assert!(store.history(account.id, None).await.unwrap().is_empty());
        assert_eq!(store.history(other.id, None).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrator = "crate::database::MIGRATOR")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_duplicate_email_conflicts_and_roles_persist(pool: PgPool) {
        let store = PgStore::new(pool);
        let account = seeded(&store, "a@example.com", 0).await;

        let duplicate = store
            .insert_account(NewAccount {
                user_id: Uuid::new_v4(),
                email: "a@example.com".to_string(),
                full_name: None,
                phone_number: None,
                role: Role::Client,
                balance: 0,
            })
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

        let promoted = store.set_role("a@example.com", Role::Admin).await.unwrap().unwrap();
        assert!(promoted.is_admin());
        assert_eq!(store.account_by_user(account.user_id).await.unwrap().unwrap().role, Role::Admin);
        assert!(store.set_role("nobody@example.com", Role::Admin).await.unwrap().is_none());
    }
}
