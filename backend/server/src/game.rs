//! # Number Game
//!
//! One round draws a number in `0..=100`. Anything above 70 wins 50 points,
//! everything else costs 35. Balances have no floor.
//!
//! The draw happens in process, the settlement happens in the store. The
//! settlement future runs on its own task so a dropped request cannot cancel
//! it halfway through a commit.
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Outcome,
    store::{Store, StoreError},
};

pub const DRAW_MAX: u8 = 100;
pub const WIN_THRESHOLD: u8 = 70;
pub const WIN_DELTA: i64 = 50;
pub const LOSS_DELTA: i64 = -35;

pub const RECENT_HISTORY: i64 = 20;

/// Source of drawn numbers. Implementations must stay within `0..=DRAW_MAX`.
pub trait Dice: Send + Sync {
    fn roll(&self) -> u8;
}

pub struct RandomDice;

impl Dice for RandomDice {
    fn roll(&self) -> u8 {
        rand::rng().random_range(0..=DRAW_MAX)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Round {
    pub outcome: Outcome,
    pub number: u8,
    pub delta: i64,
}

impl Round {
    pub fn from_draw(number: u8) -> Self {
        debug_assert!(number <= DRAW_MAX);

        if number > WIN_THRESHOLD {
            Self {
                outcome: Outcome::Win,
                number,
                delta: WIN_DELTA,
            }
        } else {
            Self {
                outcome: Outcome::Loss,
                number,
                delta: LOSS_DELTA,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResult {
    pub outcome: Outcome,
    pub drawn_value: u8,
    pub balance_change: i64,
    pub new_balance: i64,
}

pub async fn play(
    store: Arc<dyn Store>,
    dice: &dyn Dice,
    user_id: Uuid,
) -> Result<PlayResult, AppError> {
    let round = Round::from_draw(dice.roll());

    let settlement = tokio::spawn(async move { store.settle_round(user_id, round).await })
        .await
        .map_err(|e| StoreError::Commit(e.to_string()));

    let settlement = match settlement.and_then(|result| result) {
        Ok(settlement) => settlement,
        Err(StoreError::NotFound) => return Err(AppError::NotFound("Profile not found")),
        Err(e) => {
            error!(%user_id, "Round could not be settled: {e}");
            return Err(AppError::TransactionFailed(e));
        }
    };

    info!(
        %user_id,
        outcome = ?round.outcome,
        number = round.number,
        new_balance = settlement.new_balance,
        "Round settled"
    );

    Ok(PlayResult {
        outcome: round.outcome,
        drawn_value: round.number,
        balance_change: round.delta,
        new_balance: settlement.new_balance,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::{
        memory::MemoryStore,
        models::{NewAccount, Role},
    };

    struct Scripted(Mutex<VecDeque<u8>>);

    impl Scripted {
        fn new(rolls: &[u8]) -> Self {
            Self(Mutex::new(rolls.iter().copied().collect()))
        }
    }

    impl Dice for Scripted {
        fn roll(&self) -> u8 {
            self.0.lock().unwrap().pop_front().expect("script exhausted")
        }
    }

    async fn store_with_balance(balance: i64) -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        store
            .insert_account(NewAccount {
                user_id,
                email: format!("{user_id}@example.com"),
                full_name: Some("Player One".to_string()),
                phone_number: None,
                role: Role::Client,
                balance,
            })
            .await
            .unwrap();

        (store, user_id)
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(Round::from_draw(0).outcome, Outcome::Loss);
        assert_eq!(Round::from_draw(70).outcome, Outcome::Loss);
        assert_eq!(Round::from_draw(71).outcome, Outcome::Win);
        assert_eq!(Round::from_draw(100).outcome, Outcome::Win);
    }

    #[test]
    fn test_every_draw_maps_to_fixed_delta() {
        for number in 0..=DRAW_MAX {
            let round = Round::from_draw(number);
            match round.outcome {
                Outcome::Win => assert_eq!(round.delta, WIN_DELTA),
                Outcome::Loss => assert_eq!(round.delta, LOSS_DELTA),
            }
        }

        let wins = (0..=DRAW_MAX)
            .filter(|n| Round::from_draw(*n).outcome == Outcome::Win)
            .count();
        assert_eq!(wins, 30);
    }

    #[test]
    fn test_random_dice_stays_in_range() {
        let dice = RandomDice;
        for _ in 0..10_000 {
            assert!(dice.roll() <= DRAW_MAX);
        }
    }

    #[tokio::test]
    async fn test_win_from_hundred() {
        let (store, user_id) = store_with_balance(100).await;

        let result = play(store.clone(), &Scripted::new(&[85]), user_id)
            .await
            .unwrap();

        assert_eq!(
            result,
            PlayResult {
                outcome: Outcome::Win,
                drawn_value: 85,
                balance_change: 50,
                new_balance: 150,
            }
        );

        let account = store.account_by_user(user_id).await.unwrap().unwrap();
        let history = store.history(account.id, None).await.unwrap();
        assert_eq!(account.balance, 150);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, Outcome::Win);
        assert_eq!(history[0].number, 85);
        assert_eq!(history[0].balance_change, 50);
    }

    #[tokio::test]
    async fn test_loss_from_hundred() {
        let (store, user_id) = store_with_balance(100).await;

        let result = play(store.clone(), &Scripted::new(&[40]), user_id)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Loss);
        assert_eq!(result.new_balance, 65);

        let account = store.account_by_user(user_id).await.unwrap().unwrap();
        let history = store.history(account.id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].number, 40);
        assert_eq!(history[0].balance_change, -35);
    }

    #[tokio::test]
    async fn test_balance_goes_negative() {
        let (store, user_id) = store_with_balance(20).await;

        let result = play(store, &Scripted::new(&[10]), user_id).await.unwrap();

        assert_eq!(result.new_balance, -15);
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let (store, _) = store_with_balance(100).await;

        let result = play(store.clone(), &Scripted::new(&[85]), Uuid::new_v4()).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nothing_behind() {
        let (store, user_id) = store_with_balance(100).await;
        store.fail_next_commit();

        let result = play(store.clone(), &Scripted::new(&[85]), user_id).await;
        assert!(matches!(result, Err(AppError::TransactionFailed(_))));

        let account = store.account_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 100);
        assert_eq!(store.record_count().await, 0);

        let retry = play(store.clone(), &Scripted::new(&[85]), user_id)
            .await
            .unwrap();
        assert_eq!(retry.new_balance, 150);
    }

    #[tokio::test]
    async fn test_repeated_plays_are_independent() {
        let (store, user_id) = store_with_balance(100).await;
        let dice = Scripted::new(&[85, 85]);

        let first = play(store.clone(), &dice, user_id).await.unwrap();
        let second = play(store.clone(), &dice, user_id).await.unwrap();

        assert_eq!(first.new_balance, 150);
        assert_eq!(second.new_balance, 200);
        assert_eq!(store.record_count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_plays_lose_no_updates() {
        const PLAYS: usize = 64;

        let (store, user_id) = store_with_balance(1_000).await;
        let dice = Arc::new(RandomDice);

        let handles: Vec<_> = (0..PLAYS)
            .map(|_| {
                let store = store.clone();
                let dice = dice.clone();
                tokio::spawn(async move { play(store, dice.as_ref(), user_id).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let account = store.account_by_user(user_id).await.unwrap().unwrap();
        let history = store.history(account.id, None).await.unwrap();
        let applied: i64 = history.iter().map(|record| record.balance_change).sum();

        assert_eq!(history.len(), PLAYS);
        assert_eq!(account.balance, 1_000 + applied);
    }
}
